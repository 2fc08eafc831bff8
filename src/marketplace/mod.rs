//! Peer-lending marketplace integration.
//!
//! - `rate_limit`: the shared one-request-per-interval watermark
//! - `client`: typed reads (listings, cash, notes) and writes (orders, withdrawals)

pub mod client;
pub mod rate_limit;

pub use client::{MarketplaceClient, MarketplaceCredentials};
pub use rate_limit::RateLimiter;
