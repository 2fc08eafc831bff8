//! LENDBOT: automated peer-lending investor.
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod config;
pub mod types;
pub mod http;
pub mod marketplace;
pub mod strategy;
pub mod notify;
pub mod engine;
