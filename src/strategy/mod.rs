//! Listing selection: eligibility filters and the allocation planner.
//!
//! Both are pure. Nothing here touches the network or the clock.

pub mod filter;
pub mod planner;

pub use filter::{ListingFilter, Rejection};
pub use planner::AllocationPlanner;
