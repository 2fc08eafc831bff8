//! Greedy allocation of cash across eligible listings.
//!
//! Filters the listings, ranks survivors by interest rate (highest first,
//! stable so equal rates keep their listing order), then takes as many as
//! `floor(balance / loan_unit_amount)` allows. Every loan gets the same
//! unit amount, so highest-yield-first is all the optimisation needed.

use rust_decimal::prelude::*;
use tracing::{debug, info};

use super::filter::ListingFilter;
use crate::types::{AllocationPlan, HeldNoteSet, Listing, Policy, RankedCandidate};

pub struct AllocationPlanner;

impl AllocationPlanner {
    /// Number of whole loan units the balance covers. Zero for negative
    /// balances or a non-positive unit amount.
    pub fn affordable_units(balance: Decimal, unit_amount: Decimal) -> usize {
        if unit_amount <= Decimal::ZERO || balance <= Decimal::ZERO {
            return 0;
        }
        (balance / unit_amount).floor().to_usize().unwrap_or(0)
    }

    /// Eligible listings ranked by interest rate, highest first.
    pub fn rank(listings: &[Listing], held: &HeldNoteSet, policy: &Policy) -> Vec<RankedCandidate> {
        let mut ranked: Vec<RankedCandidate> = listings
            .iter()
            .filter(|listing| {
                let rejection = ListingFilter::first_rejection(listing, held, policy);
                if let Some(reason) = rejection {
                    debug!(loan_id = listing.id, reason = %reason, "Listing filtered out");
                }
                rejection.is_none()
            })
            .map(|listing| RankedCandidate {
                listing: listing.clone(),
                eligible: true,
                rank_key: listing.int_rate,
            })
            .collect();

        // `sort_by` is stable: equal rates keep their original order.
        ranked.sort_by(|a, b| b.rank_key.cmp(&a.rank_key));
        ranked
    }

    pub fn plan(
        listings: &[Listing],
        held: &HeldNoteSet,
        policy: &Policy,
        balance: Decimal,
    ) -> AllocationPlan {
        let mut ranked = Self::rank(listings, held, policy);
        let eligible_count = ranked.len();
        let max_orders = Self::affordable_units(balance, policy.loan_unit_amount);
        ranked.truncate(max_orders);

        info!(
            listings = listings.len(),
            eligible = eligible_count,
            affordable = max_orders,
            selected = ranked.len(),
            balance = %balance,
            "Allocation planned"
        );
        for candidate in &ranked {
            debug!(listing = %candidate.listing, "Selected for purchase");
        }

        AllocationPlan {
            orders: ranked,
            unit_amount: policy.loan_unit_amount,
            max_orders,
            listings_seen: listings.len(),
            eligible_count,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
