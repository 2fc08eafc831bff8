//! Minimum-interval rate limiter for the marketplace API.
//!
//! The marketplace allows one request per second per account. Every
//! client operation calls [`RateLimiter::acquire`] first; clones of a
//! limiter share one "next eligible time" watermark, so independent flows
//! in the same process coordinate through it.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep_until, Instant};
use tracing::trace;

/// Default spacing between marketplace requests.
pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(1000);

#[derive(Debug, Clone)]
pub struct RateLimiter {
    interval: Duration,
    next_eligible: Arc<Mutex<Instant>>,
}

/// Proof that a slot was granted. Carries the instant the slot opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Permit {
    pub granted_at: Instant,
}

impl RateLimiter {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            next_eligible: Arc::new(Mutex::new(Instant::now())),
        }
    }

    /// Wait for the next slot.
    ///
    /// The slot is reserved while holding the lock and the wait happens
    /// after releasing it, so callers are released in the order they
    /// reserved (tokio's mutex is FIFO).
    pub async fn acquire(&self) -> Permit {
        let slot = {
            let mut next = self.next_eligible.lock().await;
            let slot = (*next).max(Instant::now());
            *next = slot + self.interval;
            slot
        };

        if slot > Instant::now() {
            trace!(wait_ms = (slot - Instant::now()).as_millis() as u64, "Rate limit wait");
            sleep_until(slot).await;
        }

        Permit { granted_at: slot }
    }
}
