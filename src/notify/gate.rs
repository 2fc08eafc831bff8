//! Time-window gate for balance notifications.
//!
//! Stateless: the last send time comes from the mail provider's delivery
//! history on every run, so nothing drifts between runs.

use chrono::{DateTime, Utc};

pub struct NotificationGate;

impl NotificationGate {
    /// `true` when nothing was sent before, or the last send is at least
    /// `min_hours_between` hours old.
    pub fn should_notify(
        last_sent_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
        min_hours_between: f64,
    ) -> bool {
        match last_sent_at {
            None => true,
            Some(last) => {
                let hours = (now - last).num_milliseconds() as f64 / 3_600_000.0;
                hours >= min_hours_between
            }
        }
    }
}
