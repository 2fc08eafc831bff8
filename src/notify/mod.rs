//! Balance notifications.
//!
//! Defines the `Mailer` trait, the Mailgun implementation, and the
//! stateless time-window gate that keeps alerts from repeating.

pub mod gate;
pub mod mailgun;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::types::LendError;

pub use gate::NotificationGate;
pub use mailgun::{MailgunClient, MailgunSettings};

/// Outbound mail plus the provider's delivery history.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Tag attached to every message this mailer sends.
    fn tag(&self) -> &str;

    async fn send(&self, subject: &str, text: &str) -> Result<(), LendError>;

    /// When the most recent message carrying `tag` was delivered, if ever.
    async fn last_delivered_at(&self, tag: &str) -> Result<Option<DateTime<Utc>>, LendError>;
}
