//! Balance alert run.
//!
//! Asks the mail provider when the last alert went out, and only when the
//! quiet window has passed reads the balance and mails it if it meets the
//! threshold. A suppressed run makes no marketplace call at all.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{error, info, info_span, Instrument};
use uuid::Uuid;

use crate::marketplace::MarketplaceClient;
use crate::notify::{Mailer, NotificationGate};
use crate::types::LendError;

pub const SUBJECT: &str = "LendingClub Balance Notification";

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NotifySettings {
    /// Alert only when the balance is at least this much.
    pub min_balance: Decimal,
    pub min_hours_between: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NotifyOutcome {
    /// A previous alert is still inside the quiet window.
    Suppressed { last_sent_at: DateTime<Utc> },
    BelowThreshold { balance: Decimal },
    Sent { balance: Decimal },
}

pub fn alert_text(balance: Decimal) -> String {
    format!("You have ${balance} in your LendingClub account.")
}

pub struct BalanceAlert<'a> {
    client: &'a MarketplaceClient,
    mailer: &'a dyn Mailer,
    settings: &'a NotifySettings,
}

impl<'a> BalanceAlert<'a> {
    pub fn new(
        client: &'a MarketplaceClient,
        mailer: &'a dyn Mailer,
        settings: &'a NotifySettings,
    ) -> Self {
        Self {
            client,
            mailer,
            settings,
        }
    }

    pub async fn run(&self) -> Result<NotifyOutcome, LendError> {
        self.run_at(Utc::now()).await
    }

    /// Same as [`run`](Self::run) with an explicit clock reading.
    pub async fn run_at(&self, now: DateTime<Utc>) -> Result<NotifyOutcome, LendError> {
        let span = info_span!("notify", run_id = %Uuid::new_v4());
        async move {
            let result = self.check_and_send(now).await;
            if let Err(e) = &result {
                error!(error = %e, "Balance notification failed");
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn check_and_send(&self, now: DateTime<Utc>) -> Result<NotifyOutcome, LendError> {
        let last = self.mailer.last_delivered_at(self.mailer.tag()).await?;
        if let Some(last_sent_at) = last {
            if !NotificationGate::should_notify(last, now, self.settings.min_hours_between) {
                info!(
                    last_sent_at = %last_sent_at,
                    min_hours_between = self.settings.min_hours_between,
                    "Notification sent recently, skipping"
                );
                return Ok(NotifyOutcome::Suppressed { last_sent_at });
            }
        }

        let balance = self.client.fetch_balance().await?.balance;
        if balance < self.settings.min_balance {
            info!(
                balance = %balance,
                min_balance = %self.settings.min_balance,
                "Balance below notification threshold"
            );
            return Ok(NotifyOutcome::BelowThreshold { balance });
        }

        self.mailer.send(SUBJECT, &alert_text(balance)).await?;
        info!(balance = %balance, "Balance notification finished successfully.");
        Ok(NotifyOutcome::Sent { balance })
    }
}
