//! Mailgun integration.
//!
//! API docs: https://documentation.mailgun.com/docs/mailgun/api-reference/
//! Base URL: https://api.mailgun.net/v3/
//! Auth: HTTP basic, user `api`, password = API key.
//!
//! Notifications are tagged so the events API can answer "when was the
//! last one delivered?" without any local bookkeeping.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info};

use super::Mailer;
use crate::http::{parse_json, send_checked, HttpRequest, HttpTransport};
use crate::types::LendError;

pub const DEFAULT_BASE_URL: &str = "https://api.mailgun.net/v3";

/// Everything needed to send and look up tagged notifications.
pub struct MailgunSettings {
    pub base_url: String,
    pub api_key: SecretString,
    pub domain: String,
    pub from: String,
    pub to: String,
    pub tag: String,
}

#[derive(Debug, Deserialize)]
struct EventsResponse {
    #[serde(default)]
    items: Vec<Event>,
}

#[derive(Debug, Deserialize)]
struct Event {
    /// Seconds since the epoch, with a fractional part.
    timestamp: f64,
}

pub struct MailgunClient {
    transport: Arc<dyn HttpTransport>,
    settings: MailgunSettings,
}

impl MailgunClient {
    pub fn new(transport: Arc<dyn HttpTransport>, settings: MailgunSettings) -> Self {
        Self { transport, settings }
    }

    fn domain_url(&self, path: &str) -> String {
        format!(
            "{}/{}/{}",
            self.settings.base_url.trim_end_matches('/'),
            self.settings.domain,
            path
        )
    }

    fn authorize(&self, request: HttpRequest) -> HttpRequest {
        request.basic_auth("api", self.settings.api_key.expose_secret().as_str())
    }

    fn encode_pairs(pairs: &[(&str, &str)]) -> String {
        pairs
            .iter()
            .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&")
    }

    fn epoch_seconds_to_datetime(seconds: f64) -> Option<DateTime<Utc>> {
        if !seconds.is_finite() {
            return None;
        }
        Utc.timestamp_millis_opt((seconds * 1000.0).round() as i64).single()
    }
}

#[async_trait]
impl Mailer for MailgunClient {
    fn tag(&self) -> &str {
        &self.settings.tag
    }

    async fn send(&self, subject: &str, text: &str) -> Result<(), LendError> {
        const OP: &str = "mail_send";
        let form = Self::encode_pairs(&[
            ("from", self.settings.from.as_str()),
            ("to", self.settings.to.as_str()),
            ("subject", subject),
            ("text", text),
            ("o:tag", self.settings.tag.as_str()),
        ]);
        let request = HttpRequest::post(self.domain_url("messages"), form)
            .header("Content-Type", "application/x-www-form-urlencoded");

        send_checked(self.transport.as_ref(), OP, self.authorize(request)).await?;
        info!(to = %self.settings.to, subject, "Notification sent");
        Ok(())
    }

    async fn last_delivered_at(&self, tag: &str) -> Result<Option<DateTime<Utc>>, LendError> {
        const OP: &str = "mail_last_delivered";
        let query = Self::encode_pairs(&[
            ("event", "delivered"),
            ("to", self.settings.to.as_str()),
            ("ascending", "no"),
            ("limit", "1"),
            ("tags", tag),
        ]);
        let url = format!("{}?{}", self.domain_url("events"), query);

        let body = send_checked(self.transport.as_ref(), OP, self.authorize(HttpRequest::get(url))).await?;
        let parsed: EventsResponse = parse_json(OP, &body)?;

        let last = match parsed.items.first() {
            None => None,
            Some(event) => Some(Self::epoch_seconds_to_datetime(event.timestamp).ok_or_else(|| {
                LendError::Parse {
                    operation: OP,
                    message: format!("invalid timestamp {}", event.timestamp),
                }
            })?),
        };
        debug!(tag, last = ?last, "Last delivered notification");
        Ok(last)
    }
}
