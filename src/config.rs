//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` (or the path given on the command line) into
//! strongly-typed structs. Secrets are referenced by env-var name in the
//! file and resolved at startup into [`SecretString`]s.

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use secrecy::SecretString;
use serde::Deserialize;
use std::fs;
use std::time::Duration;

use crate::engine::NotifySettings;
use crate::marketplace::client::{DEFAULT_API_VERSION, DEFAULT_BASE_URL};
use crate::marketplace::rate_limit::DEFAULT_INTERVAL;
use crate::marketplace::MarketplaceCredentials;
use crate::notify::mailgun::{self, MailgunSettings};
use crate::types::{LendError, Policy, WithdrawalPolicy};

pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub marketplace: MarketplaceConfig,
    #[serde(default)]
    pub policy: Policy,
    #[serde(default)]
    pub withdrawal: WithdrawalPolicy,
    pub notify: Option<NotifySettings>,
    pub mailgun: Option<MailgunConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MarketplaceConfig {
    #[serde(default = "default_marketplace_url")]
    pub base_url: String,
    #[serde(default = "default_api_version")]
    pub api_version: String,
    /// Minimum spacing between marketplace requests.
    #[serde(default = "default_throttle_ms")]
    pub throttle_ms: u64,
    pub account_id_env: String,
    pub api_key_env: String,
    /// Only needed when running as a partner application.
    #[serde(default)]
    pub third_party_key_env: Option<String>,
    #[serde(default)]
    pub portfolio_id: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MailgunConfig {
    #[serde(default = "default_mailgun_url")]
    pub base_url: String,
    pub api_key_env: String,
    pub domain: String,
    pub from: String,
    #[serde(default)]
    pub to: String,
    pub tag: String,
}

fn default_marketplace_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_api_version() -> String {
    DEFAULT_API_VERSION.to_string()
}

fn default_throttle_ms() -> u64 {
    DEFAULT_INTERVAL.as_millis() as u64
}

fn default_mailgun_url() -> String {
    mailgun::DEFAULT_BASE_URL.to_string()
}

impl MarketplaceConfig {
    pub fn throttle(&self) -> Duration {
        Duration::from_millis(self.throttle_ms)
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::from_toml(&contents).with_context(|| format!("Failed to parse config file: {path}"))
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents)?;
        Ok(config)
    }

    /// Check the values that do not depend on the environment.
    pub fn validate(&self) -> Result<(), LendError> {
        let policy = &self.policy;
        if policy.loan_unit_amount <= Decimal::ZERO {
            return Err(LendError::Configuration(format!(
                "policy.loan_unit_amount must be positive, got {}",
                policy.loan_unit_amount
            )));
        }
        if policy.min_open_credit_lines > policy.max_open_credit_lines {
            return Err(LendError::Configuration(format!(
                "policy.min_open_credit_lines ({}) exceeds policy.max_open_credit_lines ({})",
                policy.min_open_credit_lines, policy.max_open_credit_lines
            )));
        }
        if self.withdrawal.min_withdrawal < Decimal::ZERO {
            return Err(LendError::Configuration(
                "withdrawal.min_withdrawal must not be negative".into(),
            ));
        }
        if let Some(notify) = &self.notify {
            if !notify.min_hours_between.is_finite() || notify.min_hours_between < 0.0 {
                return Err(LendError::Configuration(
                    "notify.min_hours_between must be a non-negative number".into(),
                ));
            }
        }
        if let Some(mail) = &self.mailgun {
            if mail.to.trim().is_empty() {
                return Err(LendError::Configuration(
                    "mailgun.to (notification recipient) is not set".into(),
                ));
            }
        }
        Ok(())
    }

    /// Resolve the marketplace account id and keys from the environment.
    pub fn marketplace_credentials(&self) -> Result<MarketplaceCredentials, LendError> {
        self.marketplace_credentials_with(|name| std::env::var(name).ok())
    }

    pub fn marketplace_credentials_with(
        &self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<MarketplaceCredentials, LendError> {
        let m = &self.marketplace;
        let third_party_key = match &m.third_party_key_env {
            Some(name) => Some(SecretString::new(required(&lookup, name)?)),
            None => None,
        };
        Ok(MarketplaceCredentials {
            account_id: required(&lookup, &m.account_id_env)?,
            api_key: SecretString::new(required(&lookup, &m.api_key_env)?),
            third_party_key,
            portfolio_id: m.portfolio_id.clone(),
        })
    }

    /// The notification threshold and the Mailgun settings, both required
    /// for the `notify` command.
    pub fn notification(&self) -> Result<(NotifySettings, MailgunSettings), LendError> {
        self.notification_with(|name| std::env::var(name).ok())
    }

    pub fn notification_with(
        &self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(NotifySettings, MailgunSettings), LendError> {
        let notify = self
            .notify
            .clone()
            .ok_or_else(|| LendError::Configuration("[notify] section is missing".into()))?;
        let mail = self
            .mailgun
            .as_ref()
            .ok_or_else(|| LendError::Configuration("[mailgun] section is missing".into()))?;
        let settings = MailgunSettings {
            base_url: mail.base_url.clone(),
            api_key: SecretString::new(required(&lookup, &mail.api_key_env)?),
            domain: mail.domain.clone(),
            from: mail.from.clone(),
            to: mail.to.clone(),
            tag: mail.tag.clone(),
        };
        Ok((notify, settings))
    }
}

fn required(lookup: &impl Fn(&str) -> Option<String>, env_name: &str) -> Result<String, LendError> {
    lookup(env_name)
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| LendError::Configuration(format!("Environment variable not set: {env_name}")))
}
