//! Peer-lending marketplace REST client.
//!
//! API base: https://api.lendingclub.com/api/investor/{version}/
//! Rate limit: 1 request/second per account (enforced by [`RateLimiter`]).
//! Auth: `Authorization: {api key}` plus an optional
//! `X-LC-Application-Key: {third-party key}` for partner applications.
//!
//! Each operation makes exactly one request and never retries.

use rust_decimal::prelude::*;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::rate_limit::RateLimiter;
use crate::http::{parse_json, send_checked, HttpRequest, HttpTransport};
use crate::types::{
    AccountSnapshot, AllocationPlan, HeldNoteSet, LendError, Listing, LoanId, OrderConfirmation,
    OrderOutcome, Policy, WithdrawalOutcome, WithdrawalPolicy,
};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

pub const DEFAULT_BASE_URL: &str = "https://api.lendingclub.com/api/investor";
pub const DEFAULT_API_VERSION: &str = "v1";

/// Account identity and API keys.
#[derive(Debug)]
pub struct MarketplaceCredentials {
    pub account_id: String,
    pub api_key: SecretString,
    pub third_party_key: Option<SecretString>,
    /// Portfolio that newly purchased notes are filed under.
    pub portfolio_id: Option<String>,
}

// ---------------------------------------------------------------------------
// API wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ListingsResponse {
    /// Absent (or null) when nothing is open for funding.
    #[serde(default)]
    loans: Option<Vec<Listing>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AvailableCashResponse {
    #[serde(default)]
    available_cash: serde_json::Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NotesResponse {
    #[serde(default)]
    my_notes: Option<Vec<HeldNote>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HeldNote {
    loan_id: LoanId,
}

#[derive(Debug, Serialize)]
struct OrderRequest<'a> {
    aid: &'a str,
    orders: Vec<OrderLine<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct OrderLine<'a> {
    loan_id: LoanId,
    requested_amount: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    portfolio_id: Option<&'a str>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderResponse {
    #[serde(default)]
    order_instruct_id: Option<u64>,
    #[serde(default)]
    order_confirmations: Vec<OrderConfirmation>,
}

#[derive(Debug, Serialize)]
struct WithdrawRequest {
    amount: Decimal,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct MarketplaceClient {
    transport: Arc<dyn HttpTransport>,
    limiter: RateLimiter,
    base_url: String,
    credentials: MarketplaceCredentials,
}

impl MarketplaceClient {
    /// `base_url` excludes the API version; it is appended here.
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        limiter: RateLimiter,
        base_url: &str,
        api_version: &str,
        credentials: MarketplaceCredentials,
    ) -> Self {
        Self {
            transport,
            limiter,
            base_url: format!("{}/{}", base_url.trim_end_matches('/'), api_version),
            credentials,
        }
    }

    // -- Internal helpers ------------------------------------------------

    fn account_url(&self, path: &str) -> String {
        format!("{}/accounts/{}/{}", self.base_url, self.credentials.account_id, path)
    }

    fn authorize(&self, request: HttpRequest) -> HttpRequest {
        let mut request = request
            .header("Authorization", self.credentials.api_key.expose_secret().as_str())
            .header("Accept", "application/json");
        if let Some(key) = &self.credentials.third_party_key {
            request = request.header("X-LC-Application-Key", key.expose_secret().as_str());
        }
        if request.body.is_some() {
            request = request.header("Content-Type", "application/json");
        }
        request
    }

    /// Wait for a rate-limit slot, then send.
    async fn call(&self, operation: &'static str, request: HttpRequest) -> Result<String, LendError> {
        self.limiter.acquire().await;
        debug!(operation, method = %request.method, url = %request.url, "Marketplace request");
        let result = send_checked(self.transport.as_ref(), operation, self.authorize(request)).await;
        if let Err(e) = &result {
            warn!(operation, error = %e, "Marketplace request failed");
        }
        result
    }

    fn to_body<T: Serialize>(operation: &'static str, payload: &T) -> Result<String, LendError> {
        serde_json::to_string(payload).map_err(|e| LendError::Parse {
            operation,
            message: format!("encoding request: {e}"),
        })
    }

    /// Interpret `availableCash`. Numbers and numeric strings are accepted;
    /// anything else counts as no cash at all.
    fn cash_from_json(value: &serde_json::Value) -> Decimal {
        let parsed = match value {
            serde_json::Value::Number(n) => Decimal::from_str(&n.to_string())
                .ok()
                .or_else(|| n.as_f64().and_then(Decimal::from_f64)),
            serde_json::Value::String(s) => Decimal::from_str(s.trim()).ok(),
            _ => None,
        };
        parsed.unwrap_or_else(|| {
            warn!(value = %value, "availableCash is not numeric, treating as zero");
            Decimal::ZERO
        })
    }

    // -- Reads -----------------------------------------------------------

    /// All listings currently open for funding.
    pub async fn fetch_listings(&self) -> Result<Vec<Listing>, LendError> {
        const OP: &str = "fetch_listings";
        let url = format!("{}/loans/listing?showAll=true", self.base_url);
        let body = self.call(OP, HttpRequest::get(url)).await?;
        let parsed: ListingsResponse = parse_json(OP, &body)?;
        let listings = parsed.loans.unwrap_or_default();
        info!(count = listings.len(), "Listings fetched");
        Ok(listings)
    }

    pub async fn fetch_balance(&self) -> Result<AccountSnapshot, LendError> {
        const OP: &str = "fetch_balance";
        let body = self.call(OP, HttpRequest::get(self.account_url("availablecash"))).await?;
        let parsed: AvailableCashResponse = parse_json(OP, &body)?;
        let snapshot = AccountSnapshot::new(Self::cash_from_json(&parsed.available_cash));
        info!(balance = %snapshot.balance, "Balance fetched");
        Ok(snapshot)
    }

    /// Loan ids of every note the account holds.
    pub async fn fetch_held_notes(&self) -> Result<HeldNoteSet, LendError> {
        const OP: &str = "fetch_held_notes";
        let body = self.call(OP, HttpRequest::get(self.account_url("notes"))).await?;
        let parsed: NotesResponse = parse_json(OP, &body)?;
        let held: HeldNoteSet = parsed
            .my_notes
            .unwrap_or_default()
            .into_iter()
            .map(|n| n.loan_id)
            .collect();
        info!(count = held.len(), "Held notes fetched");
        Ok(held)
    }

    // -- Writes ----------------------------------------------------------

    /// Submit one batched order for every plan member.
    ///
    /// Makes no request at all when the plan is empty or ordering is
    /// disabled by policy.
    pub async fn submit_orders(
        &self,
        plan: &AllocationPlan,
        policy: &Policy,
    ) -> Result<OrderOutcome, LendError> {
        const OP: &str = "submit_orders";

        if !policy.place_orders_enabled {
            info!(planned = plan.len(), "Order placement disabled, skipping submission");
            return Ok(OrderOutcome::skipped());
        }
        if plan.is_empty() {
            debug!("Empty plan, nothing to submit");
            return Ok(OrderOutcome::skipped());
        }

        let payload = OrderRequest {
            aid: &self.credentials.account_id,
            orders: plan
                .orders
                .iter()
                .map(|c| OrderLine {
                    loan_id: c.listing.id,
                    requested_amount: plan.unit_amount,
                    portfolio_id: self.credentials.portfolio_id.as_deref(),
                })
                .collect(),
        };
        let body = Self::to_body(OP, &payload)?;

        let response = self.call(OP, HttpRequest::post(self.account_url("orders"), body)).await?;
        let parsed: OrderResponse = if response.trim().is_empty() {
            OrderResponse::default()
        } else {
            parse_json(OP, &response)?
        };

        info!(
            orders = payload.orders.len(),
            instruct_id = ?parsed.order_instruct_id,
            confirmations = parsed.order_confirmations.len(),
            "Orders submitted"
        );

        Ok(OrderOutcome {
            orders_submitted: payload.orders.len(),
            succeeded: true,
            failure_reason: None,
            confirmations: parsed.order_confirmations,
        })
    }

    /// Move `amount` out of the account.
    ///
    /// No request is made when withdrawals are disabled or the amount is
    /// not above the configured minimum.
    pub async fn submit_withdrawal(
        &self,
        amount: Decimal,
        policy: &WithdrawalPolicy,
    ) -> Result<WithdrawalOutcome, LendError> {
        const OP: &str = "submit_withdrawal";

        if !policy.enabled {
            info!("Withdrawals disabled, skipping");
            return Ok(WithdrawalOutcome { requested: amount, submitted: false });
        }
        if amount <= policy.min_withdrawal {
            info!(
                amount = %amount,
                min_withdrawal = %policy.min_withdrawal,
                "Balance below withdrawal threshold"
            );
            return Ok(WithdrawalOutcome { requested: amount, submitted: false });
        }

        let body = Self::to_body(OP, &WithdrawRequest { amount })?;
        self.call(OP, HttpRequest::post(self.account_url("funds/withdraw"), body))
            .await?;

        info!(amount = %amount, "Withdrawal submitted");
        Ok(WithdrawalOutcome { requested: amount, submitted: true })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
