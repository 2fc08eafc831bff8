//! In-memory marketplace for integration testing.
//!
//! Implements `HttpTransport` by routing on the request path, so the real
//! `MarketplaceClient` runs unmodified against it. Balance, listings and
//! held notes are fully controllable from test code, and every request is
//! recorded with the (tokio) instant it arrived.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use secrecy::SecretString;
use serde_json::{json, Value};
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

use lendbot::http::{HttpRequest, HttpResponse, HttpTransport, Method, TransportError};
use lendbot::marketplace::{MarketplaceClient, MarketplaceCredentials, RateLimiter};
use lendbot::notify::Mailer;
use lendbot::types::LendError;

pub const ACCOUNT_ID: &str = "4242";
pub const BASE_URL: &str = "https://marketplace.test/api/investor";

/// One request as the fake saw it.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub method: Method,
    pub path: String,
    pub body: Option<String>,
    pub at: Instant,
}

#[derive(Default)]
struct State {
    balance: Decimal,
    listings: Vec<Value>,
    held: BTreeSet<u64>,
    calls: Vec<RecordedCall>,
    /// Path fragment that answers with this status instead of data.
    failure: Option<(String, u16)>,
    withdrawn: Decimal,
}

/// A deterministic fake of the marketplace REST API.
#[derive(Clone, Default)]
pub struct FakeMarketplace {
    state: Arc<Mutex<State>>,
}

impl FakeMarketplace {
    pub fn new(balance: Decimal) -> Self {
        let fake = Self::default();
        fake.state.lock().unwrap().balance = balance;
        fake
    }

    pub fn with_listings(self, listings: Vec<Value>) -> Self {
        self.state.lock().unwrap().listings = listings;
        self
    }

    pub fn with_held(self, ids: &[u64]) -> Self {
        self.state.lock().unwrap().held.extend(ids);
        self
    }

    /// Answer every request whose path contains `fragment` with `status`.
    pub fn fail_on(&self, fragment: &str, status: u16) {
        self.state.lock().unwrap().failure = Some((fragment.to_string(), status));
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn writes(&self) -> Vec<RecordedCall> {
        self.calls()
            .into_iter()
            .filter(|c| c.method == Method::Post)
            .collect()
    }

    pub fn balance(&self) -> Decimal {
        self.state.lock().unwrap().balance
    }

    pub fn held(&self) -> BTreeSet<u64> {
        self.state.lock().unwrap().held.clone()
    }

    pub fn withdrawn(&self) -> Decimal {
        self.state.lock().unwrap().withdrawn
    }

    /// A client wired to this fake, with the production one-second spacing.
    pub fn client(&self) -> MarketplaceClient {
        self.client_with(RateLimiter::new(Duration::from_millis(1000)))
    }

    pub fn client_with(&self, limiter: RateLimiter) -> MarketplaceClient {
        MarketplaceClient::new(
            Arc::new(self.clone()),
            limiter,
            BASE_URL,
            "v1",
            MarketplaceCredentials {
                account_id: ACCOUNT_ID.to_string(),
                api_key: SecretString::new("test-api-key".to_string()),
                third_party_key: None,
                portfolio_id: None,
            },
        )
    }

    fn route(state: &mut State, request: &HttpRequest, path: &str) -> HttpResponse {
        let account = format!("/v1/accounts/{ACCOUNT_ID}");
        match (request.method, path) {
            (Method::Get, p) if p.starts_with("/v1/loans/listing") => {
                HttpResponse::new(200, json!({ "asOfDate": "now", "loans": state.listings }).to_string())
            }
            (Method::Get, p) if p == format!("{account}/availablecash") => HttpResponse::new(
                200,
                json!({ "investorId": ACCOUNT_ID, "availableCash": state.balance }).to_string(),
            ),
            (Method::Get, p) if p == format!("{account}/notes") => {
                let notes: Vec<Value> = state.held.iter().map(|id| json!({ "loanId": id })).collect();
                HttpResponse::new(200, json!({ "myNotes": notes }).to_string())
            }
            (Method::Post, p) if p == format!("{account}/orders") => Self::place(state, request),
            (Method::Post, p) if p == format!("{account}/funds/withdraw") => {
                let amount = Self::body(request)["amount"]
                    .as_f64()
                    .and_then(|a| Decimal::try_from(a).ok())
                    .unwrap_or_default();
                state.balance -= amount;
                state.withdrawn += amount;
                HttpResponse::new(200, json!({ "amount": amount }).to_string())
            }
            _ => HttpResponse::new(404, "not found"),
        }
    }

    fn body(request: &HttpRequest) -> Value {
        request
            .body
            .as_deref()
            .and_then(|b| serde_json::from_str(b).ok())
            .unwrap_or(Value::Null)
    }

    /// Fill every line in full, debit the balance and record the notes.
    fn place(state: &mut State, request: &HttpRequest) -> HttpResponse {
        let payload = Self::body(request);
        let mut confirmations = Vec::new();
        for line in payload["orders"].as_array().cloned().unwrap_or_default() {
            let loan_id = line["loanId"].as_u64().unwrap_or_default();
            let amount = line["requestedAmount"].as_f64().unwrap_or_default();
            state.balance -= Decimal::try_from(amount).unwrap_or_default();
            state.held.insert(loan_id);
            confirmations.push(json!({
                "loanId": loan_id,
                "requestedAmount": amount,
                "investedAmount": amount,
                "executionStatus": ["ORDER_FULFILLED"],
            }));
        }
        HttpResponse::new(
            200,
            json!({ "orderInstructId": 9001, "orderConfirmations": confirmations }).to_string(),
        )
    }
}

#[async_trait]
impl HttpTransport for FakeMarketplace {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let path = request
            .url
            .strip_prefix(BASE_URL)
            .unwrap_or(&request.url)
            .to_string();

        let mut state = self.state.lock().unwrap();
        state.calls.push(RecordedCall {
            method: request.method,
            path: path.clone(),
            body: request.body.clone(),
            at: Instant::now(),
        });

        if request.header_value("Authorization") != Some("test-api-key") {
            return Ok(HttpResponse::new(401, "unauthorized"));
        }
        if let Some((fragment, status)) = &state.failure {
            if path.contains(fragment.as_str()) {
                return Ok(HttpResponse::new(*status, "unavailable"));
            }
        }
        Ok(Self::route(&mut state, &request, &path))
    }
}

/// A listing payload that passes the default policy. Tweak fields with
/// `listing(..)["field"] = ...` to make it fail a specific filter.
pub fn listing(id: u64, int_rate: f64) -> Value {
    json!({
        "id": id,
        "memberId": id * 10,
        "addrState": "TX",
        "term": 36,
        "grade": "D",
        "subGrade": "D2",
        "loanAmount": 12000.0,
        "fundedAmount": 0.0,
        "empLength": 72,
        "inqLast6Mths": 1,
        "purpose": "credit_card",
        "pubRec": 0,
        "delinq2Yrs": 0,
        "openAcc": 9,
        "revolBal": 15000.0,
        "intRate": int_rate,
    })
}

// ---------------------------------------------------------------------------
// Mailer
// ---------------------------------------------------------------------------

/// Mail provider fake: remembers what was sent and when it was delivered.
#[derive(Clone, Default)]
pub struct FakeMailer {
    tag: String,
    clock: Arc<Mutex<Option<DateTime<Utc>>>>,
    last_delivered: Arc<Mutex<Option<DateTime<Utc>>>>,
    sent: Arc<Mutex<Vec<(String, String)>>>,
}

impl FakeMailer {
    pub fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_string(),
            ..Self::default()
        }
    }

    /// Delivery time stamped on the next `send`.
    pub fn set_clock(&self, now: DateTime<Utc>) {
        *self.clock.lock().unwrap() = Some(now);
    }

    pub fn set_last_delivered(&self, at: DateTime<Utc>) {
        *self.last_delivered.lock().unwrap() = Some(at);
    }

    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Mailer for FakeMailer {
    fn tag(&self) -> &str {
        &self.tag
    }

    async fn send(&self, subject: &str, text: &str) -> Result<(), LendError> {
        self.sent
            .lock()
            .unwrap()
            .push((subject.to_string(), text.to_string()));
        let delivered = self.clock.lock().unwrap().unwrap_or_else(Utc::now);
        *self.last_delivered.lock().unwrap() = Some(delivered);
        Ok(())
    }

    async fn last_delivered_at(&self, tag: &str) -> Result<Option<DateTime<Utc>>, LendError> {
        if tag != self.tag {
            return Ok(None);
        }
        Ok(*self.last_delivered.lock().unwrap())
    }
}
