//! Shared types for LENDBOT.
//!
//! These types form the data model used across all modules. Every value
//! here is created fresh for a single run and discarded when it ends; the
//! only durable state lives in the marketplace account and the mail
//! provider's delivery history.

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::fmt;

/// Marketplace identifier of a loan listing (and of the note it becomes).
pub type LoanId = u64;

/// Term length, in months, treated as "long term" by the policy.
pub const LONG_TERM_MONTHS: u32 = 60;

// ---------------------------------------------------------------------------
// Account
// ---------------------------------------------------------------------------

/// Available cash, captured once per run by the balance query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccountSnapshot {
    pub balance: Decimal,
}

impl AccountSnapshot {
    pub fn new(balance: Decimal) -> Self {
        Self { balance }
    }
}

// ---------------------------------------------------------------------------
// Listing
// ---------------------------------------------------------------------------

/// Risk tier assigned by the marketplace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Grade {
    A,
    B,
    C,
    D,
    E,
    F,
    G,
}

impl Grade {
    pub const ALL: &'static [Grade] = &[
        Grade::A,
        Grade::B,
        Grade::C,
        Grade::D,
        Grade::E,
        Grade::F,
        Grade::G,
    ];
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Grade::A => "A",
            Grade::B => "B",
            Grade::C => "C",
            Grade::D => "D",
            Grade::E => "E",
            Grade::F => "F",
            Grade::G => "G",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for Grade {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "A" => Ok(Grade::A),
            "B" => Ok(Grade::B),
            "C" => Ok(Grade::C),
            "D" => Ok(Grade::D),
            "E" => Ok(Grade::E),
            "F" => Ok(Grade::F),
            "G" => Ok(Grade::G),
            other => anyhow::bail!("Unknown grade: {other}"),
        }
    }
}

/// An open loan offer, exactly as the listing endpoint returns it.
///
/// Only the attributes the policy looks at are deserialized; everything
/// else in the payload is ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Listing {
    pub id: LoanId,
    #[serde(rename = "addrState")]
    pub state: String,
    /// Term in months (36 or 60).
    pub term: u32,
    pub grade: Grade,
    /// Amount the borrower requested.
    pub loan_amount: Decimal,
    /// Employment length in months. `null` when the borrower reported none.
    #[serde(default)]
    pub emp_length: Option<u32>,
    #[serde(rename = "inqLast6Mths", default, deserialize_with = "null_as_zero")]
    pub inquiries_last_6_months: u32,
    pub purpose: String,
    #[serde(rename = "pubRec", default, deserialize_with = "null_as_zero")]
    pub public_records: u32,
    #[serde(rename = "delinq2Yrs", default, deserialize_with = "null_as_zero")]
    pub delinquencies_2y: u32,
    #[serde(rename = "openAcc", default, deserialize_with = "null_as_zero")]
    pub open_credit_lines: u32,
    /// `None` when the marketplace does not report one.
    #[serde(rename = "revolBal", default)]
    pub revolving_balance: Option<Decimal>,
    /// Interest rate in percent, e.g. `13.49`.
    pub int_rate: Decimal,
}

impl Listing {
    /// Employment length in months, counting "unreported" as zero.
    pub fn months_employed(&self) -> u32 {
        self.emp_length.unwrap_or(0)
    }

    /// Helper to build a test listing that passes the default policy.
    #[cfg(test)]
    pub fn sample(id: LoanId, int_rate: Decimal) -> Self {
        use rust_decimal_macros::dec;
        Listing {
            id,
            state: "TX".to_string(),
            term: 36,
            grade: Grade::D,
            loan_amount: dec!(10000),
            emp_length: Some(60),
            inquiries_last_6_months: 0,
            purpose: "debt_consolidation".to_string(),
            public_records: 0,
            delinquencies_2y: 0,
            open_credit_lines: 8,
            revolving_balance: Some(dec!(12000)),
            int_rate,
        }
    }
}

/// Count fields arrive as `null` on some listings; those count as zero.
fn null_as_zero<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
    Ok(Option::<u32>::deserialize(deserializer)?.unwrap_or_default())
}

impl fmt::Display for Listing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{} [{} {}mo {}] ${} @ {}% ({})",
            self.id, self.grade, self.term, self.state, self.loan_amount, self.int_rate, self.purpose,
        )
    }
}

// ---------------------------------------------------------------------------
// Held notes
// ---------------------------------------------------------------------------

/// Loan ids the account already owns a note in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeldNoteSet {
    ids: HashSet<LoanId>,
}

impl HeldNoteSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, id: LoanId) -> bool {
        self.ids.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

impl FromIterator<LoanId> for HeldNoteSet {
    fn from_iter<I: IntoIterator<Item = LoanId>>(iter: I) -> Self {
        Self {
            ids: iter.into_iter().collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// Policy
// ---------------------------------------------------------------------------

/// Filter thresholds and operational switches for one run.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Policy {
    pub excluded_states: BTreeSet<String>,
    pub exclude_long_term: bool,
    pub excluded_grades: BTreeSet<Grade>,
    pub min_months_employed: u32,
    pub max_inquiries_6mo: u32,
    /// Empty means every purpose is allowed.
    pub included_purposes: BTreeSet<String>,
    pub exclude_public_records: bool,
    pub max_delinquencies_2y: u32,
    pub min_open_credit_lines: u32,
    pub max_open_credit_lines: u32,
    pub require_revolving_below_loan_amount: bool,
    /// Amount invested in every selected loan.
    pub loan_unit_amount: Decimal,
    pub place_orders_enabled: bool,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            excluded_states: ["CA", "FL", "NV"].iter().map(|s| s.to_string()).collect(),
            exclude_long_term: true,
            excluded_grades: [Grade::A, Grade::B, Grade::C].into_iter().collect(),
            min_months_employed: 24,
            max_inquiries_6mo: 2,
            included_purposes: ["credit_card", "debt_consolidation"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            exclude_public_records: true,
            max_delinquencies_2y: 0,
            min_open_credit_lines: 2,
            max_open_credit_lines: 19,
            require_revolving_below_loan_amount: true,
            loan_unit_amount: Decimal::from(25),
            place_orders_enabled: true,
        }
    }
}

impl Policy {
    /// A policy whose filters admit every listing (useful as a baseline
    /// when only one threshold is under test).
    pub fn permissive() -> Self {
        Self {
            excluded_states: BTreeSet::new(),
            exclude_long_term: false,
            excluded_grades: BTreeSet::new(),
            min_months_employed: 0,
            max_inquiries_6mo: u32::MAX,
            included_purposes: BTreeSet::new(),
            exclude_public_records: false,
            max_delinquencies_2y: u32::MAX,
            min_open_credit_lines: 0,
            max_open_credit_lines: u32::MAX,
            require_revolving_below_loan_amount: false,
            ..Self::default()
        }
    }
}

/// Idle-cash withdrawal switches.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct WithdrawalPolicy {
    pub enabled: bool,
    /// Withdrawals happen only when the balance is strictly above this.
    pub min_withdrawal: Decimal,
}

impl Default for WithdrawalPolicy {
    fn default() -> Self {
        Self {
            enabled: false,
            min_withdrawal: Decimal::from(25),
        }
    }
}

// ---------------------------------------------------------------------------
// Allocation
// ---------------------------------------------------------------------------

/// A listing that passed every filter, with its ranking key.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedCandidate {
    pub listing: Listing,
    pub eligible: bool,
    pub rank_key: Decimal,
}

/// Candidates chosen for purchase, best first.
#[derive(Debug, Clone, PartialEq)]
pub struct AllocationPlan {
    pub orders: Vec<RankedCandidate>,
    pub unit_amount: Decimal,
    /// `floor(balance / unit_amount)`, the hard cap on `orders.len()`.
    pub max_orders: usize,
    pub listings_seen: usize,
    pub eligible_count: usize,
}

impl AllocationPlan {
    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    /// Total cash committed if every order fills.
    pub fn total_amount(&self) -> Decimal {
        self.unit_amount * Decimal::from(self.orders.len())
    }
}

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// Per-line confirmation returned by the order endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderConfirmation {
    pub loan_id: LoanId,
    #[serde(default)]
    pub invested_amount: Decimal,
    #[serde(default)]
    pub execution_status: Vec<String>,
}

/// Terminal record of an order submission.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderOutcome {
    pub orders_submitted: usize,
    pub succeeded: bool,
    pub failure_reason: Option<String>,
    pub confirmations: Vec<OrderConfirmation>,
}

impl OrderOutcome {
    /// Nothing was sent (empty plan or ordering disabled).
    pub fn skipped() -> Self {
        Self {
            orders_submitted: 0,
            succeeded: true,
            failure_reason: None,
            confirmations: Vec::new(),
        }
    }

    pub fn failed(orders_submitted: usize, reason: impl Into<String>) -> Self {
        Self {
            orders_submitted,
            succeeded: false,
            failure_reason: Some(reason.into()),
            confirmations: Vec::new(),
        }
    }

    /// Sum of the amounts the marketplace reports as invested.
    pub fn invested_amount(&self) -> Decimal {
        self.confirmations.iter().map(|c| c.invested_amount).sum()
    }
}

/// Result of a withdrawal attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WithdrawalOutcome {
    pub requested: Decimal,
    pub submitted: bool,
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Every failure a run can end with. All of them are terminal for the run.
#[derive(Debug, thiserror::Error)]
pub enum LendError {
    /// No response was received.
    #[error("{operation}: {message}")]
    Transport {
        operation: &'static str,
        message: String,
    },

    /// A response arrived with a non-success status.
    #[error("{operation}: status code {status}")]
    Api { operation: &'static str, status: u16 },

    /// The response body was not what the endpoint promises.
    #[error("{operation}: malformed response: {message}")]
    Parse {
        operation: &'static str,
        message: String,
    },

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl LendError {
    /// HTTP status for `Api` errors.
    pub fn status(&self) -> Option<u16> {
        match self {
            LendError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
