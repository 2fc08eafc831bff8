//! Order executor.
//!
//! Submits an allocation plan through the marketplace client, attaches the
//! decision context (listings seen, eligible count, balance) to the
//! outcome, and logs the record.

use rust_decimal::Decimal;
use tracing::{error, info};

use crate::marketplace::MarketplaceClient;
use crate::types::{AccountSnapshot, AllocationPlan, LendError, OrderOutcome, Policy};

// ---------------------------------------------------------------------------
// Execution result
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionStatus {
    /// An order batch went out and was accepted.
    Placed,
    /// Nothing to send, or ordering is disabled.
    Skipped,
    Failed,
}

/// Everything known about a run's decision and its submission.
#[derive(Debug, Clone)]
pub struct ExecutionReport {
    pub plan: AllocationPlan,
    pub balance: Decimal,
    pub outcome: OrderOutcome,
}

impl ExecutionReport {
    pub fn status(&self) -> ExecutionStatus {
        if !self.outcome.succeeded {
            ExecutionStatus::Failed
        } else if self.outcome.orders_submitted == 0 {
            ExecutionStatus::Skipped
        } else {
            ExecutionStatus::Placed
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome.succeeded
    }

    fn log(&self) {
        if self.is_success() {
            info!(
                available_cash = %self.balance,
                listings = self.plan.listings_seen,
                eligible = self.plan.eligible_count,
                planned = self.plan.len(),
                submitted = self.outcome.orders_submitted,
                invested = %self.outcome.invested_amount(),
                status = ?self.status(),
                "Lending finished successfully."
            );
        } else {
            error!(
                available_cash = %self.balance,
                listings = self.plan.listings_seen,
                eligible = self.plan.eligible_count,
                planned = self.plan.len(),
                reason = self.outcome.failure_reason.as_deref().unwrap_or("unknown"),
                "Order submission failed"
            );
        }
    }
}

// ---------------------------------------------------------------------------
// Executor
// ---------------------------------------------------------------------------

pub struct OrderExecutor<'a> {
    client: &'a MarketplaceClient,
}

impl<'a> OrderExecutor<'a> {
    pub fn new(client: &'a MarketplaceClient) -> Self {
        Self { client }
    }

    /// Submit the plan. On failure the report is still logged (with the
    /// reason) before the error is handed back to the caller.
    ///
    /// A transport failure here leaves the true order state unknown; the
    /// next run's held-notes query is what reconciles it.
    pub async fn execute(
        &self,
        plan: AllocationPlan,
        policy: &Policy,
        snapshot: AccountSnapshot,
    ) -> Result<ExecutionReport, LendError> {
        match self.client.submit_orders(&plan, policy).await {
            Ok(outcome) => {
                let report = ExecutionReport {
                    plan,
                    balance: snapshot.balance,
                    outcome,
                };
                report.log();
                Ok(report)
            }
            Err(e) => {
                let report = ExecutionReport {
                    outcome: OrderOutcome::failed(plan.len(), e.to_string()),
                    plan,
                    balance: snapshot.balance,
                };
                report.log();
                Err(e)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
