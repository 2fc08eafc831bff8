//! Idle-cash withdrawal run: read the balance, then move it out when it
//! clears the configured threshold.

use tracing::{error, info, info_span, Instrument};
use uuid::Uuid;

use crate::marketplace::MarketplaceClient;
use crate::types::{LendError, WithdrawalOutcome, WithdrawalPolicy};

pub struct WithdrawalRun<'a> {
    client: &'a MarketplaceClient,
    policy: &'a WithdrawalPolicy,
}

impl<'a> WithdrawalRun<'a> {
    pub fn new(client: &'a MarketplaceClient, policy: &'a WithdrawalPolicy) -> Self {
        Self { client, policy }
    }

    pub async fn run(&self) -> Result<WithdrawalOutcome, LendError> {
        let span = info_span!("withdraw", run_id = %Uuid::new_v4());
        async move {
            let result = self.withdraw_idle_cash().await;
            if let Err(e) = &result {
                error!(error = %e, "Withdrawal failed");
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn withdraw_idle_cash(&self) -> Result<WithdrawalOutcome, LendError> {
        if !self.policy.enabled {
            info!("Withdrawals disabled, nothing to do");
            return Ok(WithdrawalOutcome {
                requested: Default::default(),
                submitted: false,
            });
        }

        let snapshot = self.client.fetch_balance().await?;
        let outcome = self
            .client
            .submit_withdrawal(snapshot.balance, self.policy)
            .await?;

        info!(
            available_cash = %snapshot.balance,
            withdrawn = outcome.submitted,
            "Withdrawal finished successfully."
        );
        Ok(outcome)
    }
}
