//! End-to-end runs of the three flows against the in-memory marketplace.

use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use rust_decimal_macros::dec;
use std::time::Duration;

use lendbot::engine::{
    BalanceAlert, ExecutionStatus, InvestmentPipeline, NotifyOutcome, NotifySettings,
    PipelineState, WithdrawalRun,
};
use lendbot::http::Method;
use lendbot::marketplace::RateLimiter;
use lendbot::types::{Policy, WithdrawalPolicy};

use crate::fake_marketplace::{listing, FakeMailer, FakeMarketplace};

/// Eight listings: five pass every filter, one of those is already held.
fn marketplace(balance: rust_decimal::Decimal) -> FakeMarketplace {
    let mut in_california = listing(4, 30.0);
    in_california["addrState"] = "CA".into();
    let mut long_term = listing(5, 30.0);
    long_term["term"] = 60.into();
    let mut prime = listing(7, 30.0);
    prime["grade"] = "B".into();

    FakeMarketplace::new(balance)
        .with_listings(vec![
            listing(1, 14.5),
            listing(2, 19.99),
            listing(3, 14.5),
            in_california,
            long_term,
            listing(6, 25.0),
            prime,
            listing(8, 11.0),
        ])
        .with_held(&[6])
}

fn ordered_loan_ids(body: &str) -> Vec<u64> {
    let payload: serde_json::Value = serde_json::from_str(body).unwrap();
    payload["orders"]
        .as_array()
        .unwrap()
        .iter()
        .map(|line| line["loanId"].as_u64().unwrap())
        .collect()
}

// ---------------------------------------------------------------------------
// Invest
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_invest_buys_best_rates_within_budget() {
    let fake = marketplace(dec!(80));
    let client = fake.client();
    let policy = Policy::default();

    let run = InvestmentPipeline::new(&client, &policy).run().await;

    assert_eq!(run.final_state(), PipelineState::Done);
    let report = run.result.unwrap();
    assert_eq!(report.status(), ExecutionStatus::Placed);
    assert_eq!(report.plan.listings_seen, 8);
    assert_eq!(report.plan.eligible_count, 4);
    assert_eq!(report.outcome.orders_submitted, 3);
    assert_eq!(report.outcome.confirmations.len(), 3);
    assert_eq!(report.outcome.invested_amount(), dec!(75));

    let writes = fake.writes();
    assert_eq!(writes.len(), 1);
    assert_eq!(writes[0].path, "/v1/accounts/4242/orders");
    // Highest rate first; equal rates keep listing order.
    assert_eq!(ordered_loan_ids(writes[0].body.as_deref().unwrap()), vec![2, 1, 3]);

    assert_eq!(fake.balance(), dec!(5));
    assert!(fake.held().is_superset(&[1, 2, 3, 6].into_iter().collect()));
}

#[tokio::test(start_paused = true)]
async fn test_reads_happen_in_order_and_are_spaced() {
    let fake = marketplace(dec!(80));
    let client = fake.client();
    let policy = Policy::default();

    InvestmentPipeline::new(&client, &policy).run().await.result.unwrap();

    let calls = fake.calls();
    let paths: Vec<&str> = calls.iter().map(|c| c.path.as_str()).collect();
    assert_eq!(
        paths,
        vec![
            "/v1/accounts/4242/availablecash",
            "/v1/loans/listing?showAll=true",
            "/v1/accounts/4242/notes",
            "/v1/accounts/4242/orders",
        ]
    );
    for pair in calls.windows(2) {
        assert!(pair[1].at - pair[0].at >= Duration::from_millis(1000));
    }
}

#[tokio::test(start_paused = true)]
async fn test_second_run_does_not_rebuy_held_notes() {
    let fake = marketplace(dec!(200));
    let client = fake.client();
    let policy = Policy::default();

    let first = InvestmentPipeline::new(&client, &policy).run().await;
    // Four eligible listings, eight affordable units.
    assert_eq!(first.result.unwrap().outcome.orders_submitted, 4);

    let second = InvestmentPipeline::new(&client, &policy).run().await;
    let report = second.result.unwrap();
    assert_eq!(report.plan.eligible_count, 0);
    assert_eq!(report.status(), ExecutionStatus::Skipped);
    assert_eq!(fake.writes().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_listing_with_null_attributes_is_still_considered() {
    let mut sparse = listing(9, 21.0);
    sparse["inqLast6Mths"] = serde_json::Value::Null;
    sparse["pubRec"] = serde_json::Value::Null;
    sparse["revolBal"] = serde_json::Value::Null;
    let fake = FakeMarketplace::new(dec!(50)).with_listings(vec![listing(1, 14.5), sparse]);
    let client = fake.client();
    let policy = Policy::default();

    let run = InvestmentPipeline::new(&client, &policy).run().await;

    let report = run.result.unwrap();
    assert_eq!(report.plan.eligible_count, 2);
    let writes = fake.writes();
    assert_eq!(ordered_loan_ids(writes[0].body.as_deref().unwrap()), vec![9, 1]);
}

#[tokio::test(start_paused = true)]
async fn test_unavailable_read_prevents_any_order() {
    for fragment in ["/availablecash", "/loans/listing", "/notes"] {
        let fake = marketplace(dec!(500));
        fake.fail_on(fragment, 503);
        let client = fake.client();
        let policy = Policy::default();

        let run = InvestmentPipeline::new(&client, &policy).run().await;

        assert_eq!(run.final_state(), PipelineState::Failed, "{fragment}");
        assert!(!run.reached(PipelineState::Executing), "{fragment}");
        assert_eq!(run.result.unwrap_err().error.status(), Some(503));
        assert!(fake.writes().is_empty(), "{fragment}");
        assert_eq!(fake.balance(), dec!(500));
    }
}

#[tokio::test(start_paused = true)]
async fn test_disabled_ordering_reads_but_never_writes() {
    let fake = marketplace(dec!(80));
    let client = fake.client();
    let policy = Policy {
        place_orders_enabled: false,
        ..Policy::default()
    };

    let run = InvestmentPipeline::new(&client, &policy).run().await;

    let report = run.result.unwrap();
    assert_eq!(report.outcome.orders_submitted, 0);
    assert_eq!(report.plan.len(), 3);
    assert_eq!(fake.calls().len(), 3);
    assert!(fake.writes().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_rejected_order_fails_the_run() {
    let fake = marketplace(dec!(80));
    fake.fail_on("/orders", 400);
    let client = fake.client();
    let policy = Policy::default();

    let run = InvestmentPipeline::new(&client, &policy).run().await;

    let failure = run.result.unwrap_err();
    assert_eq!(failure.state, PipelineState::Executing);
    assert_eq!(failure.error.status(), Some(400));
    assert_eq!(fake.balance(), dec!(80));
}

// ---------------------------------------------------------------------------
// Withdraw
// ---------------------------------------------------------------------------

fn withdrawals() -> WithdrawalPolicy {
    WithdrawalPolicy {
        enabled: true,
        min_withdrawal: dec!(25),
    }
}

#[tokio::test(start_paused = true)]
async fn test_withdraws_idle_cash() {
    let fake = FakeMarketplace::new(dec!(130.75));
    let client = fake.client();
    let policy = withdrawals();

    let outcome = WithdrawalRun::new(&client, &policy).run().await.unwrap();

    assert!(outcome.submitted);
    assert_eq!(fake.withdrawn(), dec!(130.75));
    assert_eq!(fake.writes()[0].path, "/v1/accounts/4242/funds/withdraw");
}

#[tokio::test(start_paused = true)]
async fn test_small_balance_is_not_withdrawn() {
    let fake = FakeMarketplace::new(dec!(20));
    let client = fake.client();
    let policy = withdrawals();

    let outcome = WithdrawalRun::new(&client, &policy).run().await.unwrap();

    assert!(!outcome.submitted);
    assert!(fake.writes().is_empty());
    assert_eq!(fake.balance(), dec!(20));
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_flows_share_one_rate_limit() {
    let fake = marketplace(dec!(80));
    let limiter = RateLimiter::new(Duration::from_millis(1000));
    let invest_client = fake.client_with(limiter.clone());
    let withdraw_client = fake.client_with(limiter);
    let policy = Policy::default();
    let withdrawal = withdrawals();

    let invest = InvestmentPipeline::new(&invest_client, &policy);
    let withdraw = WithdrawalRun::new(&withdraw_client, &withdrawal);
    let (run, _) = tokio::join!(invest.run(), withdraw.run());
    assert!(run.is_success());

    let mut calls = fake.calls();
    assert!(calls.len() >= 5);
    calls.sort_by_key(|c| c.at);
    for pair in calls.windows(2) {
        assert!(pair[1].at - pair[0].at >= Duration::from_millis(1000));
    }
    assert_eq!(
        calls.iter().filter(|c| c.method == Method::Get).count(),
        4
    );
}

// ---------------------------------------------------------------------------
// Notify
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_notification_respects_quiet_window() {
    let fake = FakeMarketplace::new(dec!(150.25));
    let client = fake.client();
    let mailer = FakeMailer::new("lendbot-balance");
    let settings = NotifySettings {
        min_balance: dec!(100),
        min_hours_between: 6.0,
    };
    let t0 = Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap();
    mailer.set_clock(t0);
    let alert = BalanceAlert::new(&client, &mailer, &settings);

    let first = alert.run_at(t0).await.unwrap();
    assert_eq!(first, NotifyOutcome::Sent { balance: dec!(150.25) });
    assert_eq!(
        mailer.sent(),
        vec![(
            "LendingClub Balance Notification".to_string(),
            "You have $150.25 in your LendingClub account.".to_string()
        )]
    );

    let second = alert.run_at(t0 + ChronoDuration::hours(2)).await.unwrap();
    assert_eq!(second, NotifyOutcome::Suppressed { last_sent_at: t0 });
    // Suppressed runs never reach the marketplace.
    assert_eq!(fake.calls().len(), 1);

    let third = alert.run_at(t0 + ChronoDuration::hours(7)).await.unwrap();
    assert!(matches!(third, NotifyOutcome::Sent { .. }));
    assert_eq!(mailer.sent().len(), 2);
    assert_eq!(fake.calls().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_low_balance_is_not_mailed() {
    let fake = FakeMarketplace::new(dec!(40));
    let client = fake.client();
    let mailer = FakeMailer::new("lendbot-balance");
    mailer.set_last_delivered(Utc::now() - ChronoDuration::days(3));
    let settings = NotifySettings {
        min_balance: dec!(100),
        min_hours_between: 6.0,
    };

    let outcome = BalanceAlert::new(&client, &mailer, &settings)
        .run()
        .await
        .unwrap();

    assert_eq!(outcome, NotifyOutcome::BelowThreshold { balance: dec!(40) });
    assert!(mailer.sent().is_empty());
}
