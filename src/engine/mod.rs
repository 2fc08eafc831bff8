//! Run orchestration: the investment pipeline and the two auxiliary
//! flows (withdrawal, balance alert) that share its marketplace client.

pub mod balance_alert;
pub mod executor;
pub mod pipeline;
pub mod withdraw;

pub use balance_alert::{BalanceAlert, NotifyOutcome, NotifySettings};
pub use executor::{ExecutionReport, ExecutionStatus, OrderExecutor};
pub use pipeline::{InvestmentPipeline, PipelineFailure, PipelineRun, PipelineState};
pub use withdraw::WithdrawalRun;
