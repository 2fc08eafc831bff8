//! Investment pipeline.
//!
//! One run is a strict sequence:
//!
//! ```text
//! Idle → FetchingBalance → FetchingListings → FetchingHeldNotes
//!      → Planning → Executing → Done
//! ```
//!
//! with `Failed` reachable from every state after `Idle`. Each stage owns
//! the data the next one needs, so a state cannot be entered without its
//! inputs. Every read must succeed before the single write (`Executing`)
//! is attempted.

use std::fmt;
use tracing::{error, info, info_span, Instrument};
use uuid::Uuid;

use super::executor::{ExecutionReport, OrderExecutor};
use crate::marketplace::MarketplaceClient;
use crate::strategy::planner::AllocationPlanner;
use crate::types::{AccountSnapshot, AllocationPlan, HeldNoteSet, LendError, Listing, Policy};

// ---------------------------------------------------------------------------
// States
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    FetchingBalance,
    FetchingListings,
    FetchingHeldNotes,
    Planning,
    Executing,
    Done,
    Failed,
}

impl PipelineState {
    pub fn is_terminal(self) -> bool {
        matches!(self, PipelineState::Done | PipelineState::Failed)
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PipelineState::Idle => "idle",
            PipelineState::FetchingBalance => "fetching balance",
            PipelineState::FetchingListings => "fetching listings",
            PipelineState::FetchingHeldNotes => "fetching held notes",
            PipelineState::Planning => "planning",
            PipelineState::Executing => "executing",
            PipelineState::Done => "done",
            PipelineState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// A state together with the data collected so far.
enum Stage {
    Idle,
    FetchingBalance,
    FetchingListings {
        snapshot: AccountSnapshot,
    },
    FetchingHeldNotes {
        snapshot: AccountSnapshot,
        listings: Vec<Listing>,
    },
    Planning {
        snapshot: AccountSnapshot,
        listings: Vec<Listing>,
        held: HeldNoteSet,
    },
    Executing {
        snapshot: AccountSnapshot,
        plan: AllocationPlan,
    },
    Done(Box<ExecutionReport>),
    Failed(PipelineFailure),
}

impl Stage {
    fn state(&self) -> PipelineState {
        match self {
            Stage::Idle => PipelineState::Idle,
            Stage::FetchingBalance => PipelineState::FetchingBalance,
            Stage::FetchingListings { .. } => PipelineState::FetchingListings,
            Stage::FetchingHeldNotes { .. } => PipelineState::FetchingHeldNotes,
            Stage::Planning { .. } => PipelineState::Planning,
            Stage::Executing { .. } => PipelineState::Executing,
            Stage::Done(_) => PipelineState::Done,
            Stage::Failed(_) => PipelineState::Failed,
        }
    }
}

// ---------------------------------------------------------------------------
// Run result
// ---------------------------------------------------------------------------

/// The error that ended a run and the state it happened in.
#[derive(Debug, thiserror::Error)]
#[error("failed while {state}: {error}")]
pub struct PipelineFailure {
    pub state: PipelineState,
    #[source]
    pub error: LendError,
}

#[derive(Debug)]
pub struct PipelineRun {
    pub run_id: Uuid,
    /// Every state entered, in order, starting with `Idle`.
    pub trace: Vec<PipelineState>,
    pub result: Result<ExecutionReport, PipelineFailure>,
}

impl PipelineRun {
    pub fn final_state(&self) -> PipelineState {
        self.trace.last().copied().unwrap_or(PipelineState::Idle)
    }

    pub fn reached(&self, state: PipelineState) -> bool {
        self.trace.contains(&state)
    }

    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

pub struct InvestmentPipeline<'a> {
    client: &'a MarketplaceClient,
    policy: &'a Policy,
}

impl<'a> InvestmentPipeline<'a> {
    pub fn new(client: &'a MarketplaceClient, policy: &'a Policy) -> Self {
        Self { client, policy }
    }

    /// Execute one full run. Never retries; the first error ends it.
    pub async fn run(&self) -> PipelineRun {
        let run_id = Uuid::new_v4();
        let span = info_span!("invest", %run_id);

        async move {
            info!(
                place_orders = self.policy.place_orders_enabled,
                unit = %self.policy.loan_unit_amount,
                "Investment run starting"
            );

            let mut stage = Stage::Idle;
            let mut trace = vec![stage.state()];
            let result = loop {
                stage = match stage {
                    Stage::Done(report) => break Ok(*report),
                    Stage::Failed(failure) => {
                        error!(state = %failure.state, error = %failure.error, "Investment run failed");
                        break Err(failure);
                    }
                    pending => self.advance(pending).await,
                };
                trace.push(stage.state());
            };

            PipelineRun { run_id, trace, result }
        }
        .instrument(span)
        .await
    }

    /// The transition function: perform the current state's work and
    /// return the next state.
    async fn advance(&self, stage: Stage) -> Stage {
        let state = stage.state();
        let fail = |error: LendError| Stage::Failed(PipelineFailure { state, error });

        match stage {
            Stage::Idle => Stage::FetchingBalance,

            Stage::FetchingBalance => match self.client.fetch_balance().await {
                Ok(snapshot) => Stage::FetchingListings { snapshot },
                Err(e) => fail(e),
            },

            Stage::FetchingListings { snapshot } => match self.client.fetch_listings().await {
                Ok(listings) => Stage::FetchingHeldNotes { snapshot, listings },
                Err(e) => fail(e),
            },

            Stage::FetchingHeldNotes { snapshot, listings } => {
                match self.client.fetch_held_notes().await {
                    Ok(held) => Stage::Planning {
                        snapshot,
                        listings,
                        held,
                    },
                    Err(e) => fail(e),
                }
            }

            Stage::Planning {
                snapshot,
                listings,
                held,
            } => {
                let plan = AllocationPlanner::plan(&listings, &held, self.policy, snapshot.balance);
                Stage::Executing { snapshot, plan }
            }

            Stage::Executing { snapshot, plan } => {
                match OrderExecutor::new(self.client)
                    .execute(plan, self.policy, snapshot)
                    .await
                {
                    Ok(report) => Stage::Done(Box::new(report)),
                    Err(e) => fail(e),
                }
            }

            terminal @ (Stage::Done(_) | Stage::Failed(_)) => terminal,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
