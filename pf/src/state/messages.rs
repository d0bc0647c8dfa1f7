//! State manager messages
//!
//! Commands and responses for the actor pattern.

use planstore::{Plan, PlanPatch, PlanStatus, UsageLogEntry};
use thiserror::Error;
use tokio::sync::oneshot;

/// Errors from state operations
#[derive(Debug, Error)]
pub enum StateError {
    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Store error: {0}")]
    StoreError(String),

    #[error("Channel error")]
    ChannelError,
}

/// Response from state operations
pub type StateResponse<T> = Result<T, StateError>;

/// Commands sent to the StateManager actor
#[derive(Debug)]
pub enum StateCommand {
    // Plan operations
    CreatePlan {
        plan: Plan,
        reply: oneshot::Sender<StateResponse<String>>,
    },
    GetPlan {
        id: String,
        reply: oneshot::Sender<StateResponse<Option<Plan>>>,
    },
    ApplyPatch {
        id: String,
        patch: PlanPatch,
        reply: oneshot::Sender<StateResponse<()>>,
    },
    ListPlans {
        status_filter: Option<PlanStatus>,
        reply: oneshot::Sender<StateResponse<Vec<Plan>>>,
    },

    // Guarded status flips
    FailIfInFlight {
        id: String,
        message: String,
        reply: oneshot::Sender<StateResponse<bool>>,
    },
    CompleteIfFinalising {
        id: String,
        total_cost: f64,
        reply: oneshot::Sender<StateResponse<bool>>,
    },

    // Usage log operations
    AppendUsage {
        entry: UsageLogEntry,
        reply: oneshot::Sender<StateResponse<i64>>,
    },
    ListUsage {
        plan_id: String,
        reply: oneshot::Sender<StateResponse<Vec<UsageLogEntry>>>,
    },
    TotalCost {
        plan_id: String,
        reply: oneshot::Sender<StateResponse<f64>>,
    },

    // Shutdown
    Shutdown,
}
