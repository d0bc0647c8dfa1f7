//! StateManager - actor that owns the plan store
//!
//! Processes commands via channels so SQLite access stays on a single task
//! while the server, orchestrator and CLI all hold cloneable handles.

use std::path::Path;

use planstore::{Plan, PlanPatch, PlanStatus, Store, StoreError, UsageLogEntry};
use tokio::sync::mpsc;
use tracing::{debug, info};

use super::messages::{StateCommand, StateError, StateResponse};

/// Handle to send commands to the StateManager
#[derive(Clone)]
pub struct StateManager {
    tx: mpsc::Sender<StateCommand>,
}

impl StateManager {
    /// Spawn a new StateManager actor backed by the database at `db_path`
    pub fn spawn(db_path: impl AsRef<Path>) -> eyre::Result<Self> {
        let db_path = db_path.as_ref();
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let store = Store::open(db_path)?;
        info!(db_path = %db_path.display(), "State manager spawned");
        Ok(Self::start(store))
    }

    /// Spawn an actor over an in-memory database (tests, one-shot runs)
    pub fn spawn_in_memory() -> eyre::Result<Self> {
        let store = Store::open_in_memory()?;
        info!("State manager spawned (in-memory)");
        Ok(Self::start(store))
    }

    fn start(store: Store) -> Self {
        let (tx, rx) = mpsc::channel(256);
        tokio::spawn(actor_loop(store, rx));
        Self { tx }
    }

    /// Create a new plan, returning its id
    pub async fn create_plan(&self, plan: Plan) -> StateResponse<String> {
        let (reply_tx, reply_rx) = tokio::sync::oneshot::channel();
        self.tx
            .send(StateCommand::CreatePlan {
                plan,
                reply: reply_tx,
            })
            .await
            .map_err(|_| StateError::ChannelError)?;
        reply_rx.await.map_err(|_| StateError::ChannelError)?
    }

    /// Get a plan by id
    pub async fn get_plan(&self, id: &str) -> StateResponse<Option<Plan>> {
        let (reply_tx, reply_rx) = tokio::sync::oneshot::channel();
        self.tx
            .send(StateCommand::GetPlan {
                id: id.to_string(),
                reply: reply_tx,
            })
            .await
            .map_err(|_| StateError::ChannelError)?;
        reply_rx.await.map_err(|_| StateError::ChannelError)?
    }

    /// Get a plan by id, returning an error if not found
    pub async fn get_plan_required(&self, id: &str) -> Result<Plan, StateError> {
        self.get_plan(id)
            .await?
            .ok_or_else(|| StateError::NotFound(format!("Plan {}", id)))
    }

    /// Apply a partial update to a plan
    pub async fn apply_patch(&self, id: &str, patch: PlanPatch) -> StateResponse<()> {
        let (reply_tx, reply_rx) = tokio::sync::oneshot::channel();
        self.tx
            .send(StateCommand::ApplyPatch {
                id: id.to_string(),
                patch,
                reply: reply_tx,
            })
            .await
            .map_err(|_| StateError::ChannelError)?;
        reply_rx.await.map_err(|_| StateError::ChannelError)?
    }

    /// List plans, newest first, optionally filtered by status
    pub async fn list_plans(&self, status_filter: Option<PlanStatus>) -> StateResponse<Vec<Plan>> {
        let (reply_tx, reply_rx) = tokio::sync::oneshot::channel();
        self.tx
            .send(StateCommand::ListPlans {
                status_filter,
                reply: reply_tx,
            })
            .await
            .map_err(|_| StateError::ChannelError)?;
        reply_rx.await.map_err(|_| StateError::ChannelError)?
    }

    /// Mark a plan failed only while it is still in flight
    ///
    /// Returns whether the status changed. Terminal plans are untouched.
    pub async fn fail_if_in_flight(&self, id: &str, message: &str) -> StateResponse<bool> {
        let (reply_tx, reply_rx) = tokio::sync::oneshot::channel();
        self.tx
            .send(StateCommand::FailIfInFlight {
                id: id.to_string(),
                message: message.to_string(),
                reply: reply_tx,
            })
            .await
            .map_err(|_| StateError::ChannelError)?;
        reply_rx.await.map_err(|_| StateError::ChannelError)?
    }

    /// Flip `finalising` to `completed` when the document already landed
    pub async fn complete_if_finalising(&self, id: &str, total_cost: f64) -> StateResponse<bool> {
        let (reply_tx, reply_rx) = tokio::sync::oneshot::channel();
        self.tx
            .send(StateCommand::CompleteIfFinalising {
                id: id.to_string(),
                total_cost,
                reply: reply_tx,
            })
            .await
            .map_err(|_| StateError::ChannelError)?;
        reply_rx.await.map_err(|_| StateError::ChannelError)?
    }

    /// Append a usage-log entry, returning its row id
    pub async fn append_usage(&self, entry: UsageLogEntry) -> StateResponse<i64> {
        let (reply_tx, reply_rx) = tokio::sync::oneshot::channel();
        self.tx
            .send(StateCommand::AppendUsage {
                entry,
                reply: reply_tx,
            })
            .await
            .map_err(|_| StateError::ChannelError)?;
        reply_rx.await.map_err(|_| StateError::ChannelError)?
    }

    /// List usage-log entries for a plan, in insertion order
    pub async fn list_usage(&self, plan_id: &str) -> StateResponse<Vec<UsageLogEntry>> {
        let (reply_tx, reply_rx) = tokio::sync::oneshot::channel();
        self.tx
            .send(StateCommand::ListUsage {
                plan_id: plan_id.to_string(),
                reply: reply_tx,
            })
            .await
            .map_err(|_| StateError::ChannelError)?;
        reply_rx.await.map_err(|_| StateError::ChannelError)?
    }

    /// Sum of usage costs for a plan; zero when nothing is logged
    pub async fn total_cost(&self, plan_id: &str) -> StateResponse<f64> {
        let (reply_tx, reply_rx) = tokio::sync::oneshot::channel();
        self.tx
            .send(StateCommand::TotalCost {
                plan_id: plan_id.to_string(),
                reply: reply_tx,
            })
            .await
            .map_err(|_| StateError::ChannelError)?;
        reply_rx.await.map_err(|_| StateError::ChannelError)?
    }

    /// Shutdown the StateManager
    pub async fn shutdown(&self) -> Result<(), StateError> {
        self.tx
            .send(StateCommand::Shutdown)
            .await
            .map_err(|_| StateError::ChannelError)
    }
}

/// The actor loop that owns the Store and processes commands
async fn actor_loop(store: Store, mut rx: mpsc::Receiver<StateCommand>) {
    debug!("State manager actor started");

    while let Some(cmd) = rx.recv().await {
        match cmd {
            StateCommand::CreatePlan { plan, reply } => {
                debug!(plan_id = %plan.id, "actor_loop: CreatePlan command");
                let id = plan.id.clone();
                let result = store.create(&plan).map(|_| id).map_err(store_error);
                let _ = reply.send(result);
            }

            StateCommand::GetPlan { id, reply } => {
                let result = store.get(&id).map_err(store_error);
                let _ = reply.send(result);
            }

            StateCommand::ApplyPatch { id, patch, reply } => {
                debug!(plan_id = %id, status = ?patch.status, "actor_loop: ApplyPatch command");
                let result = store.apply(&id, &patch).map_err(store_error);
                let _ = reply.send(result);
            }

            StateCommand::ListPlans {
                status_filter,
                reply,
            } => {
                let result = store.list(status_filter).map_err(store_error);
                let _ = reply.send(result);
            }

            StateCommand::FailIfInFlight { id, message, reply } => {
                debug!(plan_id = %id, "actor_loop: FailIfInFlight command");
                let result = store.fail_if_in_flight(&id, &message).map_err(store_error);
                let _ = reply.send(result);
            }

            StateCommand::CompleteIfFinalising {
                id,
                total_cost,
                reply,
            } => {
                debug!(plan_id = %id, "actor_loop: CompleteIfFinalising command");
                let result = store
                    .complete_if_finalising(&id, total_cost)
                    .map_err(store_error);
                let _ = reply.send(result);
            }

            StateCommand::AppendUsage { entry, reply } => {
                debug!(plan_id = %entry.plan_id, stage = entry.stage, "actor_loop: AppendUsage command");
                let result = store.append_usage(&entry).map_err(store_error);
                let _ = reply.send(result);
            }

            StateCommand::ListUsage { plan_id, reply } => {
                let result = store.usage_for_plan(&plan_id).map_err(store_error);
                let _ = reply.send(result);
            }

            StateCommand::TotalCost { plan_id, reply } => {
                let result = store.total_cost(&plan_id).map_err(store_error);
                let _ = reply.send(result);
            }

            StateCommand::Shutdown => {
                debug!("actor_loop: Shutdown command");
                break;
            }
        }
    }

    debug!("State manager actor stopped");
}

fn store_error(e: StoreError) -> StateError {
    match e {
        StoreError::NotFound(id) => StateError::NotFound(id),
        other => StateError::StoreError(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn sample_plan() -> Plan {
        Plan::new(json!({"1_nome": "Padaria Central", "2_setor": "Padaria artesanal"}))
    }

    #[tokio::test]
    async fn test_create_and_get_plan() {
        let manager = StateManager::spawn_in_memory().unwrap();

        let plan = sample_plan();
        let id = manager.create_plan(plan.clone()).await.unwrap();
        assert_eq!(id, plan.id);

        let fetched = manager.get_plan(&id).await.unwrap().unwrap();
        assert_eq!(fetched.status, PlanStatus::Pending);
        assert_eq!(fetched.questionnaire, plan.questionnaire);

        manager.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_spawn_creates_parent_directories() {
        let temp = tempdir().unwrap();
        let db_path = temp.path().join("nested").join("plans.db");
        let manager = StateManager::spawn(&db_path).unwrap();

        manager.create_plan(sample_plan()).await.unwrap();
        assert!(db_path.exists());

        manager.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_get_plan_required_not_found() {
        let manager = StateManager::spawn_in_memory().unwrap();

        let result = manager.get_plan_required("missing").await;
        assert!(matches!(result, Err(StateError::NotFound(_))));

        manager.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_apply_patch_advances_status() {
        let manager = StateManager::spawn_in_memory().unwrap();
        let id = manager.create_plan(sample_plan()).await.unwrap();

        let patch = PlanPatch::new().with_status(PlanStatus::Analysing);
        manager.apply_patch(&id, patch).await.unwrap();

        let plan = manager.get_plan_required(&id).await.unwrap();
        assert_eq!(plan.status, PlanStatus::Analysing);

        manager.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_apply_patch_unknown_plan_is_not_found() {
        let manager = StateManager::spawn_in_memory().unwrap();

        let patch = PlanPatch::new().with_status(PlanStatus::Analysing);
        let result = manager.apply_patch("missing", patch).await;
        assert!(matches!(result, Err(StateError::NotFound(_))));

        manager.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_fail_if_in_flight_respects_terminal_states() {
        let manager = StateManager::spawn_in_memory().unwrap();
        let id = manager.create_plan(sample_plan()).await.unwrap();

        let changed = manager
            .fail_if_in_flight(&id, "Timeout: a geração excedeu o tempo máximo.")
            .await
            .unwrap();
        assert!(changed);

        let plan = manager.get_plan_required(&id).await.unwrap();
        assert_eq!(plan.status, PlanStatus::Failed);
        assert!(plan.error_message.is_some());
        assert!(plan.completed_at.is_some());

        // Already terminal, so the second attempt is a no-op
        let changed = manager.fail_if_in_flight(&id, "again").await.unwrap();
        assert!(!changed);

        manager.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_complete_if_finalising_recovers_orphaned_plan() {
        let manager = StateManager::spawn_in_memory().unwrap();
        let id = manager.create_plan(sample_plan()).await.unwrap();

        // A run that persisted the document but died before its status write
        let patch = PlanPatch::new()
            .with_status(PlanStatus::Finalising)
            .with_final_document("# PLANO DE MARKETING ESTRATÉGICO".to_string());
        manager.apply_patch(&id, patch).await.unwrap();

        let changed = manager.complete_if_finalising(&id, 0.42).await.unwrap();
        assert!(changed);

        let plan = manager.get_plan_required(&id).await.unwrap();
        assert_eq!(plan.status, PlanStatus::Completed);
        assert_eq!(plan.total_cost, Some(0.42));
        assert!(plan.completed_at.is_some());

        // Second flip is a no-op
        let changed = manager.complete_if_finalising(&id, 0.42).await.unwrap();
        assert!(!changed);

        manager.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_append_usage_and_total_cost() {
        let manager = StateManager::spawn_in_memory().unwrap();
        let id = manager.create_plan(sample_plan()).await.unwrap();

        let analyst = UsageLogEntry::new(&id, 2, "gpt-4o")
            .with_tokens(1000, 500)
            .with_cost(0.0075);
        let strategist = UsageLogEntry::new(&id, 3, "claude-sonnet-4-5-20250929")
            .with_tokens(2000, 4000)
            .with_cost(0.066);
        manager.append_usage(analyst).await.unwrap();
        manager.append_usage(strategist).await.unwrap();

        let entries = manager.list_usage(&id).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].stage, 2);
        assert_eq!(entries[1].stage, 3);

        let total = manager.total_cost(&id).await.unwrap();
        assert!((total - 0.0735).abs() < 1e-9);

        manager.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_list_plans_with_status_filter() {
        let manager = StateManager::spawn_in_memory().unwrap();

        let first = manager.create_plan(sample_plan()).await.unwrap();
        let second = manager.create_plan(sample_plan()).await.unwrap();
        manager
            .apply_patch(&second, PlanPatch::new().with_status(PlanStatus::Analysing))
            .await
            .unwrap();

        let all = manager.list_plans(None).await.unwrap();
        assert_eq!(all.len(), 2);

        let pending = manager.list_plans(Some(PlanStatus::Pending)).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, first);

        manager.shutdown().await.unwrap();
    }
}
