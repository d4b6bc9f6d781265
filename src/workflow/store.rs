//! Persistence for step outputs and run statuses.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::engine::WorkflowError;

/// Identifier of a workflow run, derived from the function id and event id.
pub type RunId = Uuid;

/// Lifecycle state of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunStatus {
    /// Event accepted, execution not yet started.
    Queued,
    /// A worker is currently executing the run.
    Executing,
    /// Run finished; holds the function's final output.
    Completed(Value),
    /// Run exhausted retries; holds the failure message.
    Failed(String),
}

/// Durable storage for memoized step outputs and run statuses.
///
/// Implementations must persist a step output before `save_output` returns,
/// since resumption correctness depends on completed steps never re-running.
#[async_trait]
pub trait StepStore: Send + Sync {
    /// Fetch the memoized output for a step, if the step already completed.
    async fn load_output(&self, run_id: RunId, step: &str) -> Result<Option<Value>, WorkflowError>;

    /// Record a completed step's output.
    async fn save_output(&self, run_id: RunId, step: &str, output: Value)
    -> Result<(), WorkflowError>;

    /// Update the run's lifecycle status.
    async fn set_status(&self, run_id: RunId, status: RunStatus) -> Result<(), WorkflowError>;

    /// Fetch the run's current status, if the run is known.
    async fn status(&self, run_id: RunId) -> Result<Option<RunStatus>, WorkflowError>;
}

/// In-memory step store for tests and single-process deployments.
#[derive(Default)]
pub struct MemoryStepStore {
    outputs: Mutex<HashMap<(RunId, String), Value>>,
    statuses: Mutex<HashMap<RunId, RunStatus>>,
}

impl MemoryStepStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StepStore for MemoryStepStore {
    async fn load_output(&self, run_id: RunId, step: &str) -> Result<Option<Value>, WorkflowError> {
        Ok(self
            .outputs
            .lock()
            .await
            .get(&(run_id, step.to_string()))
            .cloned())
    }

    async fn save_output(
        &self,
        run_id: RunId,
        step: &str,
        output: Value,
    ) -> Result<(), WorkflowError> {
        self.outputs
            .lock()
            .await
            .insert((run_id, step.to_string()), output);
        Ok(())
    }

    async fn set_status(&self, run_id: RunId, status: RunStatus) -> Result<(), WorkflowError> {
        self.statuses.lock().await.insert(run_id, status);
        Ok(())
    }

    async fn status(&self, run_id: RunId) -> Result<Option<RunStatus>, WorkflowError> {
        Ok(self.statuses.lock().await.get(&run_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn outputs_are_keyed_by_run_and_step() {
        let store = MemoryStepStore::new();
        let run_a = Uuid::new_v4();
        let run_b = Uuid::new_v4();

        store
            .save_output(run_a, "chunk", json!({ "chunks": 3 }))
            .await
            .expect("save");

        assert_eq!(
            store.load_output(run_a, "chunk").await.expect("load"),
            Some(json!({ "chunks": 3 }))
        );
        assert_eq!(store.load_output(run_a, "embed").await.expect("load"), None);
        assert_eq!(store.load_output(run_b, "chunk").await.expect("load"), None);
    }

    #[tokio::test]
    async fn status_transitions_are_recorded() {
        let store = MemoryStepStore::new();
        let run = Uuid::new_v4();

        assert_eq!(store.status(run).await.expect("status"), None);
        store
            .set_status(run, RunStatus::Executing)
            .await
            .expect("set");
        store
            .set_status(run, RunStatus::Completed(json!({ "ok": true })))
            .await
            .expect("set");
        assert_eq!(
            store.status(run).await.expect("status"),
            Some(RunStatus::Completed(json!({ "ok": true })))
        );
    }
}
