//! Run execution: memoized steps, retries, and event dispatch.

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use uuid::Uuid;

use super::event::Event;
use super::store::{RunId, RunStatus, StepStore};

/// Error type step closures return; any component error converts via `?`.
pub type StepError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors surfaced by the workflow engine.
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// No registered function listens for the event name.
    #[error("no workflow function registered for event '{0}'")]
    UnknownEvent(String),
    /// Event payload did not match the function's expected shape.
    #[error("event '{event}' carried an invalid payload: {message}")]
    BadEventPayload {
        /// Name of the offending event.
        event: String,
        /// Deserialization failure detail.
        message: String,
    },
    /// Step output failed to serialize or deserialize.
    #[error("failed to serialize step data: {0}")]
    Serialize(#[from] serde_json::Error),
    /// A step exhausted its retry budget.
    #[error("step '{step}' failed after {attempts} attempts: {message}")]
    StepFailed {
        /// Name of the failing step.
        step: String,
        /// Attempts made before giving up.
        attempts: u32,
        /// Message from the final attempt.
        message: String,
    },
    /// Step storage backend failed.
    #[error("step store failure: {0}")]
    Store(String),
    /// The dispatch loop has shut down and cannot accept events.
    #[error("workflow engine queue is closed")]
    QueueClosed,
}

/// Retry budget and timing applied to every step.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum attempts per step, including the first.
    pub max_attempts: u32,
    /// Delay before the first retry; doubles per subsequent retry.
    pub base_delay: Duration,
    /// Wall-clock limit for a single attempt.
    pub step_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(200),
            step_timeout: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    fn delay_for(&self, completed_attempts: u32) -> Duration {
        let factor = 2u32.saturating_pow(completed_attempts.saturating_sub(1));
        self.base_delay.saturating_mul(factor)
    }
}

/// Per-run handle passed to workflow functions for executing named steps.
pub struct StepContext {
    run_id: RunId,
    store: Arc<dyn StepStore>,
    retry: RetryPolicy,
}

impl StepContext {
    /// The id of the run this context belongs to.
    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    /// Execute a named step with memoization, per-attempt timeout, and retry.
    ///
    /// If the step already completed in an earlier delivery of the same event,
    /// its stored output is returned without invoking the closure.
    pub async fn run<T, F, Fut>(&self, name: &str, attempt: F) -> Result<T, WorkflowError>
    where
        T: Serialize + DeserializeOwned,
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, StepError>>,
    {
        if let Some(stored) = self.store.load_output(self.run_id, name).await? {
            tracing::debug!(run_id = %self.run_id, step = name, "Step already completed; reusing stored output");
            return Ok(serde_json::from_value(stored)?);
        }

        let mut attempts = 0;
        loop {
            attempts += 1;
            let result = tokio::time::timeout(self.retry.step_timeout, attempt()).await;
            let message = match result {
                Ok(Ok(output)) => {
                    let serialized = serde_json::to_value(&output)?;
                    self.store
                        .save_output(self.run_id, name, serialized)
                        .await?;
                    tracing::debug!(run_id = %self.run_id, step = name, attempts, "Step completed");
                    return Ok(output);
                }
                Ok(Err(err)) => err.to_string(),
                Err(_) => format!(
                    "attempt timed out after {:?}",
                    self.retry.step_timeout
                ),
            };

            if attempts >= self.retry.max_attempts {
                tracing::error!(run_id = %self.run_id, step = name, attempts, error = %message, "Step failed; retries exhausted");
                return Err(WorkflowError::StepFailed {
                    step: name.to_string(),
                    attempts,
                    message,
                });
            }

            let delay = self.retry.delay_for(attempts);
            tracing::warn!(run_id = %self.run_id, step = name, attempts, error = %message, delay_ms = delay.as_millis() as u64, "Step attempt failed; retrying");
            tokio::time::sleep(delay).await;
        }
    }
}

/// A durable function triggered by a named event.
#[async_trait]
pub trait WorkflowFn: Send + Sync {
    /// Stable function identifier, part of run-id derivation.
    fn id(&self) -> &'static str;

    /// Event name this function listens for.
    fn trigger(&self) -> &'static str;

    /// Execute the function's steps against the triggering event.
    async fn run(&self, ctx: &StepContext, event: &Event) -> Result<Value, WorkflowError>;
}

/// Registry and executor for workflow functions.
pub struct Engine {
    functions: HashMap<String, Arc<dyn WorkflowFn>>,
    store: Arc<dyn StepStore>,
    retry: RetryPolicy,
}

impl Engine {
    /// Create an engine over the given step store and retry policy.
    pub fn new(store: Arc<dyn StepStore>, retry: RetryPolicy) -> Self {
        Self {
            functions: HashMap::new(),
            store,
            retry,
        }
    }

    /// Register a function under its trigger; replaces any previous listener.
    pub fn register(&mut self, function: Arc<dyn WorkflowFn>) {
        tracing::debug!(function = function.id(), trigger = function.trigger(), "Registered workflow function");
        self.functions
            .insert(function.trigger().to_string(), function);
    }

    /// Derive the deterministic run id for a function and event pairing.
    pub fn run_id(function_id: &str, event_id: Uuid) -> RunId {
        Uuid::new_v5(
            &Uuid::NAMESPACE_URL,
            format!("{function_id}:{event_id}").as_bytes(),
        )
    }

    /// Execute the function registered for the event, honoring duplicate
    /// delivery: a run that already completed returns its stored output.
    pub async fn execute(&self, event: &Event) -> Result<Value, WorkflowError> {
        let function = self
            .functions
            .get(&event.name)
            .ok_or_else(|| WorkflowError::UnknownEvent(event.name.clone()))?;

        let run_id = Self::run_id(function.id(), event.id);
        if let Some(RunStatus::Completed(output)) = self.store.status(run_id).await? {
            tracing::info!(run_id = %run_id, event = %event.name, "Run already completed; returning stored output");
            return Ok(output);
        }

        self.store.set_status(run_id, RunStatus::Executing).await?;
        let ctx = StepContext {
            run_id,
            store: Arc::clone(&self.store),
            retry: self.retry.clone(),
        };

        match function.run(&ctx, event).await {
            Ok(output) => {
                self.store
                    .set_status(run_id, RunStatus::Completed(output.clone()))
                    .await?;
                tracing::info!(run_id = %run_id, event = %event.name, "Run completed");
                Ok(output)
            }
            Err(err) => {
                self.store
                    .set_status(run_id, RunStatus::Failed(err.to_string()))
                    .await?;
                tracing::error!(run_id = %run_id, event = %event.name, error = %err, "Run failed");
                Err(err)
            }
        }
    }

    /// Mark the run for an accepted event as queued, if a listener exists.
    async fn mark_queued(&self, event: &Event) {
        let Some(function) = self.functions.get(&event.name) else {
            return;
        };
        let run_id = Self::run_id(function.id(), event.id);
        if let Some(status) = self.store.status(run_id).await.ok().flatten()
            && !matches!(status, RunStatus::Queued)
        {
            // Re-delivery of a run that already progressed; leave its status.
            return;
        }
        if let Err(err) = self.store.set_status(run_id, RunStatus::Queued).await {
            tracing::warn!(run_id = %run_id, error = %err, "Failed to record queued status");
        }
    }

    /// Start the dispatch loop and return a handle for emitting events.
    ///
    /// Each event is executed on its own task so one slow run does not block
    /// the queue. Failures are logged; emitters are not notified.
    pub fn spawn(self: &Arc<Self>) -> EngineHandle {
        let (sender, mut receiver) = mpsc::unbounded_channel::<Event>();
        let engine = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(event) = receiver.recv().await {
                engine.mark_queued(&event).await;
                let engine = Arc::clone(&engine);
                tokio::spawn(async move {
                    if let Err(err) = engine.execute(&event).await {
                        tracing::error!(event = %event.name, error = %err, "Workflow run failed");
                    }
                });
            }
            tracing::debug!("Workflow dispatch loop stopped");
        });
        EngineHandle { sender }
    }
}

/// Cloneable handle for queueing events into a running engine.
#[derive(Clone)]
pub struct EngineHandle {
    sender: mpsc::UnboundedSender<Event>,
}

impl EngineHandle {
    /// Queue an event for asynchronous execution.
    pub fn emit(&self, event: Event) -> Result<(), WorkflowError> {
        self.sender.send(event).map_err(|_| WorkflowError::QueueClosed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::store::MemoryStepStore;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    fn fast_retry() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            step_timeout: Duration::from_secs(5),
        }
    }

    struct TwoStepFn {
        first_calls: Arc<AtomicUsize>,
        second_should_fail: Arc<AtomicBool>,
    }

    #[async_trait]
    impl WorkflowFn for TwoStepFn {
        fn id(&self) -> &'static str {
            "two-step"
        }

        fn trigger(&self) -> &'static str {
            "test.two-step"
        }

        async fn run(&self, ctx: &StepContext, _event: &Event) -> Result<Value, WorkflowError> {
            let calls = Arc::clone(&self.first_calls);
            let first: u64 = ctx
                .run("first", move || {
                    let calls = Arc::clone(&calls);
                    async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Ok(7u64)
                    }
                })
                .await?;

            let should_fail = Arc::clone(&self.second_should_fail);
            let second: u64 = ctx
                .run("second", move || {
                    let should_fail = Arc::clone(&should_fail);
                    async move {
                        if should_fail.load(Ordering::SeqCst) {
                            Err("second step down".into())
                        } else {
                            Ok(first * 2)
                        }
                    }
                })
                .await?;

            Ok(json!({ "result": second }))
        }
    }

    fn engine_with(function: Arc<dyn WorkflowFn>) -> Engine {
        let mut engine = Engine::new(Arc::new(MemoryStepStore::new()), fast_retry());
        engine.register(function);
        engine
    }

    #[tokio::test]
    async fn redelivery_resumes_after_completed_steps() {
        let first_calls = Arc::new(AtomicUsize::new(0));
        let second_should_fail = Arc::new(AtomicBool::new(true));
        let engine = engine_with(Arc::new(TwoStepFn {
            first_calls: Arc::clone(&first_calls),
            second_should_fail: Arc::clone(&second_should_fail),
        }));

        let event = Event::new("test.two-step", &json!({})).expect("event");
        engine.execute(&event).await.expect_err("second step fails");
        assert_eq!(first_calls.load(Ordering::SeqCst), 1);

        second_should_fail.store(false, Ordering::SeqCst);
        let output = engine.execute(&event).await.expect("resumed run");
        assert_eq!(output, json!({ "result": 14 }));
        // First step was memoized, not re-run.
        assert_eq!(first_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn completed_run_returns_stored_output_on_duplicate_delivery() {
        let first_calls = Arc::new(AtomicUsize::new(0));
        let engine = engine_with(Arc::new(TwoStepFn {
            first_calls: Arc::clone(&first_calls),
            second_should_fail: Arc::new(AtomicBool::new(false)),
        }));

        let event = Event::new("test.two-step", &json!({})).expect("event");
        let first = engine.execute(&event).await.expect("first delivery");
        let second = engine.execute(&event).await.expect("duplicate delivery");

        assert_eq!(first, second);
        assert_eq!(first_calls.load(Ordering::SeqCst), 1);
    }

    struct AlwaysFailFn {
        attempts: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl WorkflowFn for AlwaysFailFn {
        fn id(&self) -> &'static str {
            "always-fail"
        }

        fn trigger(&self) -> &'static str {
            "test.always-fail"
        }

        async fn run(&self, ctx: &StepContext, _event: &Event) -> Result<Value, WorkflowError> {
            let attempts = Arc::clone(&self.attempts);
            let _: u64 = ctx
                .run("doomed", move || {
                    let attempts = Arc::clone(&attempts);
                    async move {
                        attempts.fetch_add(1, Ordering::SeqCst);
                        Err("backend unavailable".into())
                    }
                })
                .await?;
            Ok(json!({}))
        }
    }

    #[tokio::test]
    async fn retries_are_bounded_and_failure_surfaces() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let engine = engine_with(Arc::new(AlwaysFailFn {
            attempts: Arc::clone(&attempts),
        }));

        let event = Event::new("test.always-fail", &json!({})).expect("event");
        let error = engine.execute(&event).await.unwrap_err();

        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        match error {
            WorkflowError::StepFailed {
                step,
                attempts,
                message,
            } => {
                assert_eq!(step, "doomed");
                assert_eq!(attempts, 3);
                assert!(message.contains("backend unavailable"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn unknown_events_are_rejected() {
        let engine = Engine::new(Arc::new(MemoryStepStore::new()), fast_retry());
        let event = Event::new("nobody.listens", &json!({})).expect("event");
        let error = engine.execute(&event).await.unwrap_err();
        assert!(matches!(error, WorkflowError::UnknownEvent(name) if name == "nobody.listens"));
    }

    #[test]
    fn run_ids_are_deterministic_per_function_and_event() {
        let event_id = Uuid::new_v4();
        assert_eq!(
            Engine::run_id("ingest-document", event_id),
            Engine::run_id("ingest-document", event_id)
        );
        assert_ne!(
            Engine::run_id("ingest-document", event_id),
            Engine::run_id("answer-question", event_id)
        );
    }
}
