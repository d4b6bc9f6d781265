//! Durable step-based workflow engine.
//!
//! Functions register against an event trigger and execute as a sequence of
//! named steps. Each completed step's output is persisted through a
//! [`StepStore`], keyed by `(run_id, step_name)`, so a re-delivered event
//! resumes after the last completed step instead of redoing work. Run ids are
//! derived deterministically from the function id and the event id, which is
//! what makes at-least-once event delivery safe.

mod engine;
mod event;
mod store;

pub use engine::{
    Engine, EngineHandle, RetryPolicy, StepContext, StepError, WorkflowError, WorkflowFn,
};
pub use event::Event;
pub use store::{MemoryStepStore, RunId, RunStatus, StepStore};
