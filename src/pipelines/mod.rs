//! Workflow functions for document ingestion and question answering.
//!
//! Both pipelines are registered with the workflow engine and triggered by
//! events emitted from the service layer. Their steps are memoized, so a
//! re-delivered event resumes from the last completed step.

mod ingest;
mod query;

pub use ingest::{DOCUMENT_UPLOADED, DocumentUploaded, IngestPipeline, UpsertReceipt};
pub use query::{QUESTION_ASKED, QueryPipeline, QueryReceipt, QuestionAsked};
