//! Shared types used by the vector index implementations.

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;
use uuid::Uuid;

/// Errors returned while interacting with a vector store backend.
#[derive(Debug, Error)]
pub enum VectorStoreError {
    /// Base URL failed to parse or normalize.
    #[error("Invalid vector store URL: {0}")]
    InvalidUrl(String),
    /// HTTP layer failed before receiving a response.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// Backend responded with an unexpected status code.
    #[error("Unexpected vector store response ({status}): {body}")]
    UnexpectedStatus {
        /// HTTP status returned from the backend.
        status: StatusCode,
        /// Body payload associated with the failing response.
        body: String,
    },
}

/// Payload stored alongside each vector record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordPayload {
    /// Human-readable name of the source document (typically the filename).
    pub source: String,
    /// Chunk text content.
    pub text: String,
    /// Isolation key: the owning document's identifier.
    pub document_id: String,
}

/// A vector plus payload ready for upserting into the index.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorRecord {
    /// Deterministic identifier derived from `(document_id, chunk_index)`.
    pub id: Uuid,
    /// Embedding vector for the chunk.
    pub vector: Vec<f32>,
    /// Payload persisted with the vector.
    pub payload: RecordPayload,
}

/// Derive the deterministic record id for a document chunk.
///
/// Re-ingesting the same `(document_id, chunk_index)` pair always yields the
/// same id, so upserts overwrite rather than duplicate.
pub fn record_id(document_id: &str, chunk_index: usize) -> Uuid {
    Uuid::new_v5(
        &Uuid::NAMESPACE_URL,
        format!("{document_id}:{chunk_index}").as_bytes(),
    )
}

/// The set of documents a search is allowed to retrieve from.
///
/// An empty `Documents` set matches nothing; callers that mean "no
/// restriction" must say so explicitly with `Unrestricted`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SearchScope {
    /// Search the whole collection without a payload filter.
    Unrestricted,
    /// Restrict results to records whose `document_id` is in the set.
    Documents(BTreeSet<String>),
}

impl SearchScope {
    /// Build a document-restricted scope from any iterable of ids.
    pub fn documents<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Documents(ids.into_iter().map(Into::into).collect())
    }

    /// Whether this scope can never match a record.
    pub fn matches_nothing(&self) -> bool {
        matches!(self, Self::Documents(ids) if ids.is_empty())
    }
}

/// Contexts and distinct source names produced by a scoped search.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchOutcome {
    /// Retrieved chunk texts, best match first.
    pub contexts: Vec<String>,
    /// Distinct source document names among the retrieved records.
    pub sources: BTreeSet<String>,
}
