//! Vector index abstraction and Qdrant integration.
//!
//! One shared collection holds every tenant's chunks; isolation is enforced
//! purely through the `document_id` payload filter applied at search time.
//! Record ids are derived deterministically from `(document_id, chunk_index)`
//! so re-ingesting a document overwrites its records instead of duplicating
//! them — upsert is idempotent by construction.

mod filters;
mod memory;
mod qdrant;
mod types;

pub use filters::build_scope_filter;
pub use memory::MemoryIndex;
pub use qdrant::QdrantIndex;
pub use types::{
    RecordPayload, SearchOutcome, SearchScope, VectorRecord, VectorStoreError, record_id,
};

use async_trait::async_trait;

/// Interface implemented by vector store backends.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Create the collection and its `document_id` payload index if absent.
    ///
    /// Idempotent; safe to call on every process start.
    async fn ensure_collection(&self) -> Result<(), VectorStoreError>;

    /// Insert or overwrite records by id.
    ///
    /// All-or-nothing per call from the caller's perspective: a failure leaves
    /// no acknowledged partial batch.
    async fn upsert(&self, records: Vec<VectorRecord>) -> Result<usize, VectorStoreError>;

    /// Return up to `top_k` nearest records under cosine similarity, filtered
    /// to the supplied scope. Ties are broken deterministically by record id.
    async fn search(
        &self,
        vector: &[f32],
        top_k: usize,
        scope: &SearchScope,
    ) -> Result<SearchOutcome, VectorStoreError>;

    /// Remove every record carrying the given document id.
    async fn delete_by_document(&self, document_id: &str) -> Result<(), VectorStoreError>;
}
