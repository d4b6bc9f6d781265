//! Service facade: accepts uploads and questions, emits workflow events, and
//! owns the deletion flows.
//!
//! Deletion is two-phase: derived state (vectors, blobs) is cleaned
//! best-effort first, then the metadata rows are removed. A failed cleanup is
//! logged and reported but never blocks the metadata removal, so retrying a
//! deletion converges instead of wedging.

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use crate::blob::{BlobError, BlobStore};
use crate::metrics::{Metrics, MetricsSnapshot};
use crate::pipelines::{DOCUMENT_UPLOADED, DocumentUploaded, QUESTION_ASKED, QuestionAsked};
use crate::store::{
    ConversationStore, ConversationSummary, DocumentRecord, Message, MessageRole, StoreError,
};
use crate::vector::VectorIndex;
use crate::workflow::{EngineHandle, Event, WorkflowError};

/// Errors surfaced by the service layer.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Conversation storage failed.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Blob storage failed.
    #[error(transparent)]
    Blob(#[from] BlobError),
    /// Event could not be queued for execution.
    #[error(transparent)]
    Workflow(#[from] WorkflowError),
}

impl ServiceError {
    /// Whether the error denotes a missing resource rather than a failure.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::Store(StoreError::ConversationNotFound(_) | StoreError::DocumentNotFound(_))
        )
    }
}

/// Result of accepting a document upload.
#[derive(Debug, Clone, serde::Serialize)]
pub struct UploadOutcome {
    /// Conversation the document was attached to.
    pub conversation_id: String,
    /// Identifier assigned to the document.
    pub document_id: String,
}

/// Result of accepting a question.
#[derive(Debug, Clone, serde::Serialize)]
pub struct AskOutcome {
    /// Conversation the question was asked in.
    pub conversation_id: String,
}

/// Outcome of a deletion flow, including partial-cleanup information.
#[derive(Debug, Clone, serde::Serialize)]
pub struct DeletionReport {
    /// Number of document rows removed.
    pub documents_removed: usize,
    /// Whether every vector cleanup succeeded.
    pub vectors_cleaned: bool,
    /// Whether every blob cleanup succeeded.
    pub blobs_cleaned: bool,
}

/// Operations exposed over the HTTP surface.
#[async_trait]
pub trait RagApi: Send + Sync + 'static {
    /// Accept a document upload and queue its ingestion.
    async fn upload_document(
        &self,
        conversation_id: Option<String>,
        filename: &str,
        bytes: Vec<u8>,
    ) -> Result<UploadOutcome, ServiceError>;

    /// Accept a question and queue its answering run.
    async fn ask(
        &self,
        conversation_id: Option<String>,
        question: &str,
    ) -> Result<AskOutcome, ServiceError>;

    /// List conversations, newest first.
    async fn conversations(&self) -> Result<Vec<ConversationSummary>, ServiceError>;

    /// List a conversation's messages, oldest first.
    async fn messages(&self, conversation_id: &str) -> Result<Vec<Message>, ServiceError>;

    /// List all documents, newest first.
    async fn documents(&self) -> Result<Vec<DocumentRecord>, ServiceError>;

    /// Delete one document with its vectors and blob.
    async fn delete_document(&self, document_id: &str) -> Result<DeletionReport, ServiceError>;

    /// Delete a conversation with its messages, documents, vectors, and blobs.
    async fn delete_conversation(
        &self,
        conversation_id: &str,
    ) -> Result<DeletionReport, ServiceError>;

    /// Snapshot of pipeline counters.
    fn metrics_snapshot(&self) -> MetricsSnapshot;
}

/// Production service wiring storage, the vector index, and the event queue.
pub struct RagService {
    store: Arc<dyn ConversationStore>,
    blob: Arc<dyn BlobStore>,
    index: Arc<dyn VectorIndex>,
    events: EngineHandle,
    metrics: Arc<Metrics>,
}

impl RagService {
    /// Wire the service against its collaborators.
    pub fn new(
        store: Arc<dyn ConversationStore>,
        blob: Arc<dyn BlobStore>,
        index: Arc<dyn VectorIndex>,
        events: EngineHandle,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            store,
            blob,
            index,
            events,
            metrics,
        }
    }

    async fn resolve_conversation(
        &self,
        conversation_id: Option<String>,
    ) -> Result<String, ServiceError> {
        let conversation_id = conversation_id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        self.store.create_conversation(&conversation_id).await?;
        Ok(conversation_id)
    }

    /// Best-effort cleanup of one document's derived state.
    async fn cleanup_document(&self, record: &DocumentRecord) -> (bool, bool) {
        let vectors_cleaned = match self.index.delete_by_document(&record.id).await {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(document_id = %record.id, error = %err, "Vector cleanup failed; continuing with deletion");
                false
            }
        };
        let blobs_cleaned = match self.blob.remove(&[record.storage_path.clone()]).await {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(document_id = %record.id, error = %err, "Blob cleanup failed; continuing with deletion");
                false
            }
        };
        (vectors_cleaned, blobs_cleaned)
    }
}

#[async_trait]
impl RagApi for RagService {
    async fn upload_document(
        &self,
        conversation_id: Option<String>,
        filename: &str,
        bytes: Vec<u8>,
    ) -> Result<UploadOutcome, ServiceError> {
        let conversation_id = self.resolve_conversation(conversation_id).await?;
        let document_id = Uuid::new_v4().to_string();
        let storage_path = format!("{conversation_id}/{document_id}");

        self.blob.upload(&storage_path, &bytes).await?;
        self.store
            .insert_document(DocumentRecord {
                id: document_id.clone(),
                conversation_id: conversation_id.clone(),
                source: filename.to_string(),
                storage_path: storage_path.clone(),
                created_at: crate::store::now_rfc3339(),
            })
            .await?;
        self.store
            .append_message(
                &conversation_id,
                MessageRole::User,
                &format!("Uploaded: {filename}"),
            )
            .await?;

        let event = Event::new(
            DOCUMENT_UPLOADED,
            &DocumentUploaded {
                storage_path,
                document_id: document_id.clone(),
                source: filename.to_string(),
                conversation_id: conversation_id.clone(),
            },
        )?;
        self.events.emit(event)?;

        tracing::info!(conversation_id = %conversation_id, document_id = %document_id, filename, "Upload accepted");
        Ok(UploadOutcome {
            conversation_id,
            document_id,
        })
    }

    async fn ask(
        &self,
        conversation_id: Option<String>,
        question: &str,
    ) -> Result<AskOutcome, ServiceError> {
        let conversation_id = self.resolve_conversation(conversation_id).await?;
        let allowed_document_ids: Vec<String> = self
            .store
            .conversation_documents(&conversation_id)
            .await?
            .into_iter()
            .map(|record| record.id)
            .collect();

        self.store
            .append_message(&conversation_id, MessageRole::User, question)
            .await?;

        let event = Event::new(
            QUESTION_ASKED,
            &QuestionAsked {
                question: question.to_string(),
                conversation_id: conversation_id.clone(),
                allowed_document_ids,
            },
        )?;
        self.events.emit(event)?;

        tracing::info!(conversation_id = %conversation_id, "Question accepted");
        Ok(AskOutcome { conversation_id })
    }

    async fn conversations(&self) -> Result<Vec<ConversationSummary>, ServiceError> {
        Ok(self.store.list_conversations().await?)
    }

    async fn messages(&self, conversation_id: &str) -> Result<Vec<Message>, ServiceError> {
        Ok(self.store.list_messages(conversation_id).await?)
    }

    async fn documents(&self) -> Result<Vec<DocumentRecord>, ServiceError> {
        Ok(self.store.list_documents().await?)
    }

    async fn delete_document(&self, document_id: &str) -> Result<DeletionReport, ServiceError> {
        let record = self.store.document(document_id).await?;
        let (vectors_cleaned, blobs_cleaned) = self.cleanup_document(&record).await;
        self.store.remove_document(document_id).await?;

        tracing::info!(document_id, vectors_cleaned, blobs_cleaned, "Document deleted");
        Ok(DeletionReport {
            documents_removed: 1,
            vectors_cleaned,
            blobs_cleaned,
        })
    }

    async fn delete_conversation(
        &self,
        conversation_id: &str,
    ) -> Result<DeletionReport, ServiceError> {
        if !self.store.conversation_exists(conversation_id).await? {
            return Err(StoreError::ConversationNotFound(conversation_id.to_string()).into());
        }

        let records = self.store.conversation_documents(conversation_id).await?;
        let mut vectors_cleaned = true;
        let mut blobs_cleaned = true;
        for record in &records {
            let (vectors_ok, blobs_ok) = self.cleanup_document(record).await;
            vectors_cleaned &= vectors_ok;
            blobs_cleaned &= blobs_ok;
        }
        self.store.remove_conversation(conversation_id).await?;

        tracing::info!(
            conversation_id,
            documents = records.len(),
            vectors_cleaned,
            blobs_cleaned,
            "Conversation deleted"
        );
        Ok(DeletionReport {
            documents_removed: records.len(),
            vectors_cleaned,
            blobs_cleaned,
        })
    }

    fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}
