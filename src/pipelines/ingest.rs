//! Document ingestion: load, chunk, embed, upsert, confirm.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use crate::blob::BlobStore;
use crate::chunking::{Chunk, chunk_text};
use crate::embedding::EmbeddingClient;
use crate::extract::extract_text;
use crate::metrics::Metrics;
use crate::store::{ConversationStore, MessageRole};
use crate::vector::{RecordPayload, VectorIndex, VectorRecord, record_id};
use crate::workflow::{Event, StepContext, StepError, WorkflowError, WorkflowFn};

/// Event name emitted when a document upload is accepted.
pub const DOCUMENT_UPLOADED: &str = "document.uploaded";

/// Payload of the [`DOCUMENT_UPLOADED`] event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentUploaded {
    /// Blob store path holding the raw bytes.
    pub storage_path: String,
    /// Document identifier, used as the vector isolation key.
    pub document_id: String,
    /// Original filename as uploaded.
    pub source: String,
    /// Conversation the document belongs to.
    pub conversation_id: String,
}

/// Output of the embed-and-upsert step.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct UpsertReceipt {
    /// Number of vector records written.
    pub ingested: usize,
}

/// Workflow function that turns an uploaded document into searchable vectors.
pub struct IngestPipeline {
    blob: Arc<dyn BlobStore>,
    embeddings: Arc<dyn EmbeddingClient>,
    index: Arc<dyn VectorIndex>,
    store: Arc<dyn ConversationStore>,
    metrics: Arc<Metrics>,
    chunk_size: usize,
    chunk_overlap: usize,
}

impl IngestPipeline {
    /// Wire the pipeline against its collaborators.
    pub fn new(
        blob: Arc<dyn BlobStore>,
        embeddings: Arc<dyn EmbeddingClient>,
        index: Arc<dyn VectorIndex>,
        store: Arc<dyn ConversationStore>,
        metrics: Arc<Metrics>,
        chunk_size: usize,
        chunk_overlap: usize,
    ) -> Self {
        Self {
            blob,
            embeddings,
            index,
            store,
            metrics,
            chunk_size,
            chunk_overlap,
        }
    }
}

#[async_trait]
impl WorkflowFn for IngestPipeline {
    fn id(&self) -> &'static str {
        "ingest-document"
    }

    fn trigger(&self) -> &'static str {
        DOCUMENT_UPLOADED
    }

    async fn run(&self, ctx: &StepContext, event: &Event) -> Result<Value, WorkflowError> {
        let payload: DocumentUploaded = event.payload()?;
        tracing::info!(
            run_id = %ctx.run_id(),
            document_id = %payload.document_id,
            source = %payload.source,
            "Starting document ingestion"
        );

        let chunks: Vec<Chunk> = ctx
            .run("load-and-chunk", || {
                let blob = Arc::clone(&self.blob);
                let storage_path = payload.storage_path.clone();
                let source = payload.source.clone();
                let chunk_size = self.chunk_size;
                let chunk_overlap = self.chunk_overlap;
                async move {
                    let bytes = blob.download(&storage_path).await?;
                    let Some(text) = extract_text(&bytes, &source) else {
                        tracing::warn!(source = %source, "No text extracted; document yields zero chunks");
                        return Ok(Vec::new());
                    };
                    let chunks = chunk_text(&text, chunk_size, chunk_overlap)?;
                    Ok::<_, StepError>(chunks)
                }
            })
            .await?;

        let receipt: UpsertReceipt = ctx
            .run("embed-and-upsert", || {
                let embeddings = Arc::clone(&self.embeddings);
                let index = Arc::clone(&self.index);
                let chunks = chunks.clone();
                let document_id = payload.document_id.clone();
                let source = payload.source.clone();
                async move {
                    if chunks.is_empty() {
                        return Ok(UpsertReceipt { ingested: 0 });
                    }
                    let texts: Vec<String> =
                        chunks.iter().map(|chunk| chunk.text.clone()).collect();
                    let vectors = embeddings.embed(&texts).await?;
                    let records: Vec<VectorRecord> = chunks
                        .iter()
                        .zip(vectors)
                        .map(|(chunk, vector)| VectorRecord {
                            id: record_id(&document_id, chunk.index),
                            vector,
                            payload: RecordPayload {
                                source: source.clone(),
                                text: chunk.text.clone(),
                                document_id: document_id.clone(),
                            },
                        })
                        .collect();
                    let ingested = index.upsert(records).await?;
                    Ok::<_, StepError>(UpsertReceipt { ingested })
                }
            })
            .await?;

        ctx.run("mark-ingestion-complete", || {
            let store = Arc::clone(&self.store);
            let conversation_id = payload.conversation_id.clone();
            let source = payload.source.clone();
            async move {
                store
                    .append_message(
                        &conversation_id,
                        MessageRole::Assistant,
                        &format!(
                            "I have finished analyzing **{source}**. You can now ask questions about it!"
                        ),
                    )
                    .await?;
                Ok::<_, StepError>(())
            }
        })
        .await?;

        self.metrics.record_ingest(receipt.ingested as u64);
        tracing::info!(
            run_id = %ctx.run_id(),
            document_id = %payload.document_id,
            chunks = receipt.ingested,
            "Document ingestion finished"
        );
        Ok(serde_json::to_value(receipt)?)
    }
}
