//! Question answering: embed, scoped search, generate, persist.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::Arc;

use crate::embedding::EmbeddingClient;
use crate::generation::{GenerationClient, build_prompt};
use crate::metrics::Metrics;
use crate::store::{ConversationStore, MessageRole};
use crate::vector::{SearchOutcome, SearchScope, VectorIndex};
use crate::workflow::{Event, StepContext, StepError, WorkflowError, WorkflowFn};

/// Event name emitted when a question is accepted.
pub const QUESTION_ASKED: &str = "question.asked";

/// Payload of the [`QUESTION_ASKED`] event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionAsked {
    /// The user's question text.
    pub question: String,
    /// Conversation the question belongs to.
    pub conversation_id: String,
    /// Documents retrieval may draw from. An empty list means the
    /// conversation has no documents and retrieval returns nothing.
    pub allowed_document_ids: Vec<String>,
}

/// Final output of a query run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryReceipt {
    /// Generated answer text.
    pub answer: String,
    /// Number of contexts retrieval contributed to the prompt.
    pub num_contexts: usize,
    /// Distinct source document names behind those contexts.
    pub sources: BTreeSet<String>,
}

/// Workflow function that answers a question against a conversation's documents.
pub struct QueryPipeline {
    embeddings: Arc<dyn EmbeddingClient>,
    index: Arc<dyn VectorIndex>,
    generation: Arc<dyn GenerationClient>,
    store: Arc<dyn ConversationStore>,
    metrics: Arc<Metrics>,
    top_k: usize,
}

impl QueryPipeline {
    /// Wire the pipeline against its collaborators.
    pub fn new(
        embeddings: Arc<dyn EmbeddingClient>,
        index: Arc<dyn VectorIndex>,
        generation: Arc<dyn GenerationClient>,
        store: Arc<dyn ConversationStore>,
        metrics: Arc<Metrics>,
        top_k: usize,
    ) -> Self {
        Self {
            embeddings,
            index,
            generation,
            store,
            metrics,
            top_k,
        }
    }
}

#[async_trait]
impl WorkflowFn for QueryPipeline {
    fn id(&self) -> &'static str {
        "answer-question"
    }

    fn trigger(&self) -> &'static str {
        QUESTION_ASKED
    }

    async fn run(&self, ctx: &StepContext, event: &Event) -> Result<Value, WorkflowError> {
        let payload: QuestionAsked = event.payload()?;
        tracing::info!(
            run_id = %ctx.run_id(),
            conversation_id = %payload.conversation_id,
            allowed_documents = payload.allowed_document_ids.len(),
            "Starting question answering"
        );

        // Retrieval degrades to an empty context set rather than failing the
        // run; the prompt instructs the model to fall back to general
        // knowledge when the documents are silent.
        let outcome: SearchOutcome = ctx
            .run("embed-and-search", || {
                let embeddings = Arc::clone(&self.embeddings);
                let index = Arc::clone(&self.index);
                let question = payload.question.clone();
                let allowed = payload.allowed_document_ids.clone();
                let top_k = self.top_k;
                async move {
                    let scope = SearchScope::documents(allowed);
                    if scope.matches_nothing() {
                        return Ok(SearchOutcome::default());
                    }
                    let vectors = match embeddings.embed(std::slice::from_ref(&question)).await {
                        Ok(vectors) => vectors,
                        Err(err) => {
                            tracing::warn!(error = %err, "Question embedding failed; answering without contexts");
                            return Ok(SearchOutcome::default());
                        }
                    };
                    let Some(vector) = vectors.into_iter().next() else {
                        return Ok(SearchOutcome::default());
                    };
                    let outcome = index.search(&vector, top_k, &scope).await?;
                    Ok::<_, StepError>(outcome)
                }
            })
            .await?;

        let answer: String = ctx
            .run("generate-answer", || {
                let generation = Arc::clone(&self.generation);
                let prompt = build_prompt(&outcome.contexts, &payload.question);
                async move {
                    let answer = generation.generate(&prompt).await?;
                    Ok::<_, StepError>(answer)
                }
            })
            .await?;

        ctx.run("save-to-db", || {
            let store = Arc::clone(&self.store);
            let conversation_id = payload.conversation_id.clone();
            let answer = answer.clone();
            async move {
                store
                    .append_message(&conversation_id, MessageRole::Assistant, &answer)
                    .await?;
                Ok::<_, StepError>(())
            }
        })
        .await?;

        self.metrics.record_query(outcome.contexts.len() as u64);
        tracing::info!(
            run_id = %ctx.run_id(),
            conversation_id = %payload.conversation_id,
            contexts = outcome.contexts.len(),
            "Question answered"
        );
        let receipt = QueryReceipt {
            answer,
            num_contexts: outcome.contexts.len(),
            sources: outcome.sources,
        };
        Ok(serde_json::to_value(receipt)?)
    }
}
