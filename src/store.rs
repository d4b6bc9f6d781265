//! Conversation and document metadata storage.
//!
//! Conversations own messages and document records. The blob store and the
//! vector index hold the actual content; this layer tracks what exists and
//! where, and is always the last thing touched during deletion so a partial
//! cleanup never orphans metadata.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tokio::sync::Mutex;

/// Errors returned by conversation storage backends.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The referenced conversation does not exist.
    #[error("conversation '{0}' not found")]
    ConversationNotFound(String),
    /// The referenced document does not exist.
    #[error("document '{0}' not found")]
    DocumentNotFound(String),
    /// Backend-specific failure.
    #[error("storage backend failure: {0}")]
    Backend(String),
}

/// Who authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// Message written by the end user.
    User,
    /// Message produced by the system.
    Assistant,
}

/// A single chat message within a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Author of the message.
    pub role: MessageRole,
    /// Message text.
    pub content: String,
    /// RFC 3339 creation timestamp.
    pub created_at: String,
}

/// Metadata for an uploaded document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRecord {
    /// Document identifier, also the vector isolation key.
    pub id: String,
    /// Conversation the document belongs to.
    pub conversation_id: String,
    /// Original filename as uploaded.
    pub source: String,
    /// Path of the raw bytes in the blob store.
    pub storage_path: String,
    /// RFC 3339 creation timestamp.
    pub created_at: String,
}

/// Listing view of a conversation: title plus its documents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationSummary {
    /// Conversation identifier.
    pub id: String,
    /// Derived title, or `"New Conversation"` before any user message.
    pub title: String,
    /// Documents uploaded into the conversation, newest first.
    pub documents: Vec<DocumentRecord>,
    /// RFC 3339 creation timestamp.
    pub created_at: String,
}

#[derive(Debug, Clone)]
struct Conversation {
    messages: Vec<Message>,
    created_at: String,
}

const UNTITLED: &str = "New Conversation";
const TITLE_BUDGET: usize = 40;

/// Derive a conversation title from its first user message.
fn derive_title(messages: &[Message]) -> String {
    let Some(first) = messages
        .iter()
        .find(|message| message.role == MessageRole::User)
    else {
        return UNTITLED.to_string();
    };
    let text = first.content.trim();
    if text.chars().count() <= TITLE_BUDGET {
        return text.to_string();
    }
    let truncated: String = text.chars().take(TITLE_BUDGET).collect();
    format!("{}...", truncated.trim_end())
}

/// Current timestamp as an RFC 3339 string.
pub(crate) fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| OffsetDateTime::now_utc().unix_timestamp().to_string())
}

/// Interface implemented by conversation storage backends.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Create a conversation under the given id. No-op if it already exists.
    async fn create_conversation(&self, conversation_id: &str) -> Result<(), StoreError>;

    /// Whether a conversation with the given id exists.
    async fn conversation_exists(&self, conversation_id: &str) -> Result<bool, StoreError>;

    /// Append a message to an existing conversation.
    async fn append_message(
        &self,
        conversation_id: &str,
        role: MessageRole,
        content: &str,
    ) -> Result<(), StoreError>;

    /// All messages of a conversation, oldest first.
    async fn list_messages(&self, conversation_id: &str) -> Result<Vec<Message>, StoreError>;

    /// Record an uploaded document's metadata.
    async fn insert_document(&self, record: DocumentRecord) -> Result<(), StoreError>;

    /// Fetch one document's metadata.
    async fn document(&self, document_id: &str) -> Result<DocumentRecord, StoreError>;

    /// All documents across conversations, newest first.
    async fn list_documents(&self) -> Result<Vec<DocumentRecord>, StoreError>;

    /// Document ids belonging to one conversation.
    async fn conversation_documents(
        &self,
        conversation_id: &str,
    ) -> Result<Vec<DocumentRecord>, StoreError>;

    /// Remove a document's metadata row.
    async fn remove_document(&self, document_id: &str) -> Result<(), StoreError>;

    /// Remove a conversation with its messages and document rows.
    async fn remove_conversation(&self, conversation_id: &str) -> Result<(), StoreError>;

    /// Summaries of all conversations, newest first.
    async fn list_conversations(&self) -> Result<Vec<ConversationSummary>, StoreError>;
}

/// In-memory conversation store for tests and single-process deployments.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryStoreInner>,
}

#[derive(Default)]
struct MemoryStoreInner {
    conversations: HashMap<String, Conversation>,
    documents: Vec<DocumentRecord>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConversationStore for MemoryStore {
    async fn create_conversation(&self, conversation_id: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        inner
            .conversations
            .entry(conversation_id.to_string())
            .or_insert_with(|| Conversation {
                messages: Vec::new(),
                created_at: now_rfc3339(),
            });
        Ok(())
    }

    async fn conversation_exists(&self, conversation_id: &str) -> Result<bool, StoreError> {
        Ok(self
            .inner
            .lock()
            .await
            .conversations
            .contains_key(conversation_id))
    }

    async fn append_message(
        &self,
        conversation_id: &str,
        role: MessageRole,
        content: &str,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        let conversation = inner
            .conversations
            .get_mut(conversation_id)
            .ok_or_else(|| StoreError::ConversationNotFound(conversation_id.to_string()))?;
        conversation.messages.push(Message {
            role,
            content: content.to_string(),
            created_at: now_rfc3339(),
        });
        Ok(())
    }

    async fn list_messages(&self, conversation_id: &str) -> Result<Vec<Message>, StoreError> {
        let inner = self.inner.lock().await;
        let conversation = inner
            .conversations
            .get(conversation_id)
            .ok_or_else(|| StoreError::ConversationNotFound(conversation_id.to_string()))?;
        Ok(conversation.messages.clone())
    }

    async fn insert_document(&self, record: DocumentRecord) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        if !inner.conversations.contains_key(&record.conversation_id) {
            return Err(StoreError::ConversationNotFound(
                record.conversation_id.clone(),
            ));
        }
        inner.documents.push(record);
        Ok(())
    }

    async fn document(&self, document_id: &str) -> Result<DocumentRecord, StoreError> {
        self.inner
            .lock()
            .await
            .documents
            .iter()
            .find(|record| record.id == document_id)
            .cloned()
            .ok_or_else(|| StoreError::DocumentNotFound(document_id.to_string()))
    }

    async fn list_documents(&self) -> Result<Vec<DocumentRecord>, StoreError> {
        let inner = self.inner.lock().await;
        let mut documents = inner.documents.clone();
        documents.reverse();
        Ok(documents)
    }

    async fn conversation_documents(
        &self,
        conversation_id: &str,
    ) -> Result<Vec<DocumentRecord>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .documents
            .iter()
            .filter(|record| record.conversation_id == conversation_id)
            .cloned()
            .collect())
    }

    async fn remove_document(&self, document_id: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        let before = inner.documents.len();
        inner.documents.retain(|record| record.id != document_id);
        if inner.documents.len() == before {
            return Err(StoreError::DocumentNotFound(document_id.to_string()));
        }
        Ok(())
    }

    async fn remove_conversation(&self, conversation_id: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        if inner.conversations.remove(conversation_id).is_none() {
            return Err(StoreError::ConversationNotFound(conversation_id.to_string()));
        }
        inner
            .documents
            .retain(|record| record.conversation_id != conversation_id);
        Ok(())
    }

    async fn list_conversations(&self) -> Result<Vec<ConversationSummary>, StoreError> {
        let inner = self.inner.lock().await;
        let mut summaries: Vec<ConversationSummary> = inner
            .conversations
            .iter()
            .map(|(id, conversation)| {
                let mut documents: Vec<DocumentRecord> = inner
                    .documents
                    .iter()
                    .filter(|record| &record.conversation_id == id)
                    .cloned()
                    .collect();
                documents.reverse();
                ConversationSummary {
                    id: id.clone(),
                    title: derive_title(&conversation.messages),
                    documents,
                    created_at: conversation.created_at.clone(),
                }
            })
            .collect();
        summaries.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(summaries)
    }
}
