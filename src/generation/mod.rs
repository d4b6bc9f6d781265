//! Answer generation client and prompt assembly.
//!
//! The generator receives retrieved contexts plus the user's question as one
//! prompt. The prompt instructs the model to prioritize document context, fall
//! back to general knowledge when the documents are silent, and say so
//! explicitly, so an empty context set is a handled case rather than an error.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;

/// Errors raised by generation providers.
#[derive(Debug, Error)]
pub enum GenerationError {
    /// HTTP layer failed before receiving a response.
    #[error("generation request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// Provider responded with an unexpected status code.
    #[error("unexpected generation response ({status}): {body}")]
    UnexpectedStatus {
        /// HTTP status returned by the provider.
        status: reqwest::StatusCode,
        /// Body payload associated with the failing response.
        body: String,
    },
    /// Provider returned no completion choices.
    #[error("generation provider returned an empty response")]
    EmptyResponse,
}

/// Interface implemented by generation backends.
#[async_trait]
pub trait GenerationClient: Send + Sync {
    /// Produce free text for the supplied prompt.
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError>;
}

/// Compose the answer prompt from retrieved contexts and the question.
pub fn build_prompt(contexts: &[String], question: &str) -> String {
    let context_block = contexts.join("\n\n");
    format!(
        "You are CortexAI, a highly intelligent research assistant.\n\
         \n\
         INSTRUCTIONS:\n\
         1. If the \"Document Context\" provided below contains information relevant to the question, prioritize it.\n\
         2. Combine the information from the documents with your own extensive knowledge to provide a comprehensive and insightful answer.\n\
         3. If the \"Document Context\" is missing, irrelevant, or insufficient, use your general knowledge to help the user.\n\
         4. If you are relying ONLY on general knowledge because the documents are silent on the topic, start your response with: \"I couldn't find specific details in your documents, but based on general knowledge...\"\n\
         5. Be concise, professional, and avoid unnecessary jargon.\n\
         6. If you truly do not know the answer even with your general knowledge, say: \"I'm sorry, I don't have the answer to that question.\"\n\
         \n\
         Context:\n\
         {context_block}\n\
         \n\
         Question:\n\
         {question}\n"
    )
}

/// HTTP generation client speaking the common chat-completions JSON shape.
pub struct HttpGenerationClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Deserialize)]
struct CompletionMessage {
    content: String,
}

impl HttpGenerationClient {
    /// Construct a client for the given provider endpoint and model.
    pub fn new(
        base_url: &str,
        api_key: Option<String>,
        model: &str,
    ) -> Result<Self, GenerationError> {
        let client = Client::builder().user_agent("cortex-rag/0.1").build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model: model.to_string(),
        })
    }
}

#[async_trait]
impl GenerationClient for HttpGenerationClient {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        let mut request = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .json(&json!({
                "model": self.model,
                "messages": [
                    { "role": "user", "content": prompt }
                ],
            }));
        if let Some(api_key) = self.api_key.as_deref().filter(|key| !key.is_empty()) {
            request = request.bearer_auth(api_key);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let error = GenerationError::UnexpectedStatus { status, body };
            tracing::error!(error = %error, "Generation request failed");
            return Err(error);
        }

        let payload: CompletionResponse = response.json().await?;
        let choice = payload
            .choices
            .into_iter()
            .next()
            .ok_or(GenerationError::EmptyResponse)?;
        Ok(choice.message.content.trim().to_string())
    }
}
