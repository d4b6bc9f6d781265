//! HTTP surface exposing uploads, questions, listings, and deletion.
//!
//! Handlers are generic over [`RagApi`] so tests can drive the router with a
//! stub service. Upload and question handlers return as soon as the workflow
//! event is queued; clients observe pipeline progress through the
//! conversation's messages.

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::metrics::MetricsSnapshot;
use crate::service::{AskOutcome, DeletionReport, RagApi, ServiceError, UploadOutcome};
use crate::store::{ConversationSummary, DocumentRecord, Message};

/// Build the REST router backed by the provided service.
pub fn create_router<S>(service: Arc<S>) -> Router
where
    S: RagApi,
{
    Router::new()
        .route("/documents", post(upload_document::<S>).get(list_documents::<S>))
        .route("/documents/:id", delete(delete_document::<S>))
        .route("/query", post(ask_question::<S>))
        .route("/conversations", get(list_conversations::<S>))
        .route(
            "/conversations/:id",
            delete(delete_conversation::<S>),
        )
        .route(
            "/conversations/:id/messages",
            get(list_messages::<S>),
        )
        .route("/metrics", get(get_metrics::<S>))
        .with_state(service)
}

/// Query parameters for the `POST /documents` endpoint.
#[derive(Deserialize)]
struct UploadParams {
    /// Original filename of the uploaded document.
    filename: String,
    /// Conversation to attach the document to; omitted starts a new one.
    #[serde(default)]
    conversation_id: Option<String>,
}

/// Accept raw document bytes and queue their ingestion.
async fn upload_document<S>(
    State(service): State<Arc<S>>,
    Query(params): Query<UploadParams>,
    body: Bytes,
) -> Result<(StatusCode, Json<UploadOutcome>), AppError>
where
    S: RagApi,
{
    let outcome = service
        .upload_document(params.conversation_id, &params.filename, body.to_vec())
        .await?;
    Ok((StatusCode::ACCEPTED, Json(outcome)))
}

/// Request body for the `POST /query` endpoint.
#[derive(Deserialize)]
struct QueryRequest {
    /// The user's question.
    question: String,
    /// Conversation scoping retrieval; omitted starts a new one.
    #[serde(default)]
    conversation_id: Option<String>,
}

/// Accept a question and queue its answering run.
async fn ask_question<S>(
    State(service): State<Arc<S>>,
    Json(request): Json<QueryRequest>,
) -> Result<(StatusCode, Json<AskOutcome>), AppError>
where
    S: RagApi,
{
    let outcome = service
        .ask(request.conversation_id, &request.question)
        .await?;
    Ok((StatusCode::ACCEPTED, Json(outcome)))
}

#[derive(Serialize)]
struct ConversationsResponse {
    conversations: Vec<ConversationSummary>,
}

async fn list_conversations<S>(
    State(service): State<Arc<S>>,
) -> Result<Json<ConversationsResponse>, AppError>
where
    S: RagApi,
{
    let conversations = service.conversations().await?;
    Ok(Json(ConversationsResponse { conversations }))
}

#[derive(Serialize)]
struct MessagesResponse {
    messages: Vec<Message>,
}

async fn list_messages<S>(
    State(service): State<Arc<S>>,
    Path(conversation_id): Path<String>,
) -> Result<Json<MessagesResponse>, AppError>
where
    S: RagApi,
{
    let messages = service.messages(&conversation_id).await?;
    Ok(Json(MessagesResponse { messages }))
}

#[derive(Serialize)]
struct DocumentsResponse {
    documents: Vec<DocumentRecord>,
}

async fn list_documents<S>(
    State(service): State<Arc<S>>,
) -> Result<Json<DocumentsResponse>, AppError>
where
    S: RagApi,
{
    let documents = service.documents().await?;
    Ok(Json(DocumentsResponse { documents }))
}

async fn delete_document<S>(
    State(service): State<Arc<S>>,
    Path(document_id): Path<String>,
) -> Result<Json<DeletionReport>, AppError>
where
    S: RagApi,
{
    let report = service.delete_document(&document_id).await?;
    Ok(Json(report))
}

async fn delete_conversation<S>(
    State(service): State<Arc<S>>,
    Path(conversation_id): Path<String>,
) -> Result<Json<DeletionReport>, AppError>
where
    S: RagApi,
{
    let report = service.delete_conversation(&conversation_id).await?;
    Ok(Json(report))
}

async fn get_metrics<S>(State(service): State<Arc<S>>) -> Json<MetricsSnapshot>
where
    S: RagApi,
{
    Json(service.metrics_snapshot())
}

struct AppError(ServiceError);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = if self.0.is_not_found() {
            StatusCode::NOT_FOUND
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        (status, self.0.to_string()).into_response()
    }
}

impl From<ServiceError> for AppError {
    fn from(inner: ServiceError) -> Self {
        Self(inner)
    }
}
