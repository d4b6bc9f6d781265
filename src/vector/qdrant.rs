//! HTTP client implementing the vector index against Qdrant.

use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde::Deserialize;
use serde_json::{Map, Value, json};

use super::VectorIndex;
use super::filters::{build_scope_filter, document_filter};
use super::types::{SearchOutcome, SearchScope, VectorRecord, VectorStoreError};

/// Lightweight HTTP client for Qdrant operations against one collection.
pub struct QdrantIndex {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    collection: String,
    dimension: usize,
}

#[derive(Deserialize)]
struct QueryResponse {
    result: QueryResult,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum QueryResult {
    Points(Vec<QueryPoint>),
    Object {
        #[serde(default)]
        points: Vec<QueryPoint>,
    },
}

#[derive(Deserialize)]
struct QueryPoint {
    id: Value,
    score: f32,
    #[serde(default)]
    payload: Option<Map<String, Value>>,
}

impl QdrantIndex {
    /// Construct a client for the given Qdrant instance and collection.
    pub fn new(
        base_url: &str,
        api_key: Option<String>,
        collection: &str,
        dimension: usize,
    ) -> Result<Self, VectorStoreError> {
        let client = Client::builder().user_agent("cortex-rag/0.1").build()?;
        let base_url = normalize_base_url(base_url).map_err(VectorStoreError::InvalidUrl)?;
        tracing::debug!(
            url = %base_url,
            collection,
            dimension,
            has_api_key = api_key.as_deref().map(|key| !key.is_empty()).unwrap_or(false),
            "Initialized Qdrant HTTP client"
        );

        Ok(Self {
            client,
            base_url,
            api_key,
            collection: collection.to_string(),
            dimension,
        })
    }

    async fn collection_exists(&self) -> Result<bool, VectorStoreError> {
        let response = self
            .request(Method::GET, &format!("collections/{}", self.collection))
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => {
                let body = response.text().await.unwrap_or_default();
                let error = VectorStoreError::UnexpectedStatus { status, body };
                tracing::error!(collection = %self.collection, error = %error, "Collection existence check failed");
                Err(error)
            }
        }
    }

    async fn create_collection(&self) -> Result<(), VectorStoreError> {
        let body = json!({
            "vectors": {
                "size": self.dimension,
                "distance": "Cosine"
            }
        });

        let response = self
            .request(Method::PUT, &format!("collections/{}", self.collection))
            .json(&body)
            .send()
            .await?;

        self.ensure_success(response, || {
            tracing::debug!(collection = %self.collection, dimension = self.dimension, "Collection created");
        })
        .await
    }

    /// Ensure the keyword payload index used by scope filters exists.
    async fn ensure_document_index(&self) -> Result<(), VectorStoreError> {
        let body = json!({
            "field_name": "document_id",
            "field_schema": "keyword",
        });

        let response = self
            .request(
                Method::PUT,
                &format!("collections/{}/index", self.collection),
            )
            .json(&body)
            .send()
            .await?;

        if response.status().is_success() {
            tracing::debug!(collection = %self.collection, "Payload index ensured for document_id");
        } else if response.status() == StatusCode::CONFLICT {
            tracing::debug!(collection = %self.collection, "Payload index already exists");
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let error = VectorStoreError::UnexpectedStatus { status, body };
            tracing::warn!(collection = %self.collection, error = %error, "Failed to ensure payload index");
        }

        Ok(())
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let url = format_endpoint(&self.base_url, path);
        let mut req = self.client.request(method, url);
        if let Some(api_key) = &self.api_key
            && !api_key.is_empty()
        {
            req = req.header("api-key", api_key);
        }
        req
    }

    async fn ensure_success<F>(
        &self,
        response: reqwest::Response,
        on_success: F,
    ) -> Result<(), VectorStoreError>
    where
        F: FnOnce(),
    {
        if response.status().is_success() {
            on_success();
            Ok(())
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let error = VectorStoreError::UnexpectedStatus { status, body };
            tracing::error!(error = %error, "Qdrant request failed");
            Err(error)
        }
    }
}

#[async_trait]
impl VectorIndex for QdrantIndex {
    async fn ensure_collection(&self) -> Result<(), VectorStoreError> {
        if !self.collection_exists().await? {
            tracing::debug!(collection = %self.collection, dimension = self.dimension, "Creating collection");
            self.create_collection().await?;
        }
        self.ensure_document_index().await
    }

    async fn upsert(&self, records: Vec<VectorRecord>) -> Result<usize, VectorStoreError> {
        if records.is_empty() {
            return Ok(0);
        }

        let serialized: Vec<Value> = records
            .iter()
            .map(|record| {
                json!({
                    "id": record.id.to_string(),
                    "vector": record.vector,
                    "payload": record.payload,
                })
            })
            .collect();

        let point_count = serialized.len();
        let response = self
            .request(
                Method::PUT,
                &format!("collections/{}/points", self.collection),
            )
            .query(&[("wait", true)])
            .json(&json!({ "points": serialized }))
            .send()
            .await?;

        self.ensure_success(response, || {
            tracing::debug!(collection = %self.collection, points = point_count, "Points upserted");
        })
        .await?;

        Ok(point_count)
    }

    async fn search(
        &self,
        vector: &[f32],
        top_k: usize,
        scope: &SearchScope,
    ) -> Result<SearchOutcome, VectorStoreError> {
        if scope.matches_nothing() {
            tracing::debug!(collection = %self.collection, "Scope matches no documents; skipping search");
            return Ok(SearchOutcome::default());
        }

        let mut body = json!({
            "query": vector,
            "limit": top_k,
            "with_payload": true,
        });
        if let Some(filter) = build_scope_filter(scope) {
            body.as_object_mut()
                .expect("query body should remain an object")
                .insert("filter".into(), filter);
        }

        let response = self
            .request(
                Method::POST,
                &format!("collections/{}/points/query", self.collection),
            )
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let error = VectorStoreError::UnexpectedStatus { status, body };
            tracing::error!(collection = %self.collection, error = %error, "Qdrant search failed");
            return Err(error);
        }

        let payload: QueryResponse = response.json().await?;
        let mut points = match payload.result {
            QueryResult::Points(points) => points,
            QueryResult::Object { points } => points,
        };

        // Qdrant already orders by score; re-sort with an id tie-break so the
        // result order is deterministic for a fixed data set.
        points.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| stringify_point_id(&a.id).cmp(&stringify_point_id(&b.id)))
        });

        let mut outcome = SearchOutcome::default();
        for point in points {
            let Some(mut payload) = point.payload else {
                continue;
            };
            if let Some(Value::String(text)) = payload.remove("text")
                && !text.trim().is_empty()
            {
                outcome.contexts.push(text);
                if let Some(Value::String(source)) = payload.remove("source")
                    && !source.trim().is_empty()
                {
                    outcome.sources.insert(source);
                }
            }
        }

        Ok(outcome)
    }

    async fn delete_by_document(&self, document_id: &str) -> Result<(), VectorStoreError> {
        let response = self
            .request(
                Method::POST,
                &format!("collections/{}/points/delete", self.collection),
            )
            .query(&[("wait", true)])
            .json(&json!({ "filter": document_filter(document_id) }))
            .send()
            .await?;

        self.ensure_success(response, || {
            tracing::debug!(collection = %self.collection, document_id, "Document vectors deleted");
        })
        .await
    }
}

fn normalize_base_url(url: &str) -> Result<String, String> {
    let mut parsed = reqwest::Url::parse(url).map_err(|err| err.to_string())?;
    let path = parsed.path().trim_end_matches('/').to_string();
    parsed.set_path(&path);
    Ok(parsed.to_string())
}

fn format_endpoint(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    format!("{base}/{path}")
}

fn stringify_point_id(id: &Value) -> String {
    match id {
        Value::String(text) => text.clone(),
        Value::Number(number) => number.to_string(),
        other => other.to_string(),
    }
}
