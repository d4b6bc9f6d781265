//! In-memory vector index used by tests and local development.

use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::VectorIndex;
use super::types::{RecordPayload, SearchOutcome, SearchScope, VectorRecord, VectorStoreError};

struct StoredRecord {
    vector: Vec<f32>,
    payload: RecordPayload,
}

/// Cosine-similarity index backed by a `BTreeMap`, with the same upsert and
/// scoping semantics as the Qdrant client.
#[derive(Default)]
pub struct MemoryIndex {
    records: RwLock<BTreeMap<Uuid, StoredRecord>>,
}

impl MemoryIndex {
    /// Create an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of stored records.
    pub async fn record_count(&self) -> usize {
        self.records.read().await.len()
    }

    /// Number of records carrying the given document id.
    pub async fn count_for_document(&self, document_id: &str) -> usize {
        self.records
            .read()
            .await
            .values()
            .filter(|record| record.payload.document_id == document_id)
            .count()
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

fn in_scope(payload: &RecordPayload, scope: &SearchScope) -> bool {
    match scope {
        SearchScope::Unrestricted => true,
        SearchScope::Documents(ids) => ids.contains(&payload.document_id),
    }
}

#[async_trait]
impl VectorIndex for MemoryIndex {
    async fn ensure_collection(&self) -> Result<(), VectorStoreError> {
        Ok(())
    }

    async fn upsert(&self, records: Vec<VectorRecord>) -> Result<usize, VectorStoreError> {
        let count = records.len();
        let mut guard = self.records.write().await;
        for record in records {
            guard.insert(
                record.id,
                StoredRecord {
                    vector: record.vector,
                    payload: record.payload,
                },
            );
        }
        Ok(count)
    }

    async fn search(
        &self,
        vector: &[f32],
        top_k: usize,
        scope: &SearchScope,
    ) -> Result<SearchOutcome, VectorStoreError> {
        if scope.matches_nothing() || top_k == 0 {
            return Ok(SearchOutcome::default());
        }

        let guard = self.records.read().await;
        let mut scored: Vec<(f32, &StoredRecord)> = guard
            .values()
            .filter(|record| in_scope(&record.payload, scope))
            .map(|record| (cosine_similarity(vector, &record.vector), record))
            .collect();
        // Stable sort over id-ordered iteration keeps tie-breaks deterministic.
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);

        let mut outcome = SearchOutcome::default();
        for (_, record) in scored {
            if record.payload.text.trim().is_empty() {
                continue;
            }
            outcome.contexts.push(record.payload.text.clone());
            if !record.payload.source.trim().is_empty() {
                outcome.sources.insert(record.payload.source.clone());
            }
        }
        Ok(outcome)
    }

    async fn delete_by_document(&self, document_id: &str) -> Result<(), VectorStoreError> {
        self.records
            .write()
            .await
            .retain(|_, record| record.payload.document_id != document_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector::types::record_id;

    fn record(document_id: &str, index: usize, vector: Vec<f32>) -> VectorRecord {
        VectorRecord {
            id: record_id(document_id, index),
            vector,
            payload: RecordPayload {
                source: format!("{document_id}.pdf"),
                text: format!("{document_id} chunk {index}"),
                document_id: document_id.to_string(),
            },
        }
    }

    #[tokio::test]
    async fn upsert_overwrites_by_id() {
        let index = MemoryIndex::new();
        index
            .upsert(vec![record("d1", 0, vec![1.0, 0.0])])
            .await
            .expect("upsert");
        index
            .upsert(vec![record("d1", 0, vec![0.0, 1.0])])
            .await
            .expect("re-upsert");

        assert_eq!(index.record_count().await, 1);
    }

    #[tokio::test]
    async fn search_respects_document_scope() {
        let index = MemoryIndex::new();
        index
            .upsert(vec![
                record("d1", 0, vec![1.0, 0.0]),
                record("d2", 0, vec![1.0, 0.0]),
            ])
            .await
            .expect("upsert");

        let outcome = index
            .search(&[1.0, 0.0], 10, &SearchScope::documents(["d1"]))
            .await
            .expect("search");
        assert_eq!(outcome.contexts, vec!["d1 chunk 0"]);
        assert!(outcome.sources.contains("d1.pdf"));

        let unrestricted = index
            .search(&[1.0, 0.0], 10, &SearchScope::Unrestricted)
            .await
            .expect("search");
        assert_eq!(unrestricted.contexts.len(), 2);
    }

    #[tokio::test]
    async fn empty_scope_returns_nothing() {
        let index = MemoryIndex::new();
        index
            .upsert(vec![record("d1", 0, vec![1.0, 0.0])])
            .await
            .expect("upsert");

        let outcome = index
            .search(
                &[1.0, 0.0],
                10,
                &SearchScope::documents(Vec::<String>::new()),
            )
            .await
            .expect("search");
        assert!(outcome.contexts.is_empty());
    }

    #[tokio::test]
    async fn best_match_comes_first_and_top_k_limits() {
        let index = MemoryIndex::new();
        index
            .upsert(vec![
                record("d1", 0, vec![1.0, 0.0]),
                record("d1", 1, vec![0.7, 0.7]),
                record("d1", 2, vec![0.0, 1.0]),
            ])
            .await
            .expect("upsert");

        let outcome = index
            .search(&[1.0, 0.0], 2, &SearchScope::Unrestricted)
            .await
            .expect("search");
        assert_eq!(outcome.contexts, vec!["d1 chunk 0", "d1 chunk 1"]);
    }

    #[tokio::test]
    async fn delete_by_document_removes_only_that_document() {
        let index = MemoryIndex::new();
        index
            .upsert(vec![
                record("d1", 0, vec![1.0, 0.0]),
                record("d1", 1, vec![0.0, 1.0]),
                record("d2", 0, vec![1.0, 0.0]),
            ])
            .await
            .expect("upsert");

        index.delete_by_document("d1").await.expect("delete");
        assert_eq!(index.count_for_document("d1").await, 0);
        assert_eq!(index.count_for_document("d2").await, 1);
    }
}
