//! Filter helpers for scoped vector queries.

use serde_json::{Value, json};

use super::types::SearchScope;

/// Compose the Qdrant payload filter for a search scope.
///
/// `Unrestricted` yields no filter; a document scope yields a `match any`
/// condition on the `document_id` payload field. An empty id set produces a
/// filter that matches nothing, though callers normally short-circuit before
/// issuing the request.
pub fn build_scope_filter(scope: &SearchScope) -> Option<Value> {
    match scope {
        SearchScope::Unrestricted => None,
        SearchScope::Documents(ids) => {
            let ids: Vec<&str> = ids.iter().map(String::as_str).collect();
            Some(json!({
                "must": [
                    {
                        "key": "document_id",
                        "match": { "any": ids }
                    }
                ]
            }))
        }
    }
}

/// Filter matching every record of a single document, used for deletion.
pub(crate) fn document_filter(document_id: &str) -> Value {
    json!({
        "must": [
            {
                "key": "document_id",
                "match": { "value": document_id }
            }
        ]
    })
}
