//! Document store abstraction.
//!
//! The game keeps its state in a hierarchical document store addressed by
//! slash-separated paths. The story context only needs per-path reads,
//! shallow partial writes, a revision-checked full write and change
//! notifications; atomic read-modify-write is built on top of those.

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::broadcast;

use crate::error::DomainError;

/// Revision reported for a path that holds no document.
pub const ABSENT_REVISION: i64 = 0;

/// Stored representation of a document.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredDocument {
    /// Path the document lives at.
    pub path: String,
    /// Monotonically increasing write counter, starting at 1.
    pub revision: i64,
    /// Document body, always a JSON object.
    pub body: Value,
}

/// Notification emitted after a write has been committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentChanged {
    /// Path of the written document.
    pub path: String,
    /// Revision produced by the write.
    pub revision: i64,
}

/// Store trait for reading and writing documents.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Load the document at `path`, if any.
    async fn get(&self, path: &str) -> Result<Option<StoredDocument>, DomainError>;

    /// Load every document whose path starts with `prefix`, ordered by path.
    async fn list(&self, prefix: &str) -> Result<Vec<StoredDocument>, DomainError>;

    /// Merge the top-level keys of `partial` into the document at `path`,
    /// creating it when absent. Returns the new revision.
    async fn update(&self, path: &str, partial: Value) -> Result<i64, DomainError>;

    /// Replace the document at `path` only if its revision is still
    /// `expected_revision` (`ABSENT_REVISION` means "must not exist").
    /// Returns the new revision, or `DomainError::ConcurrencyConflict`.
    async fn compare_and_set(
        &self,
        path: &str,
        expected_revision: i64,
        body: Value,
    ) -> Result<i64, DomainError>;

    /// Subscribe to committed-write notifications.
    fn subscribe(&self) -> broadcast::Receiver<DocumentChanged>;
}

/// Shallow merge used by `DocumentStore::update` implementations.
///
/// # Errors
///
/// Returns `DomainError::Validation` if `partial` is not a JSON object.
pub fn merge_partial(target: &mut Value, partial: Value) -> Result<(), DomainError> {
    let Value::Object(fields) = partial else {
        return Err(DomainError::Validation(
            "partial update must be a JSON object".into(),
        ));
    };
    if !target.is_object() {
        *target = Value::Object(serde_json::Map::new());
    }
    if let Value::Object(existing) = target {
        for (key, value) in fields {
            existing.insert(key, value);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_merge_partial_overwrites_only_given_keys() {
        let mut doc = json!({ "name": "ada", "color": "red", "played": false });

        merge_partial(&mut doc, json!({ "color": "blue", "ptail": "x" })).unwrap();

        assert_eq!(
            doc,
            json!({ "name": "ada", "color": "blue", "played": false, "ptail": "x" })
        );
    }

    #[test]
    fn test_merge_partial_replaces_nested_values_wholesale() {
        let mut doc = json!({ "contributions": [{ "head": "a", "tail": "b" }] });

        merge_partial(&mut doc, json!({ "contributions": [] })).unwrap();

        assert_eq!(doc, json!({ "contributions": [] }));
    }

    #[test]
    fn test_merge_partial_rejects_non_object() {
        let mut doc = json!({});
        let result = merge_partial(&mut doc, json!([1, 2]));
        assert!(matches!(result, Err(DomainError::Validation(_))));
    }
}
