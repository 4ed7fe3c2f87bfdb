//! Process-local implementation of the `DocumentStore` trait.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::broadcast;

use cadex_core::error::DomainError;
use cadex_core::store::{
    ABSENT_REVISION, DocumentChanged, DocumentStore, StoredDocument, merge_partial,
};

use crate::CHANGE_CHANNEL_CAPACITY;

/// In-memory document store.
///
/// All operations take a single short-lived lock, so each write is atomic
/// with respect to every other write on the same store.
#[derive(Debug)]
pub struct InMemoryDocumentStore {
    documents: Mutex<BTreeMap<String, (i64, Value)>>,
    changes: broadcast::Sender<DocumentChanged>,
}

impl InMemoryDocumentStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            documents: Mutex::new(BTreeMap::new()),
            changes,
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, (i64, Value)>>, DomainError> {
        self.documents
            .lock()
            .map_err(|e| DomainError::Infrastructure(format!("document store mutex poisoned: {e}")))
    }

    fn notify(&self, path: &str, revision: i64) {
        // Nobody listening is not an error.
        let _ = self.changes.send(DocumentChanged {
            path: path.to_owned(),
            revision,
        });
    }
}

impl Default for InMemoryDocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn get(&self, path: &str) -> Result<Option<StoredDocument>, DomainError> {
        let documents = self.lock()?;
        Ok(documents.get(path).map(|(revision, body)| StoredDocument {
            path: path.to_owned(),
            revision: *revision,
            body: body.clone(),
        }))
    }

    async fn list(&self, prefix: &str) -> Result<Vec<StoredDocument>, DomainError> {
        let documents = self.lock()?;
        Ok(documents
            .range(prefix.to_owned()..)
            .take_while(|(path, _)| path.starts_with(prefix))
            .map(|(path, (revision, body))| StoredDocument {
                path: path.clone(),
                revision: *revision,
                body: body.clone(),
            })
            .collect())
    }

    async fn update(&self, path: &str, partial: Value) -> Result<i64, DomainError> {
        let revision = {
            let mut documents = self.lock()?;
            let (current, mut body) = documents
                .get(path)
                .cloned()
                .unwrap_or_else(|| (ABSENT_REVISION, Value::Object(serde_json::Map::new())));
            merge_partial(&mut body, partial)?;
            let revision = current + 1;
            documents.insert(path.to_owned(), (revision, body));
            revision
        };
        self.notify(path, revision);
        Ok(revision)
    }

    async fn compare_and_set(
        &self,
        path: &str,
        expected_revision: i64,
        body: Value,
    ) -> Result<i64, DomainError> {
        let revision = {
            let mut documents = self.lock()?;
            let actual = documents.get(path).map_or(ABSENT_REVISION, |(rev, _)| *rev);
            if actual != expected_revision {
                return Err(DomainError::ConcurrencyConflict {
                    path: path.to_owned(),
                    expected: expected_revision,
                    actual,
                });
            }
            let revision = actual + 1;
            documents.insert(path.to_owned(), (revision, body));
            revision
        };
        self.notify(path, revision);
        Ok(revision)
    }

    fn subscribe(&self) -> broadcast::Receiver<DocumentChanged> {
        self.changes.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_get_returns_none_for_missing_path() {
        let store = InMemoryDocumentStore::new();

        let doc = store.get("stories/nope").await.unwrap();

        assert!(doc.is_none());
    }

    #[tokio::test]
    async fn test_update_creates_then_merges() {
        // Arrange
        let store = InMemoryDocumentStore::new();

        // Act
        let first = store
            .update("players/s/u", json!({ "name": "ada", "color": "red" }))
            .await
            .unwrap();
        let second = store
            .update("players/s/u", json!({ "color": "blue" }))
            .await
            .unwrap();

        // Assert
        assert_eq!(first, 1);
        assert_eq!(second, 2);
        let doc = store.get("players/s/u").await.unwrap().unwrap();
        assert_eq!(doc.revision, 2);
        assert_eq!(doc.body, json!({ "name": "ada", "color": "blue" }));
    }

    #[tokio::test]
    async fn test_compare_and_set_create_only_when_absent() {
        let store = InMemoryDocumentStore::new();

        let rev = store
            .compare_and_set("stories/a", ABSENT_REVISION, json!({ "id": "a" }))
            .await
            .unwrap();
        assert_eq!(rev, 1);

        let again = store
            .compare_and_set("stories/a", ABSENT_REVISION, json!({ "id": "b" }))
            .await;
        match again.unwrap_err() {
            DomainError::ConcurrencyConflict {
                expected, actual, ..
            } => {
                assert_eq!(expected, 0);
                assert_eq!(actual, 1);
            }
            other => panic!("expected ConcurrencyConflict, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_compare_and_set_rejects_stale_revision() {
        // Arrange
        let store = InMemoryDocumentStore::new();
        store.update("stories/a", json!({ "round": 0 })).await.unwrap();
        store.update("stories/a", json!({ "round": 1 })).await.unwrap();

        // Act
        let stale = store.compare_and_set("stories/a", 1, json!({ "round": 9 })).await;
        let fresh = store.compare_and_set("stories/a", 2, json!({ "round": 2 })).await;

        // Assert
        assert!(matches!(stale, Err(DomainError::ConcurrencyConflict { .. })));
        assert_eq!(fresh.unwrap(), 3);
        let doc = store.get("stories/a").await.unwrap().unwrap();
        assert_eq!(doc.body, json!({ "round": 2 }));
    }

    #[tokio::test]
    async fn test_list_returns_only_prefixed_paths_in_order() {
        let store = InMemoryDocumentStore::new();
        store.update("players/s1/b", json!({ "n": 2 })).await.unwrap();
        store.update("players/s1/a", json!({ "n": 1 })).await.unwrap();
        store.update("players/s2/a", json!({ "n": 3 })).await.unwrap();
        store.update("stories/s1", json!({})).await.unwrap();

        let docs = store.list("players/s1/").await.unwrap();

        let paths: Vec<&str> = docs.iter().map(|d| d.path.as_str()).collect();
        assert_eq!(paths, vec!["players/s1/a", "players/s1/b"]);
    }

    #[tokio::test]
    async fn test_subscribers_see_committed_writes() {
        let store = InMemoryDocumentStore::new();
        let mut changes = store.subscribe();

        store.update("stories/a", json!({ "x": 1 })).await.unwrap();
        store
            .compare_and_set("stories/a", 1, json!({ "x": 2 }))
            .await
            .unwrap();

        assert_eq!(
            changes.recv().await.unwrap(),
            DocumentChanged {
                path: "stories/a".into(),
                revision: 1
            }
        );
        assert_eq!(changes.recv().await.unwrap().revision, 2);
    }

    #[tokio::test]
    async fn test_failed_compare_and_set_does_not_notify() {
        let store = InMemoryDocumentStore::new();
        store.update("stories/a", json!({})).await.unwrap();
        let mut changes = store.subscribe();

        let _ = store.compare_and_set("stories/a", 5, json!({})).await;

        assert!(changes.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_rejected_update_leaves_path_absent() {
        let store = InMemoryDocumentStore::new();

        let result = store.update("players/s/u", json!("not an object")).await;

        assert!(matches!(result, Err(DomainError::Validation(_))));
        assert!(store.get("players/s/u").await.unwrap().is_none());
    }
}
