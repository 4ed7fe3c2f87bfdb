//! Fault-injecting `DocumentStore` wrappers for tests.

use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use cadex_core::error::DomainError;
use cadex_core::store::{DocumentChanged, DocumentStore, StoredDocument};
use serde_json::Value;
use tokio::sync::broadcast;

/// Wraps a store and makes its next `conflicts` compare-and-set calls lose,
/// as if another writer had committed first. Reads and partial updates go
/// straight through.
#[derive(Debug)]
pub struct ContendedDocumentStore<S> {
    inner: S,
    remaining: AtomicU32,
    injected: AtomicU32,
}

impl<S: DocumentStore> ContendedDocumentStore<S> {
    /// Wraps `inner`, injecting `conflicts` lost races.
    #[must_use]
    pub fn new(inner: S, conflicts: u32) -> Self {
        Self {
            inner,
            remaining: AtomicU32::new(conflicts),
            injected: AtomicU32::new(0),
        }
    }

    /// The wrapped store, for seeding documents without contention.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// How many conflicts have been injected so far.
    pub fn conflicts_injected(&self) -> u32 {
        self.injected.load(Ordering::SeqCst)
    }

    fn take_conflict(&self) -> bool {
        self.remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl<S: DocumentStore> DocumentStore for ContendedDocumentStore<S> {
    async fn get(&self, path: &str) -> Result<Option<StoredDocument>, DomainError> {
        self.inner.get(path).await
    }

    async fn list(&self, prefix: &str) -> Result<Vec<StoredDocument>, DomainError> {
        self.inner.list(prefix).await
    }

    async fn update(&self, path: &str, partial: Value) -> Result<i64, DomainError> {
        self.inner.update(path, partial).await
    }

    async fn compare_and_set(
        &self,
        path: &str,
        expected_revision: i64,
        body: Value,
    ) -> Result<i64, DomainError> {
        if self.take_conflict() {
            self.injected.fetch_add(1, Ordering::SeqCst);
            return Err(DomainError::ConcurrencyConflict {
                path: path.to_owned(),
                expected: expected_revision,
                actual: expected_revision + 1,
            });
        }
        self.inner.compare_and_set(path, expected_revision, body).await
    }

    fn subscribe(&self) -> broadcast::Receiver<DocumentChanged> {
        self.inner.subscribe()
    }
}

/// A store that fails every operation with an infrastructure error.
#[derive(Debug)]
pub struct FailingDocumentStore;

fn unavailable() -> DomainError {
    DomainError::Infrastructure("connection refused".into())
}

#[async_trait]
impl DocumentStore for FailingDocumentStore {
    async fn get(&self, _path: &str) -> Result<Option<StoredDocument>, DomainError> {
        Err(unavailable())
    }

    async fn list(&self, _prefix: &str) -> Result<Vec<StoredDocument>, DomainError> {
        Err(unavailable())
    }

    async fn update(&self, _path: &str, _partial: Value) -> Result<i64, DomainError> {
        Err(unavailable())
    }

    async fn compare_and_set(
        &self,
        _path: &str,
        _expected_revision: i64,
        _body: Value,
    ) -> Result<i64, DomainError> {
        Err(unavailable())
    }

    fn subscribe(&self) -> broadcast::Receiver<DocumentChanged> {
        broadcast::channel(1).1
    }
}

/// Wraps a store and fails writes to one exact path, optionally after
/// letting a number of them through. Reads of that path and all operations
/// on other paths go through.
#[derive(Debug)]
pub struct PathFailingDocumentStore<S> {
    inner: S,
    failing_path: String,
    allowed: AtomicU32,
}

impl<S: DocumentStore> PathFailingDocumentStore<S> {
    /// Wraps `inner`, failing every write to `failing_path`.
    #[must_use]
    pub fn new(inner: S, failing_path: impl Into<String>) -> Self {
        Self {
            inner,
            failing_path: failing_path.into(),
            allowed: AtomicU32::new(0),
        }
    }

    /// Lets the first `writes` writes to the failing path succeed.
    #[must_use]
    pub fn after_writes(self, writes: u32) -> Self {
        self.allowed.store(writes, Ordering::SeqCst);
        self
    }

    /// The wrapped store, for reading and writing without faults.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    fn check(&self, path: &str) -> Result<(), DomainError> {
        if path != self.failing_path {
            return Ok(());
        }
        let allowed = self
            .allowed
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if allowed {
            Ok(())
        } else {
            Err(DomainError::Infrastructure(format!("write to {path} rejected")))
        }
    }
}

#[async_trait]
impl<S: DocumentStore> DocumentStore for PathFailingDocumentStore<S> {
    async fn get(&self, path: &str) -> Result<Option<StoredDocument>, DomainError> {
        self.inner.get(path).await
    }

    async fn list(&self, prefix: &str) -> Result<Vec<StoredDocument>, DomainError> {
        self.inner.list(prefix).await
    }

    async fn update(&self, path: &str, partial: Value) -> Result<i64, DomainError> {
        self.check(path)?;
        self.inner.update(path, partial).await
    }

    async fn compare_and_set(
        &self,
        path: &str,
        expected_revision: i64,
        body: Value,
    ) -> Result<i64, DomainError> {
        self.check(path)?;
        self.inner.compare_and_set(path, expected_revision, body).await
    }

    fn subscribe(&self) -> broadcast::Receiver<DocumentChanged> {
        self.inner.subscribe()
    }
}
