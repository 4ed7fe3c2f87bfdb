//! `PostgreSQL` implementation of the `DocumentStore` trait.
//!
//! Change notifications are published in-process after each committed
//! write; subscribers on other processes sharing the database are not told.

use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tokio::sync::broadcast;
use tracing::debug;

use cadex_core::error::DomainError;
use cadex_core::store::{ABSENT_REVISION, DocumentChanged, DocumentStore, StoredDocument};

use crate::CHANGE_CHANNEL_CAPACITY;
use crate::schema::CREATE_DOCUMENTS_TABLE;

/// PostgreSQL-backed document store.
#[derive(Debug, Clone)]
pub struct PgDocumentStore {
    pool: PgPool,
    changes: broadcast::Sender<DocumentChanged>,
}

impl PgDocumentStore {
    /// Creates a new `PgDocumentStore`.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self { pool, changes }
    }

    /// Creates the documents table if it does not exist yet.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Infrastructure` if the DDL fails.
    pub async fn ensure_schema(&self) -> Result<(), DomainError> {
        sqlx::raw_sql(CREATE_DOCUMENTS_TABLE)
            .execute(&self.pool)
            .await
            .map_err(infrastructure)?;
        Ok(())
    }

    async fn current_revision(&self, path: &str) -> Result<i64, DomainError> {
        let revision: Option<i64> =
            sqlx::query_scalar("SELECT revision FROM documents WHERE path = $1")
                .bind(path)
                .fetch_optional(&self.pool)
                .await
                .map_err(infrastructure)?;
        Ok(revision.unwrap_or(ABSENT_REVISION))
    }

    fn notify(&self, path: &str, revision: i64) {
        // Nobody listening is not an error.
        let _ = self.changes.send(DocumentChanged {
            path: path.to_owned(),
            revision,
        });
    }
}

fn infrastructure(err: sqlx::Error) -> DomainError {
    DomainError::Infrastructure(format!("document store error: {err}"))
}

fn to_document(row: &PgRow) -> Result<StoredDocument, DomainError> {
    Ok(StoredDocument {
        path: row.try_get("path").map_err(infrastructure)?,
        revision: row.try_get("revision").map_err(infrastructure)?,
        body: row.try_get("body").map_err(infrastructure)?,
    })
}

#[async_trait]
impl DocumentStore for PgDocumentStore {
    async fn get(&self, path: &str) -> Result<Option<StoredDocument>, DomainError> {
        let row = sqlx::query("SELECT path, revision, body FROM documents WHERE path = $1")
            .bind(path)
            .fetch_optional(&self.pool)
            .await
            .map_err(infrastructure)?;
        row.as_ref().map(to_document).transpose()
    }

    async fn list(&self, prefix: &str) -> Result<Vec<StoredDocument>, DomainError> {
        let rows = sqlx::query(
            "SELECT path, revision, body FROM documents \
             WHERE left(path, char_length($1)) = $1 ORDER BY path",
        )
        .bind(prefix)
        .fetch_all(&self.pool)
        .await
        .map_err(infrastructure)?;
        rows.iter().map(to_document).collect()
    }

    async fn update(&self, path: &str, partial: Value) -> Result<i64, DomainError> {
        if !partial.is_object() {
            return Err(DomainError::Validation(
                "partial update must be a JSON object".into(),
            ));
        }
        // jsonb `||` replaces top-level keys, matching `merge_partial`.
        let revision: i64 = sqlx::query_scalar(
            "INSERT INTO documents (path, revision, body) VALUES ($1, 1, $2) \
             ON CONFLICT (path) DO UPDATE \
             SET body = documents.body || EXCLUDED.body, \
                 revision = documents.revision + 1, \
                 updated_at = NOW() \
             RETURNING revision",
        )
        .bind(path)
        .bind(&partial)
        .fetch_one(&self.pool)
        .await
        .map_err(infrastructure)?;

        self.notify(path, revision);
        Ok(revision)
    }

    async fn compare_and_set(
        &self,
        path: &str,
        expected_revision: i64,
        body: Value,
    ) -> Result<i64, DomainError> {
        let committed: Option<i64> = if expected_revision == ABSENT_REVISION {
            sqlx::query_scalar(
                "INSERT INTO documents (path, revision, body) VALUES ($1, 1, $2) \
                 ON CONFLICT (path) DO NOTHING RETURNING revision",
            )
            .bind(path)
            .bind(&body)
            .fetch_optional(&self.pool)
            .await
            .map_err(infrastructure)?
        } else {
            sqlx::query_scalar(
                "UPDATE documents \
                 SET body = $3, revision = revision + 1, updated_at = NOW() \
                 WHERE path = $1 AND revision = $2 \
                 RETURNING revision",
            )
            .bind(path)
            .bind(expected_revision)
            .bind(&body)
            .fetch_optional(&self.pool)
            .await
            .map_err(infrastructure)?
        };

        match committed {
            Some(revision) => {
                self.notify(path, revision);
                Ok(revision)
            }
            None => {
                let actual = self.current_revision(path).await?;
                debug!(path, expected_revision, actual, "compare-and-set lost");
                Err(DomainError::ConcurrencyConflict {
                    path: path.to_owned(),
                    expected: expected_revision,
                    actual,
                })
            }
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<DocumentChanged> {
        self.changes.subscribe()
    }
}
