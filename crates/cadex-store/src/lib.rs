//! Document store implementations for the Cadex game.
//!
//! `InMemoryDocumentStore` keeps everything in the process and is the
//! default when no database is configured. `PgDocumentStore` persists
//! documents in PostgreSQL with a revision column for compare-and-set.

pub mod memory;
pub mod pg_document_store;
pub mod schema;

/// Capacity of the change-notification channel.
pub(crate) const CHANGE_CHANNEL_CAPACITY: usize = 1024;
