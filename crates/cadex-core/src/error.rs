//! Domain error types.

use thiserror::Error;
use uuid::Uuid;

/// Top-level domain error type.
#[derive(Debug, Error)]
pub enum DomainError {
    /// A story was not found.
    #[error("story not found: {0}")]
    AggregateNotFound(Uuid),

    /// A player is not registered in the story.
    #[error("player not found: {0}")]
    PlayerNotFound(String),

    /// A single compare-and-set lost against a concurrent writer.
    #[error("concurrency conflict on {path}: expected revision {expected}, found {actual}")]
    ConcurrencyConflict {
        /// The document path that had the conflict.
        path: String,
        /// The revision the writer expected.
        expected: i64,
        /// The revision actually stored.
        actual: i64,
    },

    /// The atomic apply cycle gave up after too many lost races.
    #[error("story {story_id} is contended: gave up after {attempts} attempts")]
    RetriesExhausted {
        /// The contended story.
        story_id: Uuid,
        /// How many read-step-write cycles were tried.
        attempts: u32,
    },

    /// A validation error in domain logic.
    #[error("validation error: {0}")]
    Validation(String),

    /// The player is not allowed to play right now.
    #[error("not your turn: {0}")]
    NotYourTurn(String),

    /// An admin-only action was invoked by another player.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// A handle or continuation token could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),

    /// An infrastructure/persistence error.
    #[error("infrastructure error: {0}")]
    Infrastructure(String),
}
