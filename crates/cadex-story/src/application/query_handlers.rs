//! Query handlers for the story context.
//!
//! Stories are read as their public document. A player's private record is
//! only ever returned to that player, addressed by their real id.

use cadex_core::error::DomainError;
use cadex_core::store::DocumentStore;
use uuid::Uuid;

use super::documents::{load_record, load_story};
use crate::domain::story::{PlayerPrivateRecord, StoryAggregate};

/// Retrieves the public story document.
///
/// # Errors
///
/// Returns `DomainError::AggregateNotFound` if the story does not exist.
pub async fn get_story(
    story_id: Uuid,
    store: &dyn DocumentStore,
) -> Result<StoryAggregate, DomainError> {
    load_story(store, story_id).await
}

/// Retrieves the caller's own private record.
///
/// # Errors
///
/// Returns `DomainError::PlayerNotFound` if `uid` never joined the story.
pub async fn get_player(
    story_id: Uuid,
    uid: &str,
    store: &dyn DocumentStore,
) -> Result<PlayerPrivateRecord, DomainError> {
    load_record(store, story_id, uid)
        .await?
        .ok_or_else(|| DomainError::PlayerNotFound(uid.to_owned()))
}
