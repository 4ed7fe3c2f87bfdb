//! Store layout: where stories and private records live, and how they are
//! read back.

use cadex_core::error::DomainError;
use cadex_core::store::DocumentStore;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use uuid::Uuid;

use crate::domain::story::{PlayerPrivateRecord, StoryAggregate};

const STORIES_ROOT: &str = "stories/";
const PLAYERS_ROOT: &str = "players/";

/// Path of the shared story document.
#[must_use]
pub fn story_path(story_id: Uuid) -> String {
    format!("{STORIES_ROOT}{story_id}")
}

/// Prefix under which every private record of a story lives.
#[must_use]
pub fn players_prefix(story_id: Uuid) -> String {
    format!("{PLAYERS_ROOT}{story_id}/")
}

/// Path of one player's private record.
#[must_use]
pub fn player_path(story_id: Uuid, uid: &str) -> String {
    format!("{PLAYERS_ROOT}{story_id}/{uid}")
}

/// Extracts the story id from a story document path.
#[must_use]
pub fn story_id_from_path(path: &str) -> Option<Uuid> {
    path.strip_prefix(STORIES_ROOT)
        .and_then(|rest| Uuid::parse_str(rest).ok())
}

pub(crate) fn decode<T: DeserializeOwned>(path: &str, body: Value) -> Result<T, DomainError> {
    serde_json::from_value(body).map_err(|e| {
        DomainError::Infrastructure(format!("document {path} deserialization failed: {e}"))
    })
}

pub(crate) fn encode<T: Serialize>(value: &T) -> Result<Value, DomainError> {
    serde_json::to_value(value)
        .map_err(|e| DomainError::Infrastructure(format!("document serialization failed: {e}")))
}

/// Loads a story together with its revision.
///
/// # Errors
///
/// Returns `DomainError::AggregateNotFound` if the story does not exist.
pub(crate) async fn load_story_revision(
    store: &dyn DocumentStore,
    story_id: Uuid,
) -> Result<(i64, StoryAggregate), DomainError> {
    let path = story_path(story_id);
    let doc = store
        .get(&path)
        .await?
        .ok_or(DomainError::AggregateNotFound(story_id))?;
    Ok((doc.revision, decode(&path, doc.body)?))
}

/// Loads a story.
///
/// # Errors
///
/// Returns `DomainError::AggregateNotFound` if the story does not exist.
pub async fn load_story(
    store: &dyn DocumentStore,
    story_id: Uuid,
) -> Result<StoryAggregate, DomainError> {
    Ok(load_story_revision(store, story_id).await?.1)
}

/// Loads one player's private record, if present.
///
/// # Errors
///
/// Returns `DomainError::Infrastructure` on store or decoding failure.
pub async fn load_record(
    store: &dyn DocumentStore,
    story_id: Uuid,
    uid: &str,
) -> Result<Option<PlayerPrivateRecord>, DomainError> {
    let path = player_path(story_id, uid);
    store
        .get(&path)
        .await?
        .map(|doc| decode(&path, doc.body))
        .transpose()
}

/// Loads every private record of a story.
///
/// # Errors
///
/// Returns `DomainError::Infrastructure` on store or decoding failure.
pub async fn load_records(
    store: &dyn DocumentStore,
    story_id: Uuid,
) -> Result<Vec<PlayerPrivateRecord>, DomainError> {
    store
        .list(&players_prefix(story_id))
        .await?
        .into_iter()
        .map(|doc| decode(&doc.path, doc.body))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_are_nested_under_story() {
        let id = Uuid::new_v4();

        assert_eq!(story_path(id), format!("stories/{id}"));
        assert!(player_path(id, "u1").starts_with(&players_prefix(id)));
    }

    #[test]
    fn test_story_id_from_path_only_accepts_story_documents() {
        let id = Uuid::new_v4();

        assert_eq!(story_id_from_path(&story_path(id)), Some(id));
        assert_eq!(story_id_from_path(&player_path(id, "u1")), None);
        assert_eq!(story_id_from_path("stories/not-a-uuid"), None);
    }
}
