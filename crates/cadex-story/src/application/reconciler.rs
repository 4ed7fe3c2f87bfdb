//! Fan-out of committed story state into players' private records.
//!
//! The shared story only carries encrypted continuations keyed by handle.
//! After each committed story write, every player's private record is
//! refreshed with their public flags and the decrypted continuation
//! (`ptail`). Writes are per-player and independent: one failing player
//! never blocks the others, and re-running over the same story is
//! harmless.

use std::sync::Arc;

use cadex_core::error::DomainError;
use cadex_core::store::DocumentStore;
use serde_json::json;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::documents::{load_story, player_path, story_id_from_path};
use crate::domain::codec::PrivacyCodec;
use crate::domain::story::{PlayerPublicView, StoryAggregate};

/// Outcome of one reconciliation pass.
#[derive(Debug, Default)]
pub struct ReconcileReport {
    /// Handles whose private record was refreshed.
    pub updated: Vec<String>,
    /// Handles that could not be refreshed, with the reason.
    pub failures: Vec<(String, DomainError)>,
}

impl ReconcileReport {
    /// Returns `true` if every player was refreshed.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Copies a story's public player state into private records.
pub struct FanoutReconciler<'a> {
    store: &'a dyn DocumentStore,
    codec: &'a PrivacyCodec,
}

impl<'a> FanoutReconciler<'a> {
    /// Creates a reconciler over `store`.
    #[must_use]
    pub fn new(store: &'a dyn DocumentStore, codec: &'a PrivacyCodec) -> Self {
        Self { store, codec }
    }

    /// Refreshes the private record of every player in `story`.
    pub async fn reconcile(&self, story: &StoryAggregate) -> ReconcileReport {
        let mut report = ReconcileReport::default();
        for view in story.players.values() {
            match self.reconcile_player(story.id, view).await {
                Ok(()) => report.updated.push(view.key.clone()),
                Err(err) => {
                    warn!(story_id = %story.id, handle = %view.key, error = %err, "player reconciliation failed");
                    report.failures.push((view.key.clone(), err));
                }
            }
        }
        report
    }

    /// Loads the committed story and reconciles it.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::AggregateNotFound` if the story does not exist.
    pub async fn reconcile_story(&self, story_id: Uuid) -> Result<ReconcileReport, DomainError> {
        let story = load_story(self.store, story_id).await?;
        Ok(self.reconcile(&story).await)
    }

    async fn reconcile_player(
        &self,
        story_id: Uuid,
        view: &PlayerPublicView,
    ) -> Result<(), DomainError> {
        let uid = self.codec.reveal_handle(story_id, &view.key)?;
        let ptail = if view.continuation.is_empty() {
            String::new()
        } else {
            self.codec.detoken(story_id, &view.continuation)?
        };

        self.store
            .update(
                &player_path(story_id, &uid),
                json!({
                    "key": view.key,
                    "name": view.name,
                    "color": view.color,
                    "played": view.played,
                    "my_turn": view.my_turn,
                    "continuation": view.continuation,
                    "ptail": ptail,
                }),
            )
            .await?;
        Ok(())
    }
}

/// Spawns a task that reconciles every story after each committed write.
///
/// The subscription is taken before the task starts, so no write made after
/// this call returns is missed. The task ends when the store's change
/// channel closes.
pub fn spawn_reconciler(store: Arc<dyn DocumentStore>, codec: Arc<PrivacyCodec>) -> JoinHandle<()> {
    let mut changes = store.subscribe();
    tokio::spawn(async move {
        info!("story reconciler started");
        loop {
            match changes.recv().await {
                Ok(change) => {
                    let Some(story_id) = story_id_from_path(&change.path) else {
                        continue;
                    };
                    let reconciler = FanoutReconciler::new(store.as_ref(), codec.as_ref());
                    match reconciler.reconcile_story(story_id).await {
                        Ok(report) => debug!(
                            %story_id,
                            revision = change.revision,
                            updated = report.updated.len(),
                            failed = report.failures.len(),
                            "story reconciled"
                        ),
                        Err(err) => warn!(%story_id, error = %err, "story reconciliation failed"),
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "reconciler lagged behind store changes");
                }
                Err(RecvError::Closed) => break,
            }
        }
        info!("story reconciler stopped");
    })
}
