//! The story aggregate and the player records hanging off it.

use std::collections::BTreeMap;

use cadex_core::error::DomainError;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle phase of a story, derived from its flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StoryPhase {
    /// Accepting players, no turns yet.
    Draft,
    /// Order fixed, turns running.
    Active,
    /// Closed by the admin; contributions are public.
    Closed,
}

/// One player's submission for a lap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contribution {
    /// The text the player wrote; public once the story is closed.
    pub head: String,
    /// The fragment handed to the next player as a continuation token.
    pub tail: String,
}

/// Public face of a player inside the shared story document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerPublicView {
    /// Story-scoped handle; mirrors the key in `StoryAggregate::players`.
    pub key: String,
    /// Display name.
    pub name: String,
    /// Display color.
    pub color: String,
    /// Whether the player submitted during the current prompt.
    pub played: bool,
    /// Whether the player is the one currently prompted.
    pub my_turn: bool,
    /// Encrypted hand-off text meant for this player only.
    pub continuation: String,
    /// Filled in when the story is closed.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub contributions: Vec<Contribution>,
}

impl PlayerPublicView {
    /// Creates a view for a freshly registered player.
    #[must_use]
    pub fn new(key: impl Into<String>, name: impl Into<String>, color: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            name: name.into(),
            color: color.into(),
            ..Self::default()
        }
    }
}

/// A player's private partition. Only the player (and the reconciler)
/// ever reads or writes it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerPrivateRecord {
    /// Real identity of the player.
    pub id: String,
    /// The player's handle in this story.
    pub key: String,
    /// Display name.
    pub name: String,
    /// Display color.
    pub color: String,
    /// Mirror of the public `played` flag.
    pub played: bool,
    /// Mirror of the public `my_turn` flag.
    pub my_turn: bool,
    /// Mirror of the public continuation token.
    pub continuation: String,
    /// Every lap this player completed, oldest first.
    pub contributions: Vec<Contribution>,
    /// Contribution of the latest play, kept until its turn is known to be
    /// committed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending: Option<Contribution>,
    /// Decrypted continuation; derived by the reconciler.
    pub ptail: String,
}

impl PlayerPrivateRecord {
    /// Creates the private record of a newly registered player.
    #[must_use]
    pub fn new(id: impl Into<String>, view: &PlayerPublicView) -> Self {
        Self {
            id: id.into(),
            key: view.key.clone(),
            name: view.name.clone(),
            color: view.color.clone(),
            ..Self::default()
        }
    }

    /// Moves `pending` into `contributions` if the story has recorded more
    /// turns for this player than the record holds. Returns `true` if the
    /// record changed.
    pub fn settle(&mut self, completed_turns: usize) -> bool {
        if completed_turns <= self.contributions.len() {
            return false;
        }
        match self.pending.take() {
            Some(pending) => {
                self.contributions.push(pending);
                true
            }
            None => false,
        }
    }

    /// Tail of the most recent contribution, if any.
    #[must_use]
    pub fn latest_tail(&self) -> Option<&str> {
        self.contributions.last().map(|c| c.tail.as_str())
    }
}

/// The shared, strongly consistent record of a story.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoryAggregate {
    /// Story identifier.
    pub id: Uuid,
    /// Handle of the creating player.
    pub admin: String,
    /// Set once the admin starts the story.
    pub started: bool,
    /// Set once the admin closes the story.
    pub completed: bool,
    /// Turn order, fixed at start.
    pub order: Vec<String>,
    /// Position inside `order` of the current player.
    pub round: usize,
    /// Number of completed laps.
    pub turn: usize,
    /// Handles in the order their turns were completed.
    pub rounds: Vec<String>,
    /// Public player views keyed by handle.
    pub players: BTreeMap<String, PlayerPublicView>,
}

impl StoryAggregate {
    /// Creates a draft story whose only player is its admin.
    #[must_use]
    pub fn new(id: Uuid, admin: PlayerPublicView) -> Self {
        let mut players = BTreeMap::new();
        let admin_key = admin.key.clone();
        players.insert(admin_key.clone(), admin);
        Self {
            id,
            admin: admin_key,
            players,
            ..Self::default()
        }
    }

    /// Returns the lifecycle phase.
    #[must_use]
    pub fn phase(&self) -> StoryPhase {
        if self.completed {
            StoryPhase::Closed
        } else if self.started {
            StoryPhase::Active
        } else {
            StoryPhase::Draft
        }
    }

    /// Returns `true` if `key` is the admin's handle.
    #[must_use]
    pub fn is_admin(&self, key: &str) -> bool {
        !self.admin.is_empty() && self.admin == key
    }

    /// Handle of the player whose lap position is current.
    #[must_use]
    pub fn current_key(&self) -> Option<&str> {
        self.order.get(self.round).map(String::as_str)
    }

    /// Number of turns `key` has completed, i.e. its occurrences in `rounds`.
    #[must_use]
    pub fn completed_turns(&self, key: &str) -> usize {
        self.rounds.iter().filter(|k| *k == key).count()
    }

    /// Returns `true` if some player has completed more turns than
    /// `records` can account for, pending contributions included.
    #[must_use]
    pub fn outpaces(&self, records: &[PlayerPrivateRecord]) -> bool {
        self.players.keys().any(|key| {
            let held = records
                .iter()
                .find(|record| &record.key == key)
                .map_or(0, |record| {
                    record.contributions.len() + usize::from(record.pending.is_some())
                });
            self.completed_turns(key) > held
        })
    }

    /// Adds a player while the story is still a draft. Registering a
    /// handle twice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` once the story has started.
    pub fn register_player(&mut self, view: PlayerPublicView) -> Result<(), DomainError> {
        if self.phase() != StoryPhase::Draft {
            return Err(DomainError::Validation(format!(
                "story {} is no longer accepting players",
                self.id
            )));
        }
        self.players.entry(view.key.clone()).or_insert(view);
        Ok(())
    }

    /// Fixes the turn order and marks the story started.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if the story is not a draft, has no
    /// players, or `order` is not a permutation of the registered handles.
    pub fn start(&mut self, order: Vec<String>) -> Result<(), DomainError> {
        if self.phase() != StoryPhase::Draft {
            return Err(DomainError::Validation(format!(
                "story {} has already been started",
                self.id
            )));
        }
        if self.players.is_empty() {
            return Err(DomainError::Validation(format!(
                "story {} has no players",
                self.id
            )));
        }
        let mut sorted = order.clone();
        sorted.sort();
        if !sorted.iter().eq(self.players.keys()) {
            return Err(DomainError::Validation(
                "turn order must list every player exactly once".into(),
            ));
        }
        self.order = order;
        self.round = 0;
        self.turn = 0;
        self.rounds.clear();
        self.started = true;
        Ok(())
    }

    /// Records that the prompted player submitted their contribution.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if the story is closed,
    /// `DomainError::PlayerNotFound` for an unknown handle, and
    /// `DomainError::NotYourTurn` if the player is not prompted or already
    /// played.
    pub fn mark_played(&mut self, key: &str) -> Result<(), DomainError> {
        if self.completed {
            return Err(DomainError::Validation(format!(
                "story {} is closed",
                self.id
            )));
        }
        let player = self
            .players
            .get_mut(key)
            .ok_or_else(|| DomainError::PlayerNotFound(key.to_owned()))?;
        if player.played {
            return Err(DomainError::NotYourTurn(format!(
                "{} already played this lap",
                player.name
            )));
        }
        if !player.my_turn {
            return Err(DomainError::NotYourTurn(format!(
                "{} is not the prompted player",
                player.name
            )));
        }
        player.played = true;
        Ok(())
    }

    /// Changes a player's display attributes. `None` leaves a field alone.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if the story is closed and
    /// `DomainError::PlayerNotFound` for an unknown handle.
    pub fn update_display(
        &mut self,
        key: &str,
        name: Option<&str>,
        color: Option<&str>,
    ) -> Result<&PlayerPublicView, DomainError> {
        if self.completed {
            return Err(DomainError::Validation(format!(
                "story {} is closed",
                self.id
            )));
        }
        let player = self
            .players
            .get_mut(key)
            .ok_or_else(|| DomainError::PlayerNotFound(key.to_owned()))?;
        if let Some(name) = name {
            name.clone_into(&mut player.name);
        }
        if let Some(color) = color {
            color.clone_into(&mut player.color);
        }
        Ok(&*player)
    }

    /// Publishes every player's contributions and marks the story closed.
    /// A pending contribution is published if its turn was committed.
    /// Records whose handle is not part of the story are ignored; closing a
    /// closed story changes nothing.
    pub fn close(&mut self, records: &[PlayerPrivateRecord]) {
        if self.completed {
            return;
        }
        for record in records {
            let completed = self.completed_turns(&record.key);
            if let Some(player) = self.players.get_mut(&record.key) {
                let mut record = record.clone();
                record.settle(completed);
                player.contributions = record.contributions;
            }
        }
        self.completed = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft_with(keys: &[&str]) -> StoryAggregate {
        let mut story =
            StoryAggregate::new(Uuid::new_v4(), PlayerPublicView::new(keys[0], "admin", ""));
        for key in &keys[1..] {
            story
                .register_player(PlayerPublicView::new(*key, *key, ""))
                .unwrap();
        }
        story
    }

    #[test]
    fn test_new_story_is_draft_with_admin_registered() {
        // Arrange
        let id = Uuid::new_v4();

        // Act
        let story = StoryAggregate::new(id, PlayerPublicView::new("h-admin", "Ada", "red"));

        // Assert
        assert_eq!(story.id, id);
        assert_eq!(story.phase(), StoryPhase::Draft);
        assert!(story.is_admin("h-admin"));
        assert!(!story.is_admin("someone"));
        assert_eq!(story.players.len(), 1);
        assert_eq!(story.players["h-admin"].name, "Ada");
        assert!(story.order.is_empty());
    }

    #[test]
    fn test_register_player_is_idempotent_per_handle() {
        let mut story = draft_with(&["a"]);

        story
            .register_player(PlayerPublicView::new("b", "Bob", ""))
            .unwrap();
        story
            .register_player(PlayerPublicView::new("b", "Other name", ""))
            .unwrap();

        assert_eq!(story.players.len(), 2);
        assert_eq!(story.players["b"].name, "Bob");
    }

    #[test]
    fn test_register_player_rejected_after_start() {
        let mut story = draft_with(&["a", "b"]);
        story.start(vec!["b".into(), "a".into()]).unwrap();

        let result = story.register_player(PlayerPublicView::new("c", "Cy", ""));

        assert!(matches!(result, Err(DomainError::Validation(_))));
        assert_eq!(story.players.len(), 2);
    }

    #[test]
    fn test_start_fixes_order_and_activates() {
        let mut story = draft_with(&["a", "b", "c"]);

        story
            .start(vec!["c".into(), "a".into(), "b".into()])
            .unwrap();

        assert_eq!(story.phase(), StoryPhase::Active);
        assert_eq!(story.order, vec!["c", "a", "b"]);
        assert_eq!(story.current_key(), Some("c"));
        assert_eq!((story.round, story.turn), (0, 0));
    }

    #[test]
    fn test_start_rejects_non_permutation() {
        let mut story = draft_with(&["a", "b"]);

        let missing = story.start(vec!["a".into()]);
        let duplicate = story.start(vec!["a".into(), "a".into()]);
        let stranger = story.start(vec!["a".into(), "z".into()]);

        assert!(matches!(missing, Err(DomainError::Validation(_))));
        assert!(matches!(duplicate, Err(DomainError::Validation(_))));
        assert!(matches!(stranger, Err(DomainError::Validation(_))));
        assert!(!story.started);
    }

    #[test]
    fn test_start_twice_is_rejected() {
        let mut story = draft_with(&["a"]);
        story.start(vec!["a".into()]).unwrap();

        let result = story.start(vec!["a".into()]);

        assert!(matches!(result, Err(DomainError::Validation(_))));
    }

    #[test]
    fn test_mark_played_requires_prompt() {
        let mut story = draft_with(&["a", "b"]);
        story.start(vec!["a".into(), "b".into()]).unwrap();
        story.players.get_mut("a").unwrap().my_turn = true;

        let not_prompted = story.mark_played("b");
        let unknown = story.mark_played("zz");
        story.mark_played("a").unwrap();
        let twice = story.mark_played("a");

        assert!(matches!(not_prompted, Err(DomainError::NotYourTurn(_))));
        assert!(matches!(unknown, Err(DomainError::PlayerNotFound(_))));
        assert!(matches!(twice, Err(DomainError::NotYourTurn(_))));
        assert!(story.players["a"].played);
        assert!(!story.players["b"].played);
    }

    #[test]
    fn test_update_display_changes_only_given_fields() {
        let mut story = draft_with(&["a"]);

        let view = story.update_display("a", None, Some("green")).unwrap();

        assert_eq!(view.name, "admin");
        assert_eq!(view.color, "green");
    }

    #[test]
    fn test_close_publishes_contributions_and_freezes() {
        // Arrange
        let mut story = draft_with(&["a", "b"]);
        let mut record = PlayerPrivateRecord::new("uid-a", &story.players["a"]);
        record.contributions.push(Contribution {
            head: "h1".into(),
            tail: "t1".into(),
        });
        let stranger = PlayerPrivateRecord {
            key: "nobody".into(),
            ..PlayerPrivateRecord::default()
        };

        // Act
        story.close(&[record, stranger]);

        // Assert
        assert_eq!(story.phase(), StoryPhase::Closed);
        assert_eq!(story.players["a"].contributions.len(), 1);
        assert!(story.players["b"].contributions.is_empty());
        assert!(!story.players.contains_key("nobody"));
        assert!(matches!(
            story.mark_played("a"),
            Err(DomainError::Validation(_))
        ));
    }

    #[test]
    fn test_settle_promotes_pending_only_for_committed_turns() {
        // Arrange
        let view = PlayerPublicView::new("a", "A", "");
        let mut record = PlayerPrivateRecord::new("uid-a", &view);
        record.pending = Some(Contribution {
            head: "h1".into(),
            tail: "t1".into(),
        });

        // Act
        let uncommitted = record.settle(0);
        let committed = record.settle(1);
        let again = record.settle(1);

        // Assert
        assert!(!uncommitted);
        assert!(committed);
        assert!(!again);
        assert_eq!(record.contributions.len(), 1);
        assert!(record.pending.is_none());
    }

    #[test]
    fn test_close_publishes_committed_pending_contribution() {
        // Arrange
        let mut story = draft_with(&["a", "b"]);
        story.start(vec!["a".into(), "b".into()]).unwrap();
        story.rounds.push("a".into());
        let mut committed = PlayerPrivateRecord::new("uid-a", &story.players["a"]);
        committed.pending = Some(Contribution {
            head: "h1".into(),
            tail: "t1".into(),
        });
        let mut rejected = PlayerPrivateRecord::new("uid-b", &story.players["b"]);
        rejected.pending = Some(Contribution {
            head: "early".into(),
            tail: "early".into(),
        });

        // Act
        let behind = story.outpaces(&[PlayerPrivateRecord::new("uid-a", &story.players["a"])]);
        let caught_up = story.outpaces(&[committed.clone(), rejected.clone()]);
        story.close(&[committed, rejected]);

        // Assert
        assert!(behind);
        assert!(!caught_up);
        assert_eq!(story.players["a"].contributions[0].head, "h1");
        assert!(story.players["b"].contributions.is_empty());
    }

    #[test]
    fn test_public_view_serialization_never_contains_real_id() {
        let story = draft_with(&["a"]);

        let json = serde_json::to_value(&story).unwrap();

        assert!(json["players"]["a"].get("id").is_none());
        assert!(json["players"]["a"].get("contributions").is_none());
        assert_eq!(json["players"]["a"]["my_turn"], false);
    }
}
