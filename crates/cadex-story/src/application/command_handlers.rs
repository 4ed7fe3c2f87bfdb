//! Command handlers for the story context.
//!
//! Each handler validates its command, then changes the shared story only
//! through the `ConsistencyCoordinator`, so every public transition is a
//! single compare-and-set. Private records are written by the player's own
//! command or by the reconciler. A play stores its contribution before the
//! turn it belongs to is committed.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use cadex_core::command::Command;
use cadex_core::error::DomainError;
use cadex_core::rng::{DeterministicRng, shuffle};
use cadex_core::store::ABSENT_REVISION;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::StoryContext;
use super::documents::{
    decode, encode, load_record, load_records, load_story, player_path, story_path,
};
use crate::domain::commands::{CloseStory, NewPlayer, NewStory, Play, StartStory, UpdatePlayer};
use crate::domain::story::{
    Contribution, PlayerPrivateRecord, PlayerPublicView, StoryAggregate, StoryPhase,
};

/// Result of a command issued by one player.
#[derive(Debug)]
pub struct PlayerCommandResult {
    /// The story affected.
    pub story: StoryAggregate,
    /// The caller's private record as written by the command.
    pub player: PlayerPrivateRecord,
}

fn require_text(field: &str, value: &str) -> Result<(), DomainError> {
    if value.trim().is_empty() {
        return Err(DomainError::Validation(format!("{field} must not be blank")));
    }
    Ok(())
}

fn require_uid(uid: &str) -> Result<(), DomainError> {
    require_text("uid", uid)?;
    if uid.contains('/') {
        return Err(DomainError::Validation("uid must not contain '/'".into()));
    }
    Ok(())
}

fn forbidden(action: &str) -> DomainError {
    DomainError::Forbidden(format!("only the story admin may {action}"))
}

/// Handles `NewStory`: creates a draft story whose first player is the
/// caller, who becomes its admin.
///
/// # Errors
///
/// Returns `DomainError::Validation` for a blank name or invalid uid, and
/// store errors otherwise.
pub async fn handle_new_story(
    command: &NewStory,
    ctx: StoryContext<'_>,
) -> Result<PlayerCommandResult, DomainError> {
    require_uid(&command.uid)?;
    require_text("name", &command.name)?;

    let story_id = Uuid::new_v4();
    let handle = ctx.codec.handle(story_id, &command.uid)?;
    let view = PlayerPublicView::new(
        handle,
        command.name.trim(),
        command.color.clone().unwrap_or_default(),
    );
    let player = PlayerPrivateRecord::new(command.uid.clone(), &view);

    ctx.store
        .update(&player_path(story_id, &command.uid), encode(&player)?)
        .await?;
    ctx.store
        .compare_and_set(
            &story_path(story_id),
            ABSENT_REVISION,
            encode(&StoryAggregate::new(story_id, view))?,
        )
        .await?;
    let story = ctx.coordinator().apply(story_id, &[]).await?;

    info!(
        correlation_id = %command.correlation_id(),
        command = command.command_type(),
        %story_id,
        "story created"
    );
    Ok(PlayerCommandResult { story, player })
}

/// Handles `StartStory`: shuffles the registered players into the turn
/// order and prompts the first of them.
///
/// The `Mutex` is locked only inside the synchronous transition, never
/// across an await.
///
/// # Errors
///
/// Returns `DomainError::Forbidden` for a non-admin caller and
/// `DomainError::Validation` if the story is not a draft.
pub async fn handle_start_story(
    command: &StartStory,
    ctx: StoryContext<'_>,
    rng: &Mutex<dyn DeterministicRng + Send>,
) -> Result<StoryAggregate, DomainError> {
    require_uid(&command.uid)?;
    let handle = ctx.codec.handle(command.story_id, &command.uid)?;

    let story = ctx
        .coordinator()
        .apply_with(command.story_id, &[], |story| {
            if !story.is_admin(&handle) {
                return Err(forbidden("start the story"));
            }
            let mut order: Vec<String> = story.players.keys().cloned().collect();
            {
                let mut rng_guard = rng.lock().map_err(|e| {
                    DomainError::Infrastructure(format!("RNG mutex poisoned: {e}"))
                })?;
                shuffle(&mut order, &mut *rng_guard);
            }
            story.start(order)
        })
        .await?;

    info!(
        correlation_id = %command.correlation_id(),
        command = command.command_type(),
        story_id = ?command.story_id(),
        players = story.order.len(),
        "story started"
    );
    Ok(story)
}

/// Handles `NewPlayer`: registers the caller in a draft story. Joining a
/// story twice returns the existing registration.
///
/// # Errors
///
/// Returns `DomainError::AggregateNotFound` for an unknown story and
/// `DomainError::Validation` once the story has started.
pub async fn handle_new_player(
    command: &NewPlayer,
    ctx: StoryContext<'_>,
) -> Result<PlayerCommandResult, DomainError> {
    require_uid(&command.uid)?;
    require_text("name", &command.name)?;

    let story = load_story(ctx.store, command.story_id).await?;
    let handle = ctx.codec.handle(command.story_id, &command.uid)?;

    if let Some(existing) = story.players.get(&handle) {
        let player = load_record(ctx.store, command.story_id, &command.uid)
            .await?
            .unwrap_or_else(|| PlayerPrivateRecord::new(command.uid.clone(), existing));
        debug!(story_id = %command.story_id, "player already registered");
        return Ok(PlayerCommandResult { story, player });
    }
    if story.phase() != StoryPhase::Draft {
        return Err(DomainError::Validation(format!(
            "story {} is no longer accepting players",
            command.story_id
        )));
    }

    let view = PlayerPublicView::new(
        handle,
        command.name.trim(),
        command.color.clone().unwrap_or_default(),
    );
    let player = PlayerPrivateRecord::new(command.uid.clone(), &view);
    ctx.store
        .update(&player_path(command.story_id, &command.uid), encode(&player)?)
        .await?;

    let story = ctx
        .coordinator()
        .apply_with(command.story_id, &[], |story| {
            story.register_player(view.clone())
        })
        .await?;

    info!(
        correlation_id = %command.correlation_id(),
        command = command.command_type(),
        story_id = ?command.story_id(),
        players = story.players.len(),
        "player joined"
    );
    Ok(PlayerCommandResult { story, player })
}

/// Handles `Play`: records the caller's contribution for the current lap
/// and hands its tail to the next player.
///
/// The contribution is stored as pending on the caller's private record
/// before the turn is committed, and settled into `contributions` once the
/// commit is known. The turn check runs inside the atomic cycle, so of two
/// concurrent plays for the same prompt exactly one is accepted.
/// Resubmitting a play whose turn was already committed returns the
/// settled record instead of being rejected.
///
/// # Errors
///
/// Returns `DomainError::NotYourTurn` if the caller is not prompted or has
/// already played, `DomainError::PlayerNotFound` if the caller never joined
/// and `DomainError::Validation` for blank text or a closed story.
pub async fn handle_play(
    command: &Play,
    ctx: StoryContext<'_>,
) -> Result<PlayerCommandResult, DomainError> {
    require_uid(&command.uid)?;
    require_text("head", &command.head)?;
    require_text("tail", &command.tail)?;

    let story = load_story(ctx.store, command.story_id).await?;
    if story.phase() == StoryPhase::Closed {
        return Err(DomainError::Validation(format!(
            "story {} is closed",
            command.story_id
        )));
    }
    let handle = ctx.codec.handle(command.story_id, &command.uid)?;
    let view = story
        .players
        .get(&handle)
        .cloned()
        .ok_or_else(|| DomainError::PlayerNotFound(command.uid.clone()))?;

    let contribution = Contribution {
        head: command.head.clone(),
        tail: command.tail.clone(),
    };
    let staged = match stage_contribution(ctx, &story, &view, &command.uid, &contribution).await? {
        Staged::Pending(record) => record,
        Staged::Replayed(player) => {
            info!(
                correlation_id = %command.correlation_id(),
                command = command.command_type(),
                story_id = ?command.story_id(),
                "play already committed"
            );
            return Ok(PlayerCommandResult { story, player });
        }
    };

    let mut engine_record = staged.clone();
    engine_record.contributions.push(contribution.clone());
    let mut records = load_records(ctx.store, command.story_id).await?;
    match records.iter_mut().find(|record| record.key == handle) {
        Some(record) => *record = engine_record,
        None => records.push(engine_record),
    }

    let story = ctx
        .coordinator()
        .apply_with(command.story_id, &records, |story| story.mark_played(&handle))
        .await?;
    let player = match settle_contribution(ctx, &story, &handle, &command.uid, &contribution).await {
        Ok(player) => player,
        Err(e) => {
            warn!(story_id = %command.story_id, error = %e, "contribution left pending");
            let mut player = staged;
            player.settle(story.completed_turns(&handle));
            player
        }
    };

    info!(
        correlation_id = %command.correlation_id(),
        command = command.command_type(),
        story_id = ?command.story_id(),
        turn = story.turn,
        round = story.round,
        "play accepted"
    );
    Ok(PlayerCommandResult { story, player })
}

/// Where a play stands once its contribution is stored.
enum Staged {
    /// Stored as pending; the turn still has to be committed.
    Pending(PlayerPrivateRecord),
    /// An earlier attempt of the same play already committed its turn.
    Replayed(PlayerPrivateRecord),
}

impl Staged {
    fn record(&self) -> &PlayerPrivateRecord {
        match self {
            Self::Pending(record) | Self::Replayed(record) => record,
        }
    }
}

/// Stores `contribution` as the caller's pending contribution. A pending
/// contribution left by an earlier committed play is settled first.
async fn stage_contribution(
    ctx: StoryContext<'_>,
    story: &StoryAggregate,
    view: &PlayerPublicView,
    uid: &str,
    contribution: &Contribution,
) -> Result<Staged, DomainError> {
    let path = player_path(story.id, uid);
    let completed = story.completed_turns(&view.key);
    let prompted = view.my_turn && !view.played;
    for attempt in 1..=ctx.retry.max_attempts {
        let (revision, mut player) = match ctx.store.get(&path).await? {
            Some(doc) => (doc.revision, decode::<PlayerPrivateRecord>(&path, doc.body)?),
            None => (ABSENT_REVISION, PlayerPrivateRecord::new(uid.to_owned(), view)),
        };
        let resubmitted = player.pending.as_ref() == Some(contribution);
        let staged = if player.settle(completed) && resubmitted && !prompted {
            Staged::Replayed(player)
        } else {
            player.pending = Some(contribution.clone());
            Staged::Pending(player)
        };

        match ctx
            .store
            .compare_and_set(&path, revision, encode(staged.record())?)
            .await
        {
            Ok(_) => return Ok(staged),
            Err(DomainError::ConcurrencyConflict { .. }) => {
                debug!(story_id = %story.id, attempt, "private record changed underneath; retrying");
            }
            Err(other) => return Err(other),
        }
    }
    Err(DomainError::RetriesExhausted {
        story_id: story.id,
        attempts: ctx.retry.max_attempts,
    })
}

/// Moves the committed contribution from pending into `contributions`.
async fn settle_contribution(
    ctx: StoryContext<'_>,
    story: &StoryAggregate,
    handle: &str,
    uid: &str,
    contribution: &Contribution,
) -> Result<PlayerPrivateRecord, DomainError> {
    let path = player_path(story.id, uid);
    let completed = story.completed_turns(handle);
    for attempt in 1..=ctx.retry.max_attempts {
        let doc = ctx
            .store
            .get(&path)
            .await?
            .ok_or_else(|| DomainError::PlayerNotFound(uid.to_owned()))?;
        let mut player: PlayerPrivateRecord = decode(&path, doc.body)?;
        if completed <= player.contributions.len() {
            return Ok(player);
        }
        // A concurrent resubmission may have replaced pending with other text.
        if player.pending.as_ref() == Some(contribution) {
            player.pending = None;
        }
        player.contributions.push(contribution.clone());

        match ctx
            .store
            .compare_and_set(&path, doc.revision, encode(&player)?)
            .await
        {
            Ok(_) => return Ok(player),
            Err(DomainError::ConcurrencyConflict { .. }) => {
                debug!(story_id = %story.id, attempt, "private record changed underneath; retrying");
            }
            Err(other) => return Err(other),
        }
    }
    Err(DomainError::RetriesExhausted {
        story_id: story.id,
        attempts: ctx.retry.max_attempts,
    })
}

/// Handles `UpdatePlayer`: changes the caller's display name or color in
/// the story and in their private record. Turn state is untouched.
///
/// # Errors
///
/// Returns `DomainError::Validation` if nothing would change, the new name
/// is blank or the story is closed, and `DomainError::PlayerNotFound` if
/// the caller never joined.
pub async fn handle_update_player(
    command: &UpdatePlayer,
    ctx: StoryContext<'_>,
) -> Result<PlayerCommandResult, DomainError> {
    require_uid(&command.uid)?;
    if command.name.is_none() && command.color.is_none() {
        return Err(DomainError::Validation(
            "update must change name or color".into(),
        ));
    }
    let name = command.name.as_deref().map(str::trim);
    if let Some(name) = name {
        require_text("name", name)?;
    }
    let color = command.color.as_deref();
    let handle = ctx.codec.handle(command.story_id, &command.uid)?;

    let story = ctx
        .coordinator()
        .commit_with(command.story_id, |story| {
            story.update_display(&handle, name, color).map(|_| ())
        })
        .await?;

    let mut partial = Map::new();
    if let Some(name) = name {
        partial.insert("name".into(), Value::from(name));
    }
    if let Some(color) = color {
        partial.insert("color".into(), Value::from(color));
    }
    let path = player_path(command.story_id, &command.uid);
    ctx.store.update(&path, Value::Object(partial)).await?;
    let player = load_record(ctx.store, command.story_id, &command.uid)
        .await?
        .ok_or_else(|| DomainError::PlayerNotFound(command.uid.clone()))?;

    info!(
        correlation_id = %command.correlation_id(),
        command = command.command_type(),
        story_id = ?command.story_id(),
        "player updated"
    );
    Ok(PlayerCommandResult { story, player })
}

/// Handles `CloseStory`: publishes every player's contributions and
/// freezes the story. Closing a closed story succeeds without changes.
///
/// Private records are reloaded whenever the story shows turns they do not
/// account for yet.
///
/// # Errors
///
/// Returns `DomainError::Forbidden` for a non-admin caller and
/// `DomainError::RetriesExhausted` if the records never catch up.
pub async fn handle_close_story(
    command: &CloseStory,
    ctx: StoryContext<'_>,
) -> Result<StoryAggregate, DomainError> {
    require_uid(&command.uid)?;
    let handle = ctx.codec.handle(command.story_id, &command.uid)?;
    let behind = AtomicBool::new(false);

    for attempt in 1..=ctx.retry.max_attempts {
        let records = load_records(ctx.store, command.story_id).await?;
        let result = ctx
            .coordinator()
            .commit_with(command.story_id, |story| {
                if !story.is_admin(&handle) {
                    return Err(forbidden("close the story"));
                }
                if !story.completed && story.outpaces(&records) {
                    behind.store(true, Ordering::SeqCst);
                    return Err(DomainError::Validation(
                        "player records are behind the story".into(),
                    ));
                }
                story.close(&records);
                Ok(())
            })
            .await;

        match result {
            Err(_) if behind.swap(false, Ordering::SeqCst) => {
                debug!(story_id = %command.story_id, attempt, "player records behind story; reloading");
            }
            result => {
                let story = result?;
                info!(
                    correlation_id = %command.correlation_id(),
                    command = command.command_type(),
                    story_id = ?command.story_id(),
                    turns = story.rounds.len(),
                    "story closed"
                );
                return Ok(story);
            }
        }
    }
    Err(DomainError::RetriesExhausted {
        story_id: command.story_id,
        attempts: ctx.retry.max_attempts,
    })
}
