//! The turn reducer.
//!
//! `step` is a pure function of the story, the players' private records and
//! the codec. Each call performs at most one transition:
//!
//! - prompt: the player at `order[round]` is not yet prompted, so they get
//!   `my_turn`;
//! - wait: the prompted player has not played, nothing changes;
//! - advance: the prompted player has played, so their turn is recorded in
//!   `rounds`, the lap position moves on and the next player is prompted
//!   with the played tail as an encrypted continuation.
//!
//! A freshly started story has nobody prompted, so its first `step` is the
//! initial prompt. Calling `step` again on its own output is a no-op.

use super::codec::{CodecError, PrivacyCodec};
use super::story::{PlayerPrivateRecord, StoryAggregate};

/// Applies one transition to `story`. A missing story stays missing.
///
/// # Errors
///
/// Returns a `CodecError` if the continuation token cannot be produced.
pub fn step(
    story: Option<StoryAggregate>,
    records: &[PlayerPrivateRecord],
    codec: &PrivacyCodec,
) -> Result<Option<StoryAggregate>, CodecError> {
    let Some(mut story) = story else {
        return Ok(None);
    };
    advance(&mut story, records, codec)?;
    Ok(Some(story))
}

fn advance(
    story: &mut StoryAggregate,
    records: &[PlayerPrivateRecord],
    codec: &PrivacyCodec,
) -> Result<(), CodecError> {
    if !story.started || story.completed {
        return Ok(());
    }
    let Some(current_key) = story.current_key().map(str::to_owned) else {
        return Ok(());
    };
    let Some(current) = story.players.get_mut(&current_key) else {
        return Ok(());
    };

    if !current.my_turn {
        current.played = false;
        current.my_turn = true;
        return Ok(());
    }
    if !current.played {
        return Ok(());
    }

    // A missing record hands off an empty tail rather than stalling the lap.
    let handoff_tail = records
        .iter()
        .find(|record| record.key == current_key)
        .and_then(PlayerPrivateRecord::latest_tail)
        .unwrap_or_default();
    let continuation = codec.token(story.id, handoff_tail)?;

    current.my_turn = false;
    story.rounds.push(current_key);

    story.round += 1;
    if story.round >= story.order.len() {
        story.round = 0;
        story.turn += 1;
    }

    let next_key = story.order[story.round].clone();
    if let Some(next) = story.players.get_mut(&next_key) {
        next.my_turn = true;
        next.played = false;
        next.continuation = continuation;
    }
    Ok(())
}

/// Number of completed turns a well-formed story must have recorded.
#[must_use]
pub fn expected_rounds(story: &StoryAggregate) -> usize {
    story.turn * story.order.len() + story.round
}

/// Handles whose turn it currently is. At most one while a story is active.
#[must_use]
pub fn prompted(story: &StoryAggregate) -> Vec<&str> {
    story
        .players
        .values()
        .filter(|p| p.my_turn)
        .map(|p| p.key.as_str())
        .collect()
}
