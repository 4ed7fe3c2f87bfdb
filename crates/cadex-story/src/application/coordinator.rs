//! Atomic application of story transitions.
//!
//! Every change to a story document goes through a read, transition and
//! compare-and-set cycle. Losing the compare-and-set to a concurrent writer
//! restarts the whole cycle from a fresh read, so two callers can never
//! both extend the same state. The number of cycles is bounded by
//! `RetryPolicy::max_attempts`.

use cadex_core::error::DomainError;
use cadex_core::store::DocumentStore;
use tracing::{debug, warn};
use uuid::Uuid;

use super::documents::{decode, encode, story_path};
use crate::domain::codec::PrivacyCodec;
use crate::domain::engine;
use crate::domain::story::{PlayerPrivateRecord, StoryAggregate};

/// Default bound on read-step-write cycles per command.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 25;

/// Bounds the retry loop of the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of read-step-write cycles before giving up.
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

/// Commits story transitions with compare-and-set and bounded retry.
pub struct ConsistencyCoordinator<'a> {
    store: &'a dyn DocumentStore,
    codec: &'a PrivacyCodec,
    policy: RetryPolicy,
}

impl<'a> ConsistencyCoordinator<'a> {
    /// Creates a coordinator over `store`.
    #[must_use]
    pub fn new(store: &'a dyn DocumentStore, codec: &'a PrivacyCodec, policy: RetryPolicy) -> Self {
        Self {
            store,
            codec,
            policy,
        }
    }

    /// Runs the turn engine once against the committed story.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::AggregateNotFound` for an unknown story and
    /// `DomainError::RetriesExhausted` if every attempt lost a race.
    pub async fn apply(
        &self,
        story_id: Uuid,
        records: &[PlayerPrivateRecord],
    ) -> Result<StoryAggregate, DomainError> {
        self.apply_with(story_id, records, |_| Ok(())).await
    }

    /// Applies `mutate` and then one engine step, atomically.
    ///
    /// `mutate` runs once per attempt against a freshly read story; an error
    /// from it aborts the cycle without writing anything.
    ///
    /// # Errors
    ///
    /// Propagates errors from `mutate`, plus those of [`Self::apply`].
    pub async fn apply_with<F>(
        &self,
        story_id: Uuid,
        records: &[PlayerPrivateRecord],
        mutate: F,
    ) -> Result<StoryAggregate, DomainError>
    where
        F: Fn(&mut StoryAggregate) -> Result<(), DomainError> + Send + Sync,
    {
        let codec = self.codec;
        self.run(story_id, |mut story| {
            mutate(&mut story)?;
            engine::step(Some(story), records, codec)?
                .ok_or(DomainError::AggregateNotFound(story_id))
        })
        .await
    }

    /// Applies `mutate` atomically without stepping the engine. Used for
    /// changes that cannot affect turn progression.
    ///
    /// # Errors
    ///
    /// Propagates errors from `mutate`, plus those of [`Self::apply`].
    pub async fn commit_with<F>(&self, story_id: Uuid, mutate: F) -> Result<StoryAggregate, DomainError>
    where
        F: Fn(&mut StoryAggregate) -> Result<(), DomainError> + Send + Sync,
    {
        self.run(story_id, |mut story| {
            mutate(&mut story)?;
            Ok(story)
        })
        .await
    }

    async fn run<F>(&self, story_id: Uuid, transition: F) -> Result<StoryAggregate, DomainError>
    where
        F: Fn(StoryAggregate) -> Result<StoryAggregate, DomainError> + Send + Sync,
    {
        let path = story_path(story_id);
        for attempt in 1..=self.policy.max_attempts {
            let doc = self
                .store
                .get(&path)
                .await?
                .ok_or(DomainError::AggregateNotFound(story_id))?;
            let current: StoryAggregate = decode(&path, doc.body)?;
            let next = transition(current.clone())?;
            if next == current {
                return Ok(next);
            }

            match self
                .store
                .compare_and_set(&path, doc.revision, encode(&next)?)
                .await
            {
                Ok(revision) => {
                    debug!(%story_id, revision, attempt, "story transition committed");
                    return Ok(next);
                }
                Err(DomainError::ConcurrencyConflict { expected, actual, .. }) => {
                    debug!(%story_id, attempt, expected, actual, "lost story race; retrying");
                }
                Err(other) => return Err(other),
            }
        }

        warn!(%story_id, attempts = self.policy.max_attempts, "story contended; giving up");
        Err(DomainError::RetriesExhausted {
            story_id,
            attempts: self.policy.max_attempts,
        })
    }
}
