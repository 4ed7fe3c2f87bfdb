//! Application layer for the story context.

pub mod command_handlers;
pub mod coordinator;
pub mod documents;
pub mod query_handlers;
pub mod reconciler;

use cadex_core::store::DocumentStore;

use crate::domain::codec::PrivacyCodec;
use coordinator::{ConsistencyCoordinator, RetryPolicy};

/// Collaborators every command handler needs.
#[derive(Clone, Copy)]
pub struct StoryContext<'a> {
    /// The shared document store.
    pub store: &'a dyn DocumentStore,
    /// Encoder for handles and continuation tokens.
    pub codec: &'a PrivacyCodec,
    /// Retry bound for atomic story updates.
    pub retry: RetryPolicy,
}

impl<'a> StoryContext<'a> {
    /// Creates a context.
    #[must_use]
    pub fn new(store: &'a dyn DocumentStore, codec: &'a PrivacyCodec, retry: RetryPolicy) -> Self {
        Self {
            store,
            codec,
            retry,
        }
    }

    /// A coordinator bound to this context.
    #[must_use]
    pub fn coordinator(&self) -> ConsistencyCoordinator<'a> {
        ConsistencyCoordinator::new(self.store, self.codec, self.retry)
    }
}
