//! Shared application state.

use std::sync::{Arc, Mutex};

use cadex_core::rng::DeterministicRng;
use cadex_core::store::DocumentStore;
use cadex_story::application::StoryContext;
use cadex_story::application::coordinator::RetryPolicy;
use cadex_story::domain::codec::PrivacyCodec;

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// The document store holding stories and private records.
    pub store: Arc<dyn DocumentStore>,
    /// Encoder for handles and continuation tokens.
    pub codec: Arc<PrivacyCodec>,
    /// RNG used to shuffle the turn order.
    pub rng: Arc<Mutex<dyn DeterministicRng + Send>>,
    /// Retry bound for atomic story updates.
    pub retry: RetryPolicy,
}

impl AppState {
    /// Create new application state.
    #[must_use]
    pub fn new(
        store: Arc<dyn DocumentStore>,
        codec: Arc<PrivacyCodec>,
        rng: Arc<Mutex<dyn DeterministicRng + Send>>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            store,
            codec,
            rng,
            retry,
        }
    }

    /// Handler context borrowing this state.
    #[must_use]
    pub fn story_context(&self) -> StoryContext<'_> {
        StoryContext::new(self.store.as_ref(), self.codec.as_ref(), self.retry)
    }
}
