//! Scripted model for tests and offline runs.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tabletalk_core::{LanguageModel, ModelError};

/// Replays a fixed sequence of replies, then repeats the last one.
pub struct MockModel {
    replies: Vec<String>,
    next: AtomicUsize,
}

impl MockModel {
    pub fn new(replies: Vec<String>) -> Self {
        Self {
            replies,
            next: AtomicUsize::new(0),
        }
    }

    pub fn always(reply: &str) -> Self {
        Self::new(vec![reply.to_string()])
    }

    /// How many completions have been requested so far.
    pub fn calls(&self) -> usize {
        self.next.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LanguageModel for MockModel {
    async fn complete(&self, _prompt: &str, _timeout: Duration) -> Result<String, ModelError> {
        let idx = self.next.fetch_add(1, Ordering::SeqCst);
        self.replies
            .get(idx)
            .or_else(|| self.replies.last())
            .cloned()
            .ok_or_else(|| ModelError::Api("mock model has no replies".to_string()))
    }
}
