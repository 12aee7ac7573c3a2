//! Error types for the batching engine.
//!
//! A failed `put` hands the payload back to the caller; nothing else in the
//! engine is fatal. Handler failures are logged and counted, never retried.

use std::time::Duration;

use thiserror::Error;

/// Failure to hand an item to a shard. Carries the item back to the caller.
#[derive(Debug, Error)]
pub enum PutError<T> {
    #[error("timeout to put item for batcher-{shard} after {}ms", waited.as_millis())]
    Timeout { shard: usize, waited: Duration, item: T },

    #[error("batcher-{shard} is closing")]
    Closing { shard: usize, item: T },

    #[error("batcher-{shard} has not been started")]
    NotStarted { shard: usize, item: T },
}

impl<T> PutError<T> {
    /// Recover the rejected item.
    pub fn into_item(self) -> T {
        match self {
            Self::Timeout { item, .. } | Self::Closing { item, .. } | Self::NotStarted { item, .. } => {
                item
            }
        }
    }

    /// Shard that rejected the item.
    pub fn shard(&self) -> usize {
        match self {
            Self::Timeout { shard, .. } | Self::Closing { shard, .. } | Self::NotStarted { shard, .. } => {
                *shard
            }
        }
    }

    /// Returns true if the shard's inbound queue stayed full past the put timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// Error returned by a [`BatchHandler`](crate::batch::BatchHandler).
///
/// The batch is consumed regardless; the engine only logs and counts it.
#[derive(Debug, Error)]
#[error("batch handler failed: {message}")]
pub struct HandlerError {
    message: String,
}

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<String> for HandlerError {
    fn from(message: String) -> Self {
        Self { message }
    }
}

impl From<&str> for HandlerError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

/// Invalid lifecycle transition.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LifecycleError {
    #[error("batcher-{shard} already started")]
    AlreadyStarted { shard: usize },

    #[error("batcher-{shard} is closed")]
    Closed { shard: usize },

    #[error("batcher-{shard} must be started from within a Tokio runtime")]
    NoRuntime { shard: usize },
}
