//! Work items, batches and the downstream handler capability.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::error::HandlerError;

/// A payload plus the key used to route it.
#[derive(Debug)]
pub struct WorkItem<T> {
    pub key: String,
    pub payload: T,
}

impl<T> WorkItem<T> {
    pub fn new(key: impl Into<String>, payload: T) -> Self {
        Self { key: key.into(), payload }
    }
}

/// An ordered run of payloads that share a bucket.
///
/// Payloads keep their arrival order. A batch handed to a handler is never
/// empty and never longer than the shard's `max_batch_size`.
#[derive(Debug)]
pub struct Batch<T> {
    created_at: Instant,
    shard: usize,
    sub_shard: u32,
    items: Vec<T>,
}

impl<T> Batch<T> {
    pub(crate) fn with_capacity(shard: usize, sub_shard: u32, capacity: usize) -> Self {
        Self {
            created_at: Instant::now(),
            shard,
            sub_shard,
            items: Vec::with_capacity(capacity),
        }
    }

    /// Append a payload. An empty batch takes its age from its first item.
    pub(crate) fn push(&mut self, payload: T) {
        if self.items.is_empty() {
            self.created_at = Instant::now();
        }
        self.items.push(payload);
    }

    /// When the first item of this batch arrived.
    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// Time since the first item arrived.
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// Shard that produced this batch.
    pub fn shard(&self) -> usize {
        self.shard
    }

    /// Bucket within the shard that produced this batch.
    pub fn sub_shard(&self) -> u32 {
        self.sub_shard
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn into_items(self) -> Vec<T> {
        self.items
    }

    #[cfg(test)]
    pub(crate) fn capacity(&self) -> usize {
        self.items.capacity()
    }
}

impl<T> IntoIterator for Batch<T> {
    type Item = T;
    type IntoIter = std::vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

/// Downstream consumer of completed batches.
///
/// Called once per batch from a sink worker. An error is logged and counted;
/// the batch is not retried.
#[async_trait]
pub trait BatchHandler<T>: Send + Sync {
    async fn handle(&self, batch: Batch<T>) -> Result<(), HandlerError>;
}

#[async_trait]
impl<T, F, Fut> BatchHandler<T> for F
where
    T: Send + 'static,
    F: Fn(Batch<T>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    async fn handle(&self, batch: Batch<T>) -> Result<(), HandlerError> {
        (self)(batch).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_keeps_arrival_order() {
        let mut batch = Batch::with_capacity(0, 2, 4);
        batch.push("a");
        batch.push("b");
        batch.push("c");
        assert_eq!(batch.len(), 3);
        assert_eq!(batch.items(), &["a", "b", "c"]);
        assert_eq!(batch.sub_shard(), 2);
        assert_eq!(batch.into_items(), vec!["a", "b", "c"]);
    }

    #[test]
    fn first_push_restamps_creation_time() {
        let mut batch: Batch<u8> = Batch::with_capacity(0, 0, 1);
        let opened = batch.created_at();
        std::thread::sleep(Duration::from_millis(5));
        batch.push(1);
        assert!(batch.created_at() > opened);
    }

    #[tokio::test]
    async fn closures_are_handlers() {
        let handler = |batch: Batch<u32>| async move {
            if batch.is_empty() {
                Err(HandlerError::new("empty"))
            } else {
                Ok(())
            }
        };

        let mut batch = Batch::with_capacity(0, 0, 2);
        batch.push(1);
        assert!(handler.handle(batch).await.is_ok());
        assert!(handler.handle(Batch::with_capacity(0, 0, 0)).await.is_err());
    }
}
