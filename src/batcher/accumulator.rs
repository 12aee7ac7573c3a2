//! Per-shard accumulation table.
//!
//! Maps a bucket id to its open batch. Only the shard's accumulation task
//! owns one, so there is no locking here. Deadlines use `tokio::time::Instant`
//! so paused-clock tests see the same ages as production.

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;

use crate::batch::Batch;
use crate::hash;

/// Upper bound on the slots reserved for a fresh batch. Larger batches grow
/// on demand.
const PREALLOC_LIMIT: usize = 64;

pub(crate) struct AccumulationTable<T> {
    shard: usize,
    concurrency: usize,
    max_batch_size: usize,
    open: HashMap<u32, Batch<T>>,
}

impl<T> AccumulationTable<T> {
    pub fn new(shard: usize, concurrency: usize, max_batch_size: usize) -> Self {
        Self {
            shard,
            concurrency: concurrency.max(1),
            max_batch_size: max_batch_size.max(1),
            open: HashMap::with_capacity(concurrency),
        }
    }

    /// Bucket that `key` accumulates into.
    pub fn sub_shard(&self, key: &str) -> u32 {
        hash::route(key, self.concurrency) as u32
    }

    /// Append `payload` to its bucket. Returns the batch if this item filled it.
    ///
    /// A full batch is swapped out for fresh storage, so the returned batch
    /// shares nothing with the one left open.
    pub fn push(&mut self, key: &str, payload: T) -> Option<Batch<T>> {
        let sub_shard = self.sub_shard(key);
        let (shard, max) = (self.shard, self.max_batch_size);
        let reserve = max.min(PREALLOC_LIMIT);
        let batch = self
            .open
            .entry(sub_shard)
            .or_insert_with(|| Batch::with_capacity(shard, sub_shard, reserve));
        batch.push(payload);

        if batch.len() >= max {
            Some(std::mem::replace(batch, Batch::with_capacity(shard, sub_shard, reserve)))
        } else {
            None
        }
    }

    /// Remove and return every non-empty batch older than `threshold`.
    pub fn take_expired(&mut self, threshold: Duration, now: Instant) -> Vec<Batch<T>> {
        let expired: Vec<u32> = self
            .open
            .iter()
            .filter(|(_, batch)| {
                !batch.is_empty() && now.saturating_duration_since(batch.created_at()) > threshold
            })
            .map(|(sub_shard, _)| *sub_shard)
            .collect();

        expired
            .into_iter()
            .filter_map(|sub_shard| self.open.remove(&sub_shard))
            .collect()
    }

    /// Remove and return every non-empty batch regardless of age.
    pub fn drain(&mut self) -> Vec<Batch<T>> {
        self.open
            .drain()
            .map(|(_, batch)| batch)
            .filter(|batch| !batch.is_empty())
            .collect()
    }

    /// Items currently held in open batches.
    pub fn pending_items(&self) -> usize {
        self.open.values().map(Batch::len).sum()
    }
}
