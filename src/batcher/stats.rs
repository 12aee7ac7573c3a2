//! Batch counters and their snapshots.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Live counters for one shard. Monotonic; updated with atomic increments.
#[derive(Debug, Default)]
pub(crate) struct ShardCounters {
    batches_emitted: AtomicU64,
    items_emitted: AtomicU64,
    handler_failures: AtomicU64,
    put_timeouts: AtomicU64,
}

impl ShardCounters {
    pub fn record_emitted(&self, items: usize) {
        self.batches_emitted.fetch_add(1, Ordering::Relaxed);
        self.items_emitted.fetch_add(items as u64, Ordering::Relaxed);
    }

    pub fn record_handler_failure(&self) {
        self.handler_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_put_timeout(&self) {
        self.put_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self, shard: usize) -> ShardStats {
        ShardStats {
            shard,
            batches_emitted: self.batches_emitted.load(Ordering::Relaxed),
            items_emitted: self.items_emitted.load(Ordering::Relaxed),
            handler_failures: self.handler_failures.load(Ordering::Relaxed),
            put_timeouts: self.put_timeouts.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time counters for one shard.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardStats {
    pub shard: usize,
    pub batches_emitted: u64,
    pub items_emitted: u64,
    pub handler_failures: u64,
    pub put_timeouts: u64,
}

/// Per-shard counters plus totals across the group.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupStats {
    pub shards: Vec<ShardStats>,
    pub total_batches: u64,
    pub total_items: u64,
    pub total_handler_failures: u64,
    pub total_put_timeouts: u64,
}

impl GroupStats {
    pub fn from_shards(shards: Vec<ShardStats>) -> Self {
        let mut stats = Self::default();
        for shard in &shards {
            stats.total_batches += shard.batches_emitted;
            stats.total_items += shard.items_emitted;
            stats.total_handler_failures += shard.handler_failures;
            stats.total_put_timeouts += shard.put_timeouts;
        }
        stats.shards = shards;
        stats
    }
}
