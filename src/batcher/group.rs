//! A fixed set of shards behind one routing entry point.

use std::sync::Arc;

use super::shard::{CloseResult, Shard};
use super::stats::GroupStats;
use crate::batch::BatchHandler;
use crate::config::{BatcherGroupConfig, ShardConfig};
use crate::error::{LifecycleError, PutError};
use crate::hash;

/// Where a key lands: which shard, and which bucket inside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Route {
    pub shard: usize,
    pub sub_shard: u32,
}

/// Per-shard outcome of [`BatcherGroup::close`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseReport {
    pub results: Vec<CloseResult>,
}

impl CloseReport {
    /// Returns true if every shard drained inside its grace period.
    pub fn is_clean(&self) -> bool {
        self.results.iter().all(|r| *r == CloseResult::Drained)
    }

    /// Shards whose grace period elapsed before they reported done.
    pub fn timed_out(&self) -> Vec<usize> {
        self.results
            .iter()
            .enumerate()
            .filter(|(_, r)| matches!(r, CloseResult::Timeout { .. }))
            .map(|(shard, _)| shard)
            .collect()
    }
}

/// Routes items by key to one of `shard_count` shards.
///
/// ```ignore
/// let group = BatcherGroup::new(BatcherGroupConfig { shard_count: 4, ..Default::default() });
/// group.start(|batch: Batch<String>| async move {
///     bulk_upsert(batch.into_items()).await.map_err(|e| HandlerError::new(e.to_string()))
/// })?;
/// group.put("user-42", row).await?;
/// group.close().await;
/// ```
pub struct BatcherGroup<T> {
    config: Arc<ShardConfig>,
    shards: Vec<Shard<T>>,
}

impl<T: Send + 'static> BatcherGroup<T> {
    /// Normalize `config` and build the shards. Logs a warning for every
    /// zero field replaced by its default.
    pub fn new(config: BatcherGroupConfig) -> Self {
        let (config, applied) = config.normalize();
        for default in &applied {
            tracing::warn!(
                field = default.field,
                value = default.value,
                "since {} is zero, we set the default value {}",
                default.field,
                default.value
            );
        }
        Self::with_config(config)
    }

    /// Build from an already normalized config.
    pub fn with_config(config: ShardConfig) -> Self {
        let config = Arc::new(config);
        let shards = (0..config.shard_count())
            .map(|id| Shard::new(id, config.clone()))
            .collect();
        Self { config, shards }
    }

    pub fn config(&self) -> &ShardConfig {
        &self.config
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    pub fn shard(&self, id: usize) -> Option<&Shard<T>> {
        self.shards.get(id)
    }

    /// Shard and bucket that `key` routes to under this group's config.
    pub fn route(&self, key: &str) -> Route {
        Route {
            shard: hash::route(key, self.shards.len()),
            sub_shard: hash::route(key, self.config.concurrency()) as u32,
        }
    }

    /// Start every shard with a shared handler. Call exactly once, from
    /// within a Tokio runtime.
    pub fn start<H>(&self, handler: H) -> Result<(), LifecycleError>
    where
        H: BatchHandler<T> + 'static,
    {
        let handler: Arc<dyn BatchHandler<T>> = Arc::new(handler);
        for shard in &self.shards {
            shard.start(handler.clone())?;
        }
        Ok(())
    }

    /// Route `item` to its shard by `key`.
    pub async fn put(&self, key: impl Into<String>, item: T) -> Result<(), PutError<T>> {
        let key = key.into();
        let shard = &self.shards[hash::route(&key, self.shards.len())];
        shard.put(key, item).await
    }

    /// Close every shard in turn, each bounded by the grace period.
    pub async fn close(&self) -> CloseReport {
        let mut results = Vec::with_capacity(self.shards.len());
        for shard in &self.shards {
            results.push(shard.close().await);
        }
        CloseReport { results }
    }

    /// Counters for every shard plus totals. Safe to call while producers run.
    pub fn stat(&self) -> GroupStats {
        GroupStats::from_shards(self.shards.iter().map(Shard::stat).collect())
    }

    /// Log the counters of shards that did any work, then the total.
    pub fn log_stat(&self) -> GroupStats {
        let stats = self.stat();
        for shard in stats.shards.iter().filter(|s| s.batches_emitted > 0) {
            tracing::info!(
                shard = shard.shard,
                batches = shard.batches_emitted,
                items = shard.items_emitted,
                handler_failures = shard.handler_failures,
                "[batcher-{}] processed {} batched requests",
                shard.shard,
                shard.batches_emitted
            );
        }
        if stats.total_batches > 0 {
            tracing::info!(
                batches = stats.total_batches,
                items = stats.total_items,
                "totally processed {} batched requests",
                stats.total_batches
            );
        }
        stats
    }
}
