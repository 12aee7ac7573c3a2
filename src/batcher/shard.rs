//! A single shard: bounded inbound queue, accumulation task, sink pool.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::sink::run_sink;
use super::source::run_source;
use super::stats::{ShardCounters, ShardStats};
use crate::batch::{BatchHandler, WorkItem};
use crate::config::ShardConfig;
use crate::error::{LifecycleError, PutError};
use crate::telemetry;

/// Lifecycle of a shard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShardStatus {
    Idle,
    Running,
    Closed,
}

/// Outcome of closing a shard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseResult {
    /// Every open batch was flushed and every sink worker exited.
    Drained,
    /// The grace period elapsed first. Flushing may still finish in the background.
    Timeout { waited: Duration },
}

enum Slot<T> {
    Idle,
    Running(mpsc::Sender<WorkItem<T>>),
    Closed,
}

/// One partition of the key space.
///
/// `put` may be called from many tasks at once. The open batches themselves
/// live inside the accumulation task and are never shared.
pub struct Shard<T> {
    id: usize,
    config: Arc<ShardConfig>,
    slot: Mutex<Slot<T>>,
    counters: Arc<ShardCounters>,
    done: CancellationToken,
}

impl<T: Send + 'static> Shard<T> {
    pub fn new(id: usize, config: Arc<ShardConfig>) -> Self {
        Self {
            id,
            config,
            slot: Mutex::new(Slot::Idle),
            counters: Arc::new(ShardCounters::default()),
            done: CancellationToken::new(),
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn status(&self) -> ShardStatus {
        match *self.slot.lock() {
            Slot::Idle => ShardStatus::Idle,
            Slot::Running(_) => ShardStatus::Running,
            Slot::Closed => ShardStatus::Closed,
        }
    }

    /// Spawn the accumulation task and the sink pool onto the current Tokio runtime.
    pub fn start(&self, handler: Arc<dyn BatchHandler<T>>) -> Result<(), LifecycleError> {
        let mut slot = self.slot.lock();
        match *slot {
            Slot::Running(_) => return Err(LifecycleError::AlreadyStarted { shard: self.id }),
            Slot::Closed => return Err(LifecycleError::Closed { shard: self.id }),
            Slot::Idle => {}
        }
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_| LifecycleError::NoRuntime { shard: self.id })?;

        let (inbound_tx, inbound_rx) = mpsc::channel(self.config.inbound_queue_capacity());
        let (outbound_tx, outbound_rx) = mpsc::channel(self.config.outbound_queue_capacity());

        runtime.spawn(run_source(
            self.id,
            self.config.clone(),
            inbound_rx,
            outbound_tx,
            self.counters.clone(),
        ));
        runtime.spawn(run_sink(
            self.id,
            self.config.concurrency(),
            outbound_rx,
            handler,
            self.counters.clone(),
            self.done.clone(),
        ));

        *slot = Slot::Running(inbound_tx);
        tracing::info!(shard = self.id, "start batcher-{}", self.id);
        Ok(())
    }

    /// Hand an item to this shard, waiting at most the put timeout for room.
    ///
    /// On failure the item comes back inside the error.
    pub async fn put(&self, key: String, item: T) -> Result<(), PutError<T>> {
        let sender = {
            let slot = self.slot.lock();
            match &*slot {
                Slot::Running(tx) => tx.clone(),
                Slot::Idle => return Err(PutError::NotStarted { shard: self.id, item }),
                Slot::Closed => return Err(PutError::Closing { shard: self.id, item }),
            }
        };

        let waited = self.config.put_timeout();
        let reserved = tokio::time::timeout(waited, sender.reserve()).await;
        match reserved {
            Ok(Ok(permit)) => {
                permit.send(WorkItem { key, payload: item });
                Ok(())
            }
            Ok(Err(_)) => Err(PutError::Closing { shard: self.id, item }),
            Err(_) => {
                self.counters.record_put_timeout();
                telemetry::record_put_timeout(self.id);
                tracing::warn!(shard = self.id, "timeout to put item for batcher-{}", self.id);
                Err(PutError::Timeout { shard: self.id, waited, item })
            }
        }
    }

    /// Stop accepting items and wait, up to the grace period, for the final drain.
    ///
    /// Best effort: on timeout the shard keeps flushing in the background.
    /// Calling it again after a drain returns immediately.
    pub async fn close(&self) -> CloseResult {
        let previous = std::mem::replace(&mut *self.slot.lock(), Slot::Closed);
        match previous {
            // Nothing was ever spawned, so there is nothing to drain.
            Slot::Idle => self.done.cancel(),
            Slot::Running(tx) => drop(tx),
            Slot::Closed => {}
        }

        let grace = self.config.close_grace();
        match tokio::time::timeout(grace, self.done.cancelled()).await {
            Ok(()) => {
                tracing::info!(shard = self.id, "batcher-{} has done", self.id);
                CloseResult::Drained
            }
            Err(_) => {
                tracing::warn!(shard = self.id, "timeout to close batcher-{}", self.id);
                CloseResult::Timeout { waited: grace }
            }
        }
    }

    /// Returns true once every sink worker has exited.
    pub fn is_drained(&self) -> bool {
        self.done.is_cancelled()
    }

    pub fn stat(&self) -> ShardStats {
        self.counters.snapshot(self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::Batch;
    use crate::config::BatcherGroupConfig;
    use crate::error::HandlerError;

    fn shard(put_timeout_ms: u64) -> Shard<u32> {
        let raw = BatcherGroupConfig {
            concurrency: 2,
            max_batch_size: 4,
            flush_interval_ms: 60_000,
            put_timeout_ms,
            close_grace_ms: 1_000,
            ..Default::default()
        };
        Shard::new(0, Arc::new(raw.normalize().0))
    }

    fn noop() -> Arc<dyn BatchHandler<u32>> {
        Arc::new(|_batch: Batch<u32>| async { Ok::<(), HandlerError>(()) })
    }

    #[tokio::test]
    async fn put_before_start_returns_item() {
        let shard = shard(100);
        let err = shard.put("k".into(), 7).await.unwrap_err();
        assert!(matches!(err, PutError::NotStarted { shard: 0, .. }));
        assert_eq!(err.into_item(), 7);
    }

    #[tokio::test]
    async fn start_twice_is_rejected() {
        let shard = shard(100);
        shard.start(noop()).unwrap();
        assert_eq!(shard.status(), ShardStatus::Running);
        assert_eq!(
            shard.start(noop()),
            Err(LifecycleError::AlreadyStarted { shard: 0 })
        );
        assert_eq!(shard.close().await, CloseResult::Drained);
    }

    #[tokio::test]
    async fn put_after_close_is_rejected() {
        let shard = shard(100);
        shard.start(noop()).unwrap();
        shard.put("k".into(), 1).await.unwrap();
        assert_eq!(shard.close().await, CloseResult::Drained);
        assert_eq!(shard.status(), ShardStatus::Closed);

        let err = shard.put("k".into(), 2).await.unwrap_err();
        assert!(matches!(err, PutError::Closing { .. }));
        assert_eq!(shard.start(noop()), Err(LifecycleError::Closed { shard: 0 }));
    }

    #[tokio::test]
    async fn close_idle_shard_is_immediate() {
        let shard = shard(100);
        assert_eq!(shard.close().await, CloseResult::Drained);
        assert!(shard.is_drained());
    }

    #[tokio::test]
    async fn close_flushes_open_batches() {
        let shard = shard(100);
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let handler: Arc<dyn BatchHandler<u32>> = Arc::new(move |batch: Batch<u32>| {
            let tx = tx.clone();
            async move {
                let _ = tx.send(batch.into_items());
                Ok::<(), HandlerError>(())
            }
        });
        shard.start(handler).unwrap();
        for i in 0..3 {
            shard.put("same".into(), i).await.unwrap();
        }

        assert_eq!(shard.close().await, CloseResult::Drained);
        assert_eq!(rx.recv().await, Some(vec![0, 1, 2]));
        assert_eq!(shard.stat().batches_emitted, 1);
        assert_eq!(shard.stat().items_emitted, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn put_on_full_queue_times_out_with_item() {
        let raw = BatcherGroupConfig {
            concurrency: 1,
            max_batch_size: 1,
            inbound_queue_capacity: 1,
            outbound_queue_capacity: 1,
            put_timeout_ms: 100,
            close_grace_ms: 10,
            ..Default::default()
        };
        let shard = Shard::new(0, Arc::new(raw.normalize().0));
        let stuck: Arc<dyn BatchHandler<u32>> = Arc::new(|_batch: Batch<u32>| async {
            std::future::pending::<()>().await;
            Ok::<(), HandlerError>(())
        });
        shard.start(stuck).unwrap();

        let mut failed = None;
        for i in 0..10 {
            if let Err(err) = shard.put("k".into(), i).await {
                failed = Some(err);
                break;
            }
        }
        let err = failed.expect("queues should fill up");
        assert!(matches!(
            err,
            PutError::Timeout { shard: 0, waited, .. } if waited == Duration::from_millis(100)
        ));
        assert_eq!(err.into_item(), 4);
        assert_eq!(shard.stat().put_timeouts, 1);
    }

    #[test]
    fn start_outside_runtime_fails() {
        let shard = shard(100);
        assert_eq!(shard.start(noop()), Err(LifecycleError::NoRuntime { shard: 0 }));
        assert_eq!(shard.status(), ShardStatus::Idle);
    }
}
