//! Accumulation stage: the single task that owns a shard's open batches.
//!
//! Reacts to two events: an item arriving on the inbound queue, and the flush
//! ticker. When the inbound queue closes it force-flushes everything that is
//! still open and then closes the outbound queue so the sink can finish.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::time::{self, Instant, MissedTickBehavior};

use super::accumulator::AccumulationTable;
use super::stats::ShardCounters;
use crate::batch::{Batch, WorkItem};
use crate::config::ShardConfig;
use crate::telemetry;

#[derive(Debug, Clone, Copy)]
enum FlushReason {
    Size,
    Expired,
    Shutdown,
}

impl FlushReason {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Size => "size",
            Self::Expired => "expired",
            Self::Shutdown => "shutdown",
        }
    }
}

pub(super) async fn run_source<T: Send + 'static>(
    shard: usize,
    config: Arc<ShardConfig>,
    mut inbound: mpsc::Receiver<WorkItem<T>>,
    outbound: mpsc::Sender<Batch<T>>,
    counters: Arc<ShardCounters>,
) {
    let mut table = AccumulationTable::new(shard, config.concurrency(), config.max_batch_size());
    let period = config.flush_interval();
    let threshold = config.expiry_threshold();
    let mut ticker = time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            item = inbound.recv() => {
                let Some(WorkItem { key, payload }) = item else {
                    tracing::debug!(shard, "batcher-{shard}'s source channel has been closed");
                    break;
                };
                if let Some(full) = table.push(&key, payload) {
                    emit(shard, &outbound, &counters, full, FlushReason::Size).await;
                }
            }
            _ = ticker.tick() => {
                for batch in table.take_expired(threshold, Instant::now()) {
                    emit(shard, &outbound, &counters, batch, FlushReason::Expired).await;
                }
            }
        }
    }

    let remaining = table.pending_items();
    for batch in table.drain() {
        emit(shard, &outbound, &counters, batch, FlushReason::Shutdown).await;
    }
    drop(outbound);
    tracing::info!(shard, flushed_items = remaining, "batcher-{shard}'s source task has been closed");
}

async fn emit<T>(
    shard: usize,
    outbound: &mpsc::Sender<Batch<T>>,
    counters: &ShardCounters,
    batch: Batch<T>,
    reason: FlushReason,
) {
    let size = batch.len();
    if outbound.send(batch).await.is_err() {
        // Sink workers are gone; nothing can take this batch any more.
        tracing::error!(shard, size, reason = reason.as_str(), "batcher-{shard} dropped a batch: sink closed");
        return;
    }
    counters.record_emitted(size);
    telemetry::record_batch_emitted(shard, size);
    tracing::debug!(shard, size, reason = reason.as_str(), "batch flushed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BatcherGroupConfig;
    use std::time::Duration;

    fn config(max_batch_size: usize, flush_interval_ms: u64) -> Arc<ShardConfig> {
        let raw = BatcherGroupConfig {
            concurrency: 1,
            max_batch_size,
            flush_interval_ms,
            inbound_queue_capacity: 64,
            outbound_queue_capacity: 64,
            ..Default::default()
        };
        Arc::new(raw.normalize().0)
    }

    #[tokio::test(start_paused = true)]
    async fn full_batch_is_emitted_without_waiting_for_tick() {
        let (in_tx, in_rx) = mpsc::channel(64);
        let (out_tx, mut out_rx) = mpsc::channel(64);
        let counters = Arc::new(ShardCounters::default());
        let task = tokio::spawn(run_source(0, config(4, 60_000), in_rx, out_tx, counters.clone()));

        for i in 0..4 {
            in_tx.send(WorkItem::new("k", i)).await.unwrap();
        }
        let batch = out_rx.recv().await.unwrap();
        assert_eq!(batch.into_items(), vec![0, 1, 2, 3]);
        assert_eq!(counters.snapshot(0).batches_emitted, 1);

        drop(in_tx);
        task.await.unwrap();
        assert!(out_rx.recv().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn tick_flushes_aged_batch() {
        let (in_tx, in_rx) = mpsc::channel(64);
        let (out_tx, mut out_rx) = mpsc::channel(64);
        let counters = Arc::new(ShardCounters::default());
        let _task = tokio::spawn(run_source(0, config(16, 200), in_rx, out_tx, counters));

        let start = Instant::now();
        in_tx.send(WorkItem::new("k", "only")).await.unwrap();
        let batch = out_rx.recv().await.unwrap();
        let waited = start.elapsed();

        assert_eq!(batch.items(), &["only"]);
        assert!(waited >= Duration::from_millis(180), "flushed too early: {waited:?}");
        assert!(waited <= Duration::from_millis(220), "flushed too late: {waited:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn closing_inbound_flushes_everything() {
        let (in_tx, in_rx) = mpsc::channel(64);
        let (out_tx, mut out_rx) = mpsc::channel(64);
        let counters = Arc::new(ShardCounters::default());
        let task = tokio::spawn(run_source(0, config(16, 60_000), in_rx, out_tx, counters.clone()));

        for i in 0..5 {
            in_tx.send(WorkItem::new("k", i)).await.unwrap();
        }
        drop(in_tx);
        task.await.unwrap();

        let batch = out_rx.recv().await.unwrap();
        assert_eq!(batch.into_items(), vec![0, 1, 2, 3, 4]);
        assert!(out_rx.recv().await.is_none());
        assert_eq!(counters.snapshot(0).items_emitted, 5);
    }
}
