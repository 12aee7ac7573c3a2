//! Sink stage: a fixed pool of workers draining the outbound queue.
//!
//! Each worker hands one batch at a time to the handler. Failures, including
//! panics, are logged and counted; the batch is not retried. The shard's done
//! token fires only after every worker has exited.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use super::stats::ShardCounters;
use crate::batch::{Batch, BatchHandler};
use crate::error::HandlerError;
use crate::telemetry::{self, BatchSpan, SpanExt};

type SharedReceiver<T> = Arc<Mutex<mpsc::Receiver<Batch<T>>>>;

pub(super) async fn run_sink<T: Send + 'static>(
    shard: usize,
    workers: usize,
    outbound: mpsc::Receiver<Batch<T>>,
    handler: Arc<dyn BatchHandler<T>>,
    counters: Arc<ShardCounters>,
    done: CancellationToken,
) {
    let outbound: SharedReceiver<T> = Arc::new(Mutex::new(outbound));
    let mut pool = JoinSet::new();
    for worker in 0..workers.max(1) {
        pool.spawn(worker_loop(
            shard,
            worker,
            outbound.clone(),
            handler.clone(),
            counters.clone(),
        ));
    }

    while let Some(joined) = pool.join_next().await {
        if let Err(e) = joined {
            tracing::error!(shard, error = %e, "batcher-{shard}'s sink worker aborted");
        }
    }

    done.cancel();
    tracing::info!(shard, "batcher-{shard}'s sink task has been closed");
}

async fn worker_loop<T: Send + 'static>(
    shard: usize,
    worker: usize,
    outbound: SharedReceiver<T>,
    handler: Arc<dyn BatchHandler<T>>,
    counters: Arc<ShardCounters>,
) {
    loop {
        let next = { outbound.lock().await.recv().await };
        let Some(batch) = next else { break };

        let span = BatchSpan::new(
            shard,
            batch.sub_shard(),
            batch.len(),
            batch.age().as_millis() as u64,
        );
        let result = AssertUnwindSafe(handler.handle(batch))
            .catch_unwind()
            .instrument(span.clone())
            .await
            .unwrap_or_else(|_| Err(HandlerError::new("handler panicked")));
        span.record_result(&result);

        if let Err(e) = result {
            counters.record_handler_failure();
            telemetry::record_handler_failure(shard);
            tracing::error!(shard, worker, error = %e, "batcher-{shard} does batch job failed");
        }
    }
    tracing::debug!(shard, worker, "batcher-{shard}'s sink channel has been closed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::batch::Batch;

    fn batch_of(items: Vec<u32>) -> Batch<u32> {
        let mut batch = Batch::with_capacity(0, 0, items.len());
        for item in items {
            batch.push(item);
        }
        batch
    }

    #[tokio::test]
    async fn workers_drain_queue_then_fire_done() {
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_clone = seen.clone();
        let handler: Arc<dyn BatchHandler<u32>> = Arc::new(move |batch: Batch<u32>| {
            let seen = seen_clone.clone();
            async move {
                seen.fetch_add(batch.len(), Ordering::SeqCst);
                Ok::<(), HandlerError>(())
            }
        });

        let (tx, rx) = mpsc::channel(8);
        let done = CancellationToken::new();
        let counters = Arc::new(ShardCounters::default());
        let sink = tokio::spawn(run_sink(0, 3, rx, handler, counters, done.clone()));

        for n in 1..=4 {
            tx.send(batch_of((0..n).collect())).await.unwrap();
        }
        drop(tx);

        sink.await.unwrap();
        assert!(done.is_cancelled());
        assert_eq!(seen.load(Ordering::SeqCst), 1 + 2 + 3 + 4);
    }

    #[tokio::test]
    async fn failures_and_panics_are_counted_not_retried() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        let handler: Arc<dyn BatchHandler<u32>> = Arc::new(move |batch: Batch<u32>| {
            let calls = calls_clone.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                match batch.items()[0] {
                    0 => Err(HandlerError::new("refused")),
                    1 => panic!("handler blew up"),
                    _ => Ok(()),
                }
            }
        });

        let (tx, rx) = mpsc::channel(8);
        let done = CancellationToken::new();
        let counters = Arc::new(ShardCounters::default());
        let sink = tokio::spawn(run_sink(0, 1, rx, handler, counters.clone(), done));

        tx.send(batch_of(vec![0])).await.unwrap();
        tx.send(batch_of(vec![1])).await.unwrap();
        tx.send(batch_of(vec![2])).await.unwrap();
        drop(tx);
        sink.await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(counters.snapshot(0).handler_failures, 2);
    }
}
