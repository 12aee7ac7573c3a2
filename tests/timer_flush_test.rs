//! Timer-driven flush tests. The clock is paused so timings are exact.

use std::time::Duration;

use keybatch::{Batch, BatcherGroup, BatcherGroupConfig, HandlerError};
use tokio::sync::mpsc;
use tokio::time::Instant;

type Deliveries = mpsc::UnboundedReceiver<(Instant, Vec<u32>)>;

fn timed_group(flush_interval_ms: u64) -> (BatcherGroup<u32>, Deliveries) {
    let group = BatcherGroup::new(BatcherGroupConfig {
        concurrency: 2,
        max_batch_size: 16,
        flush_interval_ms,
        ..Default::default()
    });
    let (tx, rx) = mpsc::unbounded_channel();
    group
        .start(move |batch: Batch<u32>| {
            let _ = tx.send((Instant::now(), batch.into_items()));
            async { Ok::<(), HandlerError>(()) }
        })
        .unwrap();
    (group, rx)
}

#[tokio::test(start_paused = true)]
async fn test_single_item_flushed_by_timer() {
    let (group, mut rx) = timed_group(200);
    let started = Instant::now();
    group.put("lonely", 7).await.unwrap();

    let (delivered_at, items) = rx.recv().await.unwrap();
    let waited = delivered_at - started;
    assert_eq!(items, vec![7]);
    assert!(
        waited >= Duration::from_millis(180) && waited <= Duration::from_millis(220),
        "flushed after {:?}",
        waited
    );
    group.close().await;
}

#[tokio::test(start_paused = true)]
async fn test_young_batch_waits_for_next_tick() {
    let (group, mut rx) = timed_group(200);
    let started = Instant::now();

    // Arrives 150ms into the first period, so it is too young at the first tick.
    tokio::time::sleep(Duration::from_millis(150)).await;
    group.put("late", 1).await.unwrap();

    let (delivered_at, items) = rx.recv().await.unwrap();
    assert_eq!(items, vec![1]);
    let waited = delivered_at - started;
    assert!(
        waited >= Duration::from_millis(380) && waited <= Duration::from_millis(420),
        "flushed after {:?}",
        waited
    );
    group.close().await;
}

#[tokio::test(start_paused = true)]
async fn test_timer_flushes_every_open_bucket() {
    let (group, mut rx) = timed_group(100);
    for i in 0..10 {
        group.put(format!("key-{}", i), i).await.unwrap();
    }

    let mut seen = Vec::new();
    while seen.len() < 10 {
        let (_, items) = rx.recv().await.unwrap();
        assert!(items.len() <= 16);
        seen.extend(items);
    }
    seen.sort_unstable();
    assert_eq!(seen, (0..10).collect::<Vec<_>>());
    assert_eq!(group.stat().total_items, 10);
    group.close().await;
}
