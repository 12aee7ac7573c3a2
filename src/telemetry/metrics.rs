//! Counters published through the `metrics` facade.
//!
//! Nothing is recorded unless the embedding application installs a recorder.

use ::metrics::counter;

/// A batch left the accumulation stage.
pub fn record_batch_emitted(shard: usize, items: usize) {
    counter!("keybatch_batches_emitted_total", "shard" => shard.to_string()).increment(1);
    counter!("keybatch_items_emitted_total", "shard" => shard.to_string())
        .increment(items as u64);
}

/// A handler returned an error for a batch.
pub fn record_handler_failure(shard: usize) {
    counter!("keybatch_handler_failures_total", "shard" => shard.to_string()).increment(1);
}

/// A `put` gave up waiting for inbound capacity.
pub fn record_put_timeout(shard: usize) {
    counter!("keybatch_put_timeouts_total", "shard" => shard.to_string()).increment(1);
}
