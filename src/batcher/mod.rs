//! Key-sharded batching engine.
//!
//! A [`BatcherGroup`] owns a fixed set of [`Shard`]s. Each shard runs one
//! accumulation task, which owns the open batches, and a pool of sink workers
//! that feed completed batches to the handler. Bounded queues between the
//! stages provide backpressure.

mod accumulator;
mod group;
mod shard;
mod sink;
mod source;
mod stats;

pub use group::{BatcherGroup, CloseReport, Route};
pub use shard::{CloseResult, Shard, ShardStatus};
pub use stats::{GroupStats, ShardStats};
