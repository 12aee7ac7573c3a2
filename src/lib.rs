//! keybatch
//!
//! A key-sharded batching engine. Callers push discrete work items with a
//! routing key; the engine groups them into bounded batches and hands each
//! completed batch to a downstream handler once it is full or once it has
//! waited long enough, whichever comes first.
//!
//! # Design
//!
//! - **Sharded**: a [`BatcherGroup`] hashes each key to one [`Shard`], and
//!   within a shard to one bucket. Equal keys always share a bucket, so
//!   per-key arrival order is preserved.
//! - **Single writer**: each shard's open batches are owned by one task and
//!   never locked.
//! - **Bounded**: the inbound item queue and the outbound batch queue are
//!   bounded; `put` waits a bounded time and hands the item back on timeout.
//! - **At most once**: handler failures are logged and counted, never retried.

pub mod batch;
pub mod batcher;
pub mod cli;
pub mod config;
pub mod error;
pub mod hash;
pub mod telemetry;

pub use batch::{Batch, BatchHandler, WorkItem};
pub use batcher::{
    BatcherGroup, CloseReport, CloseResult, GroupStats, Route, Shard, ShardStats, ShardStatus,
};
pub use config::{BatcherGroupConfig, ShardConfig};
pub use error::{HandlerError, LifecycleError, PutError};
