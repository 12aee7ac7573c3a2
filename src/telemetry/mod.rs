//! Telemetry for the batching engine.
//!
//! Structured logging setup, metrics counters, and batch handling spans.

mod logging;
mod metrics;
mod spans;

pub use logging::{init_logging, LogConfig, LogError, LogFormat};
pub use self::metrics::{
    record_batch_emitted, record_handler_failure, record_put_timeout,
};
pub use spans::{BatchSpan, SpanExt};
