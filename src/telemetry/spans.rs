//! Span utilities for batch handling.

use tracing::{info_span, Span};

/// Extension trait for adding context to spans.
pub trait SpanExt {
    /// Record the result of an operation into the span.
    fn record_result<T, E>(&self, result: &Result<T, E>)
    where
        E: std::fmt::Display;
}

impl SpanExt for Span {
    fn record_result<T, E>(&self, result: &Result<T, E>)
    where
        E: std::fmt::Display,
    {
        match result {
            Ok(_) => {
                self.record("status", "ok");
            }
            Err(e) => {
                self.record("status", "error");
                self.record("error.message", e.to_string().as_str());
            }
        }
    }
}

/// Factory for the span wrapped around one handler invocation.
pub struct BatchSpan;

impl BatchSpan {
    /// Fields:
    /// - `shard`, `sub_shard`: where the batch was accumulated
    /// - `size`: number of items
    /// - `age_ms`: time since the first item arrived
    /// - `status`, `error.message`: filled in by `SpanExt::record_result`
    pub fn new(shard: usize, sub_shard: u32, size: usize, age_ms: u64) -> Span {
        info_span!(
            "handle_batch",
            shard = shard,
            sub_shard = sub_shard,
            size = size,
            age_ms = age_ms,
            status = tracing::field::Empty,
            error.message = tracing::field::Empty,
        )
    }
}
