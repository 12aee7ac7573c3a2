//! Batcher configuration: raw settings, normalization and loading.
//!
//! Every field of [`BatcherGroupConfig`] is optional. A zero value means "use
//! the default", and each default is applied independently by
//! [`BatcherGroupConfig::normalize`], which returns the immutable
//! [`ShardConfig`] the engine runs with plus the list of substitutions made.
//!
//! Values can come from code, a TOML file, or `KEYBATCH_*` environment
//! variables. Invalid values fall back to defaults without crashing.
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |---|---|---|
//! | `KEYBATCH_SHARD_COUNT` | 1 | Number of shards in the group |
//! | `KEYBATCH_CONCURRENCY` | CPU cores | Buckets and sink workers per shard |
//! | `KEYBATCH_MAX_BATCH_SIZE` | 16 | Items per batch before cutover |
//! | `KEYBATCH_FLUSH_INTERVAL_MS` | 200 | Flush tick period (ms) |
//! | `KEYBATCH_INBOUND_QUEUE_CAPACITY` | 32 | Items awaiting accumulation |
//! | `KEYBATCH_OUTBOUND_QUEUE_CAPACITY` | 32 | Batches awaiting a handler |
//! | `KEYBATCH_PUT_TIMEOUT_MS` | 10000 | Bounded wait in `put` (ms) |
//! | `KEYBATCH_CLOSE_GRACE_MS` | 5000 | Bounded wait in `close` (ms) |
//! | `KEYBATCH_LOG_LEVEL` | info | Level for keybatch, or a full filter directive |
//! | `KEYBATCH_LOG_FORMAT` | json | `json` or `pretty` |
//! | `KEYBATCH_LOG_FILE` | unset | Logs go to this file instead of stderr |

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::telemetry::{LogConfig, LogFormat};

pub const DEFAULT_SHARD_COUNT: usize = 1;
pub const DEFAULT_MAX_BATCH_SIZE: usize = 16;
pub const DEFAULT_FLUSH_INTERVAL_MS: u64 = 200;
pub const DEFAULT_INBOUND_QUEUE_CAPACITY: usize = 32;
pub const DEFAULT_OUTBOUND_QUEUE_CAPACITY: usize = 32;
pub const DEFAULT_PUT_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_CLOSE_GRACE_MS: u64 = 5_000;

/// Share of the flush interval after which an open batch counts as expired.
const EXPIRY_PERCENT: u32 = 90;

/// Default bucket and sink worker count: one per CPU core.
pub fn default_concurrency() -> usize {
    num_cpus::get().max(1)
}

/// Raw batcher group settings. Zero means "use the default".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatcherGroupConfig {
    pub shard_count: usize,
    pub concurrency: usize,
    pub max_batch_size: usize,
    pub flush_interval_ms: u64,
    pub inbound_queue_capacity: usize,
    pub outbound_queue_capacity: usize,
    pub put_timeout_ms: u64,
    pub close_grace_ms: u64,
}

/// A default substituted for a zero field during normalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppliedDefault {
    pub field: &'static str,
    pub value: u64,
}

/// Fully populated, immutable configuration shared by every shard in a group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardConfig {
    shard_count: usize,
    concurrency: usize,
    max_batch_size: usize,
    flush_interval: Duration,
    inbound_queue_capacity: usize,
    outbound_queue_capacity: usize,
    put_timeout: Duration,
    close_grace: Duration,
}

impl BatcherGroupConfig {
    /// Fill every zero field with its default.
    ///
    /// Pure: the raw config is left untouched and the caller decides how to
    /// report the substitutions.
    pub fn normalize(&self) -> (ShardConfig, Vec<AppliedDefault>) {
        let mut applied = Vec::new();
        let mut pick = |field: &'static str, value: u64, default: u64| -> u64 {
            if value == 0 {
                applied.push(AppliedDefault { field, value: default });
                default
            } else {
                value
            }
        };

        let shard_count = pick("shard_count", self.shard_count as u64, DEFAULT_SHARD_COUNT as u64);
        let concurrency = pick("concurrency", self.concurrency as u64, default_concurrency() as u64);
        let max_batch_size = pick(
            "max_batch_size",
            self.max_batch_size as u64,
            DEFAULT_MAX_BATCH_SIZE as u64,
        );
        let flush_interval_ms = pick(
            "flush_interval_ms",
            self.flush_interval_ms,
            DEFAULT_FLUSH_INTERVAL_MS,
        );
        let inbound = pick(
            "inbound_queue_capacity",
            self.inbound_queue_capacity as u64,
            DEFAULT_INBOUND_QUEUE_CAPACITY as u64,
        );
        let outbound = pick(
            "outbound_queue_capacity",
            self.outbound_queue_capacity as u64,
            DEFAULT_OUTBOUND_QUEUE_CAPACITY as u64,
        );
        let put_timeout_ms = pick("put_timeout_ms", self.put_timeout_ms, DEFAULT_PUT_TIMEOUT_MS);
        let close_grace_ms = pick("close_grace_ms", self.close_grace_ms, DEFAULT_CLOSE_GRACE_MS);

        let config = ShardConfig {
            shard_count: shard_count as usize,
            concurrency: concurrency as usize,
            max_batch_size: max_batch_size as usize,
            flush_interval: Duration::from_millis(flush_interval_ms),
            inbound_queue_capacity: inbound as usize,
            outbound_queue_capacity: outbound as usize,
            put_timeout: Duration::from_millis(put_timeout_ms),
            close_grace: Duration::from_millis(close_grace_ms),
        };
        (config, applied)
    }
}

impl ShardConfig {
    pub fn shard_count(&self) -> usize {
        self.shard_count
    }

    /// Buckets per shard, and sink workers per shard.
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    pub fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }

    pub fn flush_interval(&self) -> Duration {
        self.flush_interval
    }

    /// Age past which a tick flushes an open batch (90% of the flush interval).
    pub fn expiry_threshold(&self) -> Duration {
        self.flush_interval * EXPIRY_PERCENT / 100
    }

    pub fn inbound_queue_capacity(&self) -> usize {
        self.inbound_queue_capacity
    }

    pub fn outbound_queue_capacity(&self) -> usize {
        self.outbound_queue_capacity
    }

    pub fn put_timeout(&self) -> Duration {
        self.put_timeout
    }

    pub fn close_grace(&self) -> Duration {
        self.close_grace
    }
}

impl Default for ShardConfig {
    fn default() -> Self {
        BatcherGroupConfig::default().normalize().0
    }
}

/// Errors loading configuration from a file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {reason}")]
    Read { path: String, reason: String },
    #[error("Invalid config file {path}: {reason}")]
    Parse { path: String, reason: String },
}

/// Everything the binary needs: batcher settings plus logging.
#[derive(Debug, Clone)]
pub struct EnvConfig {
    pub batcher: BatcherGroupConfig,
    pub log: LogConfig,
}

/// Parse a `usize` env var, returning `default` on missing or invalid.
fn parse_usize(key: &str, default: usize) -> usize {
    match std::env::var(key) {
        Ok(val) => val.trim().parse::<usize>().unwrap_or(default),
        Err(_) => default,
    }
}

/// Parse a `u64` env var, returning `default` on missing or invalid.
fn parse_u64(key: &str, default: u64) -> u64 {
    match std::env::var(key) {
        Ok(val) => val.trim().parse::<u64>().unwrap_or(default),
        Err(_) => default,
    }
}

/// Overlay `KEYBATCH_*` variables on top of `base`. Unset or invalid
/// variables keep the base value.
fn overlay_env(base: BatcherGroupConfig) -> BatcherGroupConfig {
    BatcherGroupConfig {
        shard_count: parse_usize("KEYBATCH_SHARD_COUNT", base.shard_count),
        concurrency: parse_usize("KEYBATCH_CONCURRENCY", base.concurrency),
        max_batch_size: parse_usize("KEYBATCH_MAX_BATCH_SIZE", base.max_batch_size),
        flush_interval_ms: parse_u64("KEYBATCH_FLUSH_INTERVAL_MS", base.flush_interval_ms),
        inbound_queue_capacity: parse_usize(
            "KEYBATCH_INBOUND_QUEUE_CAPACITY",
            base.inbound_queue_capacity,
        ),
        outbound_queue_capacity: parse_usize(
            "KEYBATCH_OUTBOUND_QUEUE_CAPACITY",
            base.outbound_queue_capacity,
        ),
        put_timeout_ms: parse_u64("KEYBATCH_PUT_TIMEOUT_MS", base.put_timeout_ms),
        close_grace_ms: parse_u64("KEYBATCH_CLOSE_GRACE_MS", base.close_grace_ms),
    }
}

/// Load logging configuration from environment.
fn load_log_config() -> LogConfig {
    let mut log = LogConfig::default();
    if let Ok(level) = std::env::var("KEYBATCH_LOG_LEVEL") {
        if !level.trim().is_empty() {
            log.level = level.trim().to_string();
        }
    }
    if let Ok(format) = std::env::var("KEYBATCH_LOG_FORMAT") {
        match format.trim().to_ascii_lowercase().as_str() {
            "json" => log.format = LogFormat::Json,
            "pretty" => log.format = LogFormat::Pretty,
            _ => {}
        }
    }
    if let Ok(path) = std::env::var("KEYBATCH_LOG_FILE") {
        if !path.trim().is_empty() {
            log.output_path = Some(path.trim().into());
        }
    }
    log
}

/// Load all configuration from environment variables.
///
/// Missing or invalid values stay zero and are defaulted at normalization.
pub fn load() -> EnvConfig {
    EnvConfig {
        batcher: overlay_env(BatcherGroupConfig::default()),
        log: load_log_config(),
    }
}

/// Read batcher settings from a TOML file. Absent keys stay zero.
pub fn load_file(path: &Path) -> Result<BatcherGroupConfig, ConfigError> {
    let display = path.display().to_string();
    let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
        path: display.clone(),
        reason: e.to_string(),
    })?;
    toml::from_str(&text).map_err(|e| ConfigError::Parse {
        path: display,
        reason: e.to_string(),
    })
}

/// File settings with environment variables layered on top.
pub fn load_layered(path: &Path) -> Result<EnvConfig, ConfigError> {
    let file = load_file(path)?;
    Ok(EnvConfig {
        batcher: overlay_env(file),
        log: load_log_config(),
    })
}
