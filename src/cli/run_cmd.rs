//! `run` subcommand: drive a synthetic load through a batcher group.
//!
//! Items are `u64` sequence numbers routed by a random key drawn from a
//! fixed key space. The handler only counts what it receives, optionally
//! failing every Nth batch to exercise the failure path.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use rand::Rng;
use serde::Serialize;

use crate::batch::Batch;
use crate::batcher::{BatcherGroup, GroupStats};
use crate::config::BatcherGroupConfig;
use crate::error::{HandlerError, LifecycleError};

/// Parsed `run` arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOptions {
    pub items: u64,
    pub keys: u64,
    /// Fail every Nth batch handed to the handler. `None` never fails.
    pub fail_every: Option<u64>,
    pub json: bool,
    pub config_path: Option<PathBuf>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            items: 10_000,
            keys: 64,
            fail_every: None,
            json: false,
            config_path: None,
        }
    }
}

impl RunOptions {
    /// Parse the arguments following `run`.
    pub fn parse(args: &[String]) -> Result<Self, String> {
        let mut options = Self::default();
        let mut i = 0;
        while i < args.len() {
            match args[i].as_str() {
                "--items" => {
                    options.items = parse_value(args, i, "--items")?;
                    i += 2;
                }
                "--keys" => {
                    options.keys = parse_value(args, i, "--keys")?;
                    i += 2;
                }
                "--fail-every" => {
                    let every: u64 = parse_value(args, i, "--fail-every")?;
                    options.fail_every = (every > 0).then_some(every);
                    i += 2;
                }
                "--config" => {
                    let path = args
                        .get(i + 1)
                        .ok_or_else(|| "Missing value for --config".to_string())?;
                    options.config_path = Some(PathBuf::from(path));
                    i += 2;
                }
                "--json" => {
                    options.json = true;
                    i += 1;
                }
                other => return Err(format!("Unknown argument: {}", other)),
            }
        }
        if options.keys == 0 {
            return Err("--keys must be at least 1".to_string());
        }
        Ok(options)
    }
}

fn parse_value(args: &[String], i: usize, flag: &str) -> Result<u64, String> {
    let raw = args
        .get(i + 1)
        .ok_or_else(|| format!("Missing value for {}", flag))?;
    raw.parse()
        .map_err(|_| format!("Invalid value for {}: {}", flag, raw))
}

/// What a run produced.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub accepted: u64,
    pub rejected: u64,
    pub interrupted: bool,
    pub handled_batches: u64,
    pub handled_items: u64,
    pub close_clean: bool,
    pub stats: GroupStats,
}

/// Run the load and close the group. `interrupt` resolving stops the
/// producer early; the group is still closed and drained.
pub async fn execute<F>(
    options: &RunOptions,
    config: BatcherGroupConfig,
    interrupt: F,
) -> Result<RunSummary, LifecycleError>
where
    F: std::future::Future<Output = ()>,
{
    let group: BatcherGroup<u64> = BatcherGroup::new(config);
    let handled_batches = Arc::new(AtomicU64::new(0));
    let handled_items = Arc::new(AtomicU64::new(0));
    let fail_every = options.fail_every;

    let batches = handled_batches.clone();
    let items = handled_items.clone();
    group.start(move |batch: Batch<u64>| {
        let seq = batches.fetch_add(1, Ordering::Relaxed) + 1;
        items.fetch_add(batch.len() as u64, Ordering::Relaxed);
        async move {
            match fail_every {
                Some(every) if seq % every == 0 => Err(HandlerError::new(format!(
                    "synthetic failure on batch {} ({} items)",
                    seq,
                    batch.len()
                ))),
                _ => Ok(()),
            }
        }
    })?;

    let (mut accepted, mut rejected) = (0u64, 0u64);
    let produce = async {
        for seq in 0..options.items {
            let key = format!("key-{}", rand::thread_rng().gen_range(0..options.keys));
            match group.put(key, seq).await {
                Ok(()) => accepted += 1,
                Err(e) => {
                    tracing::warn!(error = %e, shard = e.shard(), "dropping item");
                    rejected += 1;
                }
            }
        }
    };

    let interrupted = tokio::select! {
        _ = produce => false,
        _ = interrupt => {
            tracing::info!("interrupted, closing batcher group");
            true
        }
    };

    let report = group.close().await;
    let stats = group.log_stat();

    Ok(RunSummary {
        accepted,
        rejected,
        interrupted,
        handled_batches: handled_batches.load(Ordering::Relaxed),
        handled_items: handled_items.load(Ordering::Relaxed),
        close_clean: report.is_clean(),
        stats,
    })
}

/// Print a summary as a table or JSON.
pub fn print_summary(summary: &RunSummary, json: bool) {
    if json {
        match serde_json::to_string_pretty(summary) {
            Ok(text) => println!("{}", text),
            Err(e) => eprintln!("Failed to encode summary: {}", e),
        }
        return;
    }

    println!(
        "{:<8} {:>12} {:>12} {:>12} {:>12}",
        "SHARD", "BATCHES", "ITEMS", "FAILURES", "TIMEOUTS"
    );
    println!("{}", "-".repeat(60));
    for shard in &summary.stats.shards {
        println!(
            "{:<8} {:>12} {:>12} {:>12} {:>12}",
            shard.shard,
            shard.batches_emitted,
            shard.items_emitted,
            shard.handler_failures,
            shard.put_timeouts,
        );
    }
    println!("{}", "-".repeat(60));
    println!(
        "accepted {}  |  rejected {}  |  handled {} items in {} batches{}",
        summary.accepted,
        summary.rejected,
        summary.handled_items,
        summary.handled_batches,
        if summary.interrupted { "  |  interrupted" } else { "" },
    );
    if !summary.close_clean {
        println!("close did not drain within the grace period");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_defaults() {
        assert_eq!(RunOptions::parse(&[]).unwrap(), RunOptions::default());
    }

    #[test]
    fn test_parse_all_flags() {
        let options = RunOptions::parse(&args(&[
            "--items", "500", "--keys", "8", "--fail-every", "3", "--json", "--config", "kb.toml",
        ]))
        .unwrap();
        assert_eq!(options.items, 500);
        assert_eq!(options.keys, 8);
        assert_eq!(options.fail_every, Some(3));
        assert!(options.json);
        assert_eq!(options.config_path, Some(PathBuf::from("kb.toml")));
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!(RunOptions::parse(&args(&["--items"])).is_err());
        assert!(RunOptions::parse(&args(&["--items", "many"])).is_err());
        assert!(RunOptions::parse(&args(&["--keys", "0"])).is_err());
        assert!(RunOptions::parse(&args(&["--bogus"])).is_err());
    }

    #[test]
    fn test_fail_every_zero_disables_failures() {
        let options = RunOptions::parse(&args(&["--fail-every", "0"])).unwrap();
        assert_eq!(options.fail_every, None);
    }

    #[tokio::test]
    async fn test_execute_delivers_every_item() {
        let options = RunOptions {
            items: 300,
            keys: 10,
            fail_every: Some(4),
            ..Default::default()
        };
        let config = BatcherGroupConfig {
            shard_count: 3,
            concurrency: 2,
            max_batch_size: 8,
            ..Default::default()
        };
        let summary = execute(&options, config, std::future::pending()).await.unwrap();

        assert!(!summary.interrupted);
        assert!(summary.close_clean);
        assert_eq!(summary.accepted, 300);
        assert_eq!(summary.rejected, 0);
        assert_eq!(summary.handled_items, 300);
        assert_eq!(summary.stats.total_items, 300);
        assert_eq!(summary.stats.total_batches, summary.handled_batches);
        assert_eq!(summary.stats.total_handler_failures, summary.handled_batches / 4);
    }

    #[tokio::test]
    async fn test_execute_stops_on_interrupt() {
        let options = RunOptions {
            items: u64::MAX,
            ..Default::default()
        };
        let interrupt = tokio::time::sleep(std::time::Duration::from_millis(20));
        let summary = execute(&options, BatcherGroupConfig::default(), interrupt)
            .await
            .unwrap();

        assert!(summary.interrupted);
        assert!(summary.close_clean);
        assert_eq!(summary.handled_items, summary.stats.total_items);
    }
}
