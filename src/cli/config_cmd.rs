//! Config CLI subcommands: show, defaults.
//!
//! Values are printed after normalization, so zero or missing settings show
//! the default the engine would actually run with.

use crate::config::{self, BatcherGroupConfig, ShardConfig};

/// Print the effective config, environment overlaid on defaults.
pub fn run_show() {
    let env = config::load();
    let (cfg, applied) = env.batcher.normalize();
    for line in render(&cfg) {
        println!("{}", line);
    }
    for default in applied {
        eprintln!("# {} not set, using default {}", default.field, default.value);
    }
    println!("KEYBATCH_LOG_LEVEL={}", env.log.level);
}

/// Print the built-in defaults, ignoring the environment.
pub fn run_defaults() {
    let (cfg, _) = BatcherGroupConfig::default().normalize();
    for line in render(&cfg) {
        println!("{}", line);
    }
}

fn render(cfg: &ShardConfig) -> Vec<String> {
    vec![
        format!("KEYBATCH_SHARD_COUNT={}", cfg.shard_count()),
        format!("KEYBATCH_CONCURRENCY={}", cfg.concurrency()),
        format!("KEYBATCH_MAX_BATCH_SIZE={}", cfg.max_batch_size()),
        format!("KEYBATCH_FLUSH_INTERVAL_MS={}", cfg.flush_interval().as_millis()),
        format!("KEYBATCH_INBOUND_QUEUE_CAPACITY={}", cfg.inbound_queue_capacity()),
        format!("KEYBATCH_OUTBOUND_QUEUE_CAPACITY={}", cfg.outbound_queue_capacity()),
        format!("KEYBATCH_PUT_TIMEOUT_MS={}", cfg.put_timeout().as_millis()),
        format!("KEYBATCH_CLOSE_GRACE_MS={}", cfg.close_grace().as_millis()),
    ]
}
