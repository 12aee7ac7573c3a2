//! CLI subcommands for the `keybatch` binary.
//!
//! ```bash
//! keybatch run --items 10000 --keys 64   # Drive a synthetic load
//! keybatch config show                   # Effective configuration
//! keybatch config defaults               # Built-in defaults
//! ```

pub mod config_cmd;
pub mod run_cmd;

pub use run_cmd::{RunOptions, RunSummary};
