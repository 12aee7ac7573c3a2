//! keybatch entry point.
//!
//! ## CLI Subcommands
//!
//! - `keybatch run` - Drive a synthetic load through a batcher group
//! - `keybatch config show` - Effective configuration
//! - `keybatch config defaults` - Built-in defaults
//! - `keybatch version` - Version information

use std::process::ExitCode;

use keybatch::cli::{config_cmd, run_cmd, RunOptions};
use keybatch::config;
use keybatch::telemetry;

#[tokio::main]
async fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();
    let command = args.get(1).map(|s| s.as_str()).unwrap_or("help");

    match command {
        "run" => {
            let code = run(&args[2..]).await;
            ExitCode::from(code as u8)
        }
        "config" => {
            let subcommand = args.get(2).map(|s| s.as_str()).unwrap_or("show");
            match subcommand {
                "show" => {
                    config_cmd::run_show();
                    ExitCode::SUCCESS
                }
                "defaults" => {
                    config_cmd::run_defaults();
                    ExitCode::SUCCESS
                }
                _ => {
                    eprintln!("Unknown config subcommand: {}", subcommand);
                    print_command_help("config");
                    ExitCode::FAILURE
                }
            }
        }
        "help" | "--help" | "-h" => {
            if let Some(subcommand) = args.get(2) {
                print_command_help(subcommand);
            } else {
                print_usage();
            }
            ExitCode::SUCCESS
        }
        "version" | "--version" | "-V" => {
            println!("keybatch {}", env!("CARGO_PKG_VERSION"));
            ExitCode::SUCCESS
        }
        _ => {
            eprintln!("Unknown command: {}", command);
            print_usage();
            ExitCode::FAILURE
        }
    }
}

/// Run the `run` subcommand. Returns 0 on a clean close, 1 if the close
/// timed out or the run failed, 2 on a configuration error.
async fn run(args: &[String]) -> i32 {
    let options = match RunOptions::parse(args) {
        Ok(options) => options,
        Err(e) => {
            eprintln!("{}", e);
            print_command_help("run");
            return 2;
        }
    };

    let env = match &options.config_path {
        Some(path) => match config::load_layered(path) {
            Ok(env) => env,
            Err(e) => {
                eprintln!("{}", e);
                return 2;
            }
        },
        None => config::load(),
    };

    if let Err(e) = telemetry::init_logging(&env.log) {
        eprintln!("Logging disabled: {}", e);
    }

    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    match run_cmd::execute(&options, env.batcher, interrupt).await {
        Ok(summary) => {
            run_cmd::print_summary(&summary, options.json);
            if summary.close_clean {
                0
            } else {
                1
            }
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

fn print_usage() {
    let version = env!("CARGO_PKG_VERSION");
    eprintln!(
        "keybatch - key-sharded batching engine v{}

USAGE:
    keybatch [COMMAND] [OPTIONS]

COMMANDS:
    run          Drive a synthetic load through a batcher group
    config       Show configuration (show, defaults)
    version      Show version information
    help         Show this help message

EXAMPLES:
    keybatch run --items 100000 --keys 256
    keybatch run --fail-every 10 --json
    keybatch config show

ENVIRONMENT:
    KEYBATCH_SHARD_COUNT              Shards in the group (default: 1)
    KEYBATCH_CONCURRENCY              Buckets and workers per shard (default: CPU cores)
    KEYBATCH_MAX_BATCH_SIZE           Items per batch (default: 16)
    KEYBATCH_FLUSH_INTERVAL_MS        Flush tick period (default: 200)
    KEYBATCH_INBOUND_QUEUE_CAPACITY   Items awaiting accumulation (default: 32)
    KEYBATCH_OUTBOUND_QUEUE_CAPACITY  Batches awaiting a handler (default: 32)
    KEYBATCH_PUT_TIMEOUT_MS           Bounded wait in put (default: 10000)
    KEYBATCH_CLOSE_GRACE_MS           Bounded wait in close (default: 5000)
    KEYBATCH_LOG_LEVEL                Log filter (default: info)
    KEYBATCH_LOG_FORMAT               json or pretty (default: json)
    KEYBATCH_LOG_FILE                 Write logs to a file instead of stderr

EXIT CODES:
    0  Success
    1  Failure / close timed out
    2  Configuration error",
        version
    );
}

fn print_command_help(command: &str) {
    match command {
        "run" => {
            eprintln!(
                "keybatch run - Drive a synthetic load

USAGE:
    keybatch run [OPTIONS]

OPTIONS:
    --items <N>        Items to put (default: 10000)
    --keys <K>         Distinct routing keys (default: 64)
    --fail-every <M>   Fail every Mth batch in the handler (default: never)
    --config <PATH>    TOML file, overlaid by KEYBATCH_* variables
    --json             Print statistics as JSON

DESCRIPTION:
    Puts N items with random keys, then closes the group and prints
    per-shard statistics. Ctrl+C stops the producer early; the group is
    still closed and drained.
"
            );
        }
        "config" => {
            eprintln!(
                "keybatch config - Show configuration

USAGE:
    keybatch config <SUBCOMMAND>

SUBCOMMANDS:
    show       Effective configuration (environment over defaults)
    defaults   Built-in defaults
"
            );
        }
        _ => {
            eprintln!("Unknown command: {}", command);
            print_usage();
        }
    }
}
