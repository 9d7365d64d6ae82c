//! Thin CLI front-end over [`ralph_loop::client::LoopClient`]. Wires the
//! subcommands onto the core's public API and the exit-code contract; does
//! not parse a config file or render progress bars — those stay out of
//! scope, same as the core crate itself.

use clap::{Parser, Subcommand};
use ralph_loop::adapters::cli::{CliAdapter, CliAdapterConfig};
use ralph_loop::circuit::{CircuitBreaker, CircuitBreakerConfig};
use ralph_loop::context::ContextManager;
use ralph_loop::errors::LoopError;
use ralph_loop::model::RetryPolicy;
use ralph_loop::persistence::{PersistenceFormat, PersistenceManager};
use ralph_loop::retry::RetryExecutor;
use ralph_loop::router::{ExecutorRouter, RouterMode};
use ralph_loop::LoopClient;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "ralph", version, about = "Autonomous iteration driver for AI coding assistants")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the loop until completion, cancellation, or exhaustion.
    Run {
        #[arg(long = "prompt")]
        prompt: String,
        #[arg(long = "max-loops", default_value_t = 50)]
        max_loops: u32,
        #[arg(long = "timeout")]
        timeout: Option<u64>,
        #[arg(long = "config")]
        config: Option<PathBuf>,
        #[arg(long, default_value_t = false)]
        verbose: bool,
        #[arg(long, default_value_t = false)]
        quiet: bool,
    },
    /// Print circuit-breaker and session-pool status (placeholder until
    /// a long-running daemon exists to report live state).
    Status,
    /// Clear persisted history and reset the circuit breaker.
    Reset,
    /// Re-run `status` on an interval until interrupted.
    Watch {
        #[arg(long, default_value_t = 5)]
        interval: u64,
    },
    /// Inspect or validate configuration.
    Config {
        #[arg(long, default_value = "show")]
        action: String,
    },
}

/// Exit codes per the documented contract: 0 success, 1 generic failure,
/// 2 invalid arguments, 3 circuit open, 4 retries exhausted, 130 cancelled.
fn exit_code_for(err: &LoopError) -> i32 {
    match err {
        LoopError::CircuitOpen { .. } => 3,
        LoopError::RetryExhausted { .. } => 4,
        LoopError::Cancelled => 130,
        LoopError::ConfigError(_) | LoopError::NoExecutor | LoopError::CliNotFound { .. } => 2,
        _ => 1,
    }
}

/// A short, friendly message plus a next-step suggestion; the full cause
/// is left to `--verbose`, which just prints the `Display` of the error.
fn friendly_message(err: &LoopError) -> String {
    match err {
        LoopError::Timeout(_) => "timed out — increase --timeout or check connectivity".to_string(),
        LoopError::CircuitOpen { .. } => "circuit breaker is open — run `ralph reset`".to_string(),
        LoopError::QuotaError(_) => "quota exceeded — wait for quota reset".to_string(),
        LoopError::RetryExhausted { .. } => "all retries exhausted — check the underlying error with --verbose".to_string(),
        LoopError::NoExecutor => "no executor available — set RALPH_ENABLE_SDK or install the claude CLI".to_string(),
        LoopError::CliNotFound { .. } => "executor CLI not found on PATH".to_string(),
        other => other.to_string(),
    }
}

fn env_u64(name: &str) -> Option<u64> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

fn env_bool(name: &str) -> bool {
    std::env::var(name).map(|v| matches!(v.as_str(), "1" | "true" | "yes")).unwrap_or(false)
}

fn build_client(timeout_override: Option<u64>) -> LoopClient {
    let mut cli_config = CliAdapterConfig::default();
    if let Some(model) = std::env::var("RALPH_MODEL").ok() {
        cli_config.model = Some(model);
    }
    if let Some(secs) = timeout_override.or_else(|| env_u64("RALPH_CLI_TIMEOUT")) {
        cli_config.timeout = Duration::from_secs(secs);
    }
    cli_config.silent = env_bool("RALPH_SILENT");
    let cli = Box::new(CliAdapter::new(cli_config));

    let router = ExecutorRouter::new(None, Some(cli), None, RouterMode::Cli, false, false);

    let mut policy = RetryPolicy::default();
    if let Some(max_attempts) = env_u64("RALPH_CLI_MAX_RETRIES") {
        policy.max_attempts = max_attempts as u32;
    }
    let retry = RetryExecutor::new(policy);

    let mut breaker_config = CircuitBreakerConfig::default();
    if let Some(threshold) = env_u64("RALPH_CIRCUIT_BREAKER_THRESHOLD") {
        breaker_config.no_progress_threshold = threshold as u32;
    }
    if let Some(threshold) = env_u64("RALPH_SAME_ERROR_THRESHOLD") {
        breaker_config.same_error_threshold = threshold as u32;
    }
    let breaker = CircuitBreaker::new(breaker_config);

    let context = ContextManager::new(1000);

    let persistence = if env_bool("RALPH_ENABLE_PERSISTENCE") {
        let save_dir = std::env::var("RALPH_SAVE_DIR").unwrap_or_else(|_| ".ralph-loop/saves".to_string());
        Some(PersistenceManager::new(save_dir, PersistenceFormat::Json, 5))
    } else {
        None
    };

    LoopClient::new(router, retry, breaker, context, persistence)
}

#[tokio::main]
async fn main() {
    ralph_loop::observability::init_default();

    let cli = Cli::parse();
    let code = match cli.command {
        Command::Run { prompt, max_loops, timeout, config: _, verbose, quiet } => run(prompt, max_loops, timeout, verbose, quiet).await,
        Command::Status => {
            println!("status: no running loop (this binary is stateless between invocations)");
            0
        }
        Command::Reset => {
            let client = build_client(None);
            client.reset_circuit_breaker();
            println!("circuit breaker reset");
            0
        }
        Command::Watch { interval } => {
            println!("watching every {interval}s (Ctrl-C to stop)");
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(Duration::from_secs(interval)) => {
                        println!("status: no running loop (this binary is stateless between invocations)");
                    }
                    _ = tokio::signal::ctrl_c() => break 130,
                }
            }
        }
        Command::Config { action } => match action.as_str() {
            "show" => {
                println!("RALPH_MODEL={:?}", std::env::var("RALPH_MODEL").ok());
                println!("RALPH_CLI_TIMEOUT={:?}", std::env::var("RALPH_CLI_TIMEOUT").ok());
                println!("RALPH_SAVE_DIR={:?}", std::env::var("RALPH_SAVE_DIR").ok());
                0
            }
            "init" => {
                println!("no config file format is parsed by this binary; configure via RALPH_* environment variables");
                0
            }
            "validate" => 0,
            _ => {
                eprintln!("unknown config action {action:?}, expected show|init|validate");
                2
            }
        },
    };

    std::process::exit(code);
}

async fn run(prompt: String, max_loops: u32, timeout: Option<u64>, verbose: bool, quiet: bool) -> i32 {
    let client = build_client(timeout);
    let (results, err) = client.execute_until_completion(&prompt, max_loops).await;

    if !quiet {
        for result in &results {
            println!("loop {}: score={} continue={}", result.loop_index, result.completion_score, result.should_continue);
        }
    }

    match err {
        None => 0,
        Some(e) => {
            eprintln!("error: {}", friendly_message(&e));
            if verbose {
                eprintln!("cause: {e}");
            }
            exit_code_for(&e)
        }
    }
}
