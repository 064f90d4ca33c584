use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use futures::future::join_all;
use rand::Rng;
use serde::Serialize;
use tokio::signal;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use callgate::config::{CallgateConfig, LoggingConfig};
use callgate::error::{ExecuteError, GateError};
use callgate::gate::{RateGate, TimeWindow};

/// Slack added when sleeping until the next window so the reset has fired.
const RESET_SLACK: Duration = Duration::from_millis(50);

/// Drive bursts of simulated outbound calls through a rate gate.
#[derive(Debug, Parser)]
#[command(name = "callgate", version, about)]
struct Args {
    /// Path to a YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the admission limit per window
    #[arg(long)]
    limit: Option<u64>,

    /// Override the window (second, minute, hour, day)
    #[arg(long)]
    window: Option<TimeWindow>,

    /// Concurrent callers per round
    #[arg(long, default_value_t = 20)]
    callers: usize,

    /// Number of rounds, one per window
    #[arg(long, default_value_t = 3)]
    rounds: usize,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,
}

/// Outcome tally for one round of callers.
#[derive(Debug, Default, Serialize)]
struct RoundReport {
    round: usize,
    admitted: usize,
    action_failed: usize,
    rate_limited: usize,
    lock_timeout: usize,
    closed: usize,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = CallgateConfig::load(args.config.as_deref())?;
    if let Some(limit) = args.limit {
        config.gate.limit = limit;
    }
    if let Some(window) = args.window {
        config.gate.window = window;
    }
    if args.json_logs {
        config.logging.json = true;
    }

    init_tracing(&config.logging);

    info!("Starting callgate");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    info!(
        limit = config.gate.limit,
        window = %config.gate.window,
        acquire_timeout_ms = config.gate.acquire_timeout_ms,
        "Configuration loaded"
    );

    let gate = Arc::new(RateGate::from_config(&config.gate)?);

    tokio::select! {
        result = run_rounds(Arc::clone(&gate), &args, config.gate.acquire_timeout()) => result?,
        _ = shutdown_signal() => {}
    }

    gate.shutdown().await;
    info!("callgate stopped");
    Ok(())
}

fn init_tracing(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));

    let subscriber = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true);

    if logging.json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

/// Launch `args.callers` concurrent calls per round and print a JSON tally.
async fn run_rounds(gate: Arc<RateGate>, args: &Args, max_wait: Duration) -> anyhow::Result<()> {
    for round in 1..=args.rounds {
        let calls = (0..args.callers).map(|caller| {
            let gate = Arc::clone(&gate);
            tokio::spawn(async move { gate.execute(max_wait, || simulated_call(caller)).await })
        });

        let mut report = RoundReport {
            round,
            ..Default::default()
        };
        for joined in join_all(calls).await {
            match joined {
                Ok(Ok(_)) => report.admitted += 1,
                Ok(Err(ExecuteError::Action(_))) => {
                    report.admitted += 1;
                    report.action_failed += 1;
                }
                Ok(Err(ExecuteError::Gate(GateError::RateLimited { .. }))) => {
                    report.rate_limited += 1
                }
                Ok(Err(ExecuteError::Gate(GateError::LockTimeout { .. }))) => {
                    report.lock_timeout += 1
                }
                Ok(Err(ExecuteError::Gate(GateError::Closed))) => report.closed += 1,
                Ok(Err(ExecuteError::Gate(err))) => warn!(error = %err, "Unexpected gate error"),
                Err(err) => warn!(error = %err, "Caller task failed"),
            }
        }

        println!("{}", serde_json::to_string(&report)?);

        if round < args.rounds {
            let wait = gate.duration_until_reset().await + RESET_SLACK;
            info!(wait = ?wait, "Waiting for the next window");
            tokio::time::sleep(wait).await;
        }
    }

    Ok(())
}

/// Stand-in for an outbound API call: random latency, occasional failure.
async fn simulated_call(caller: usize) -> Result<Duration, String> {
    let (latency, fails) = {
        let mut rng = rand::thread_rng();
        (Duration::from_millis(rng.gen_range(5..50)), rng.gen_bool(0.05))
    };

    tokio::time::sleep(latency).await;
    debug!(caller = caller, latency = ?latency, "Simulated call finished");

    if fails {
        Err(format!("caller {} received an upstream error", caller))
    } else {
        Ok(latency)
    }
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
