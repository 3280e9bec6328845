//! rest-resilience command line driver.
//!
//! # Architecture Overview
//!
//! ```text
//!     caller ──▶ Guard::call(client, operation, op)
//!                  │
//!                  ├─▶ RateLimiter        token bucket per client
//!                  ├─▶ CircuitBreaker     closed / open / half-open per client
//!                  ├─▶ RetryPolicy        exponential backoff, cancellable
//!                  └─▶ TimeoutManager     adaptive deadline per operation
//!                           │
//!                           ▼
//!                      HttpInvoker ──▶ backend
//! ```
//!
//! `call` pushes a batch of GET requests through the guard and prints a JSON
//! summary; `check-config` validates a config file and prints the effective
//! settings.

use clap::{Parser, Subcommand};
use futures_util::{stream, StreamExt};
use serde::Serialize;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use rest_resilience::config::{load_config, GuardConfig};
use rest_resilience::guard::{ClientStatus, Guard};
use rest_resilience::http::HttpInvoker;
use rest_resilience::lifecycle::signals::wait_for_ctrl_c;
use rest_resilience::observability::{logging, metrics};
use rest_resilience::resilience::{GuardError, TimeoutSnapshot};

#[derive(Parser)]
#[command(name = "rest-resilience")]
#[command(about = "Drive REST calls through rate limiting, circuit breaking, retries and adaptive timeouts", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Issue GET requests to a configured client through the guard
    Call {
        /// Client name from the [clients] table
        #[arg(long)]
        client: String,
        /// Path joined onto the client's base URL
        #[arg(long, default_value = "/")]
        path: String,
        /// Timeout bucket name; defaults to "<client> GET <path>"
        #[arg(long)]
        operation: Option<String>,
        #[arg(short = 'n', long, default_value_t = 1)]
        count: usize,
        #[arg(long, default_value_t = 1)]
        concurrency: usize,
    },
    /// Validate the config file and print the effective settings
    CheckConfig,
}

#[derive(Debug, Default, Serialize)]
struct CallSummary {
    succeeded: usize,
    failed: usize,
    circuit_open: usize,
    rate_limited: usize,
    cancelled: usize,
    last_error: Option<String>,
}

#[derive(Serialize)]
struct Report {
    operation: String,
    outcomes: CallSummary,
    client: ClientStatus,
    timeout: Option<TimeoutSnapshot>,
    timeout_rate: f64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match load_config(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            logging::init_logging(&GuardConfig::default().observability);
            tracing::error!(path = %cli.config.display(), error = %e, "Invalid configuration");
            return Err(e.into());
        }
    };
    logging::init_logging(&config.observability);

    match cli.command {
        Commands::CheckConfig => {
            println!("{}", toml::to_string_pretty(&config)?);
        }
        Commands::Call {
            client,
            path,
            operation,
            count,
            concurrency,
        } => {
            if config.observability.metrics_enabled {
                let addr: SocketAddr = config.observability.metrics_address.parse()?;
                metrics::init_metrics(addr);
            }

            let client_config = config
                .clients
                .get(&client)
                .ok_or_else(|| format!("client '{}' is not configured", client))?;
            let invoker = HttpInvoker::new(client.clone(), client_config)?;
            let guard = Arc::new(Guard::new(&config)?);
            let operation = operation.unwrap_or_else(|| format!("{} GET {}", client, path));

            tokio::spawn({
                let guard = guard.clone();
                async move { wait_for_ctrl_c(guard.shutdown_token()).await }
            });

            let outcomes = run_batch(&guard, &invoker, &client, &operation, &path, count, concurrency).await;
            let report = Report {
                client: guard.client_status(&client),
                timeout: guard.timeout_snapshot(&operation),
                timeout_rate: guard.timeouts().timeout_rate(),
                operation,
                outcomes,
            };
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    Ok(())
}

async fn run_batch(
    guard: &Guard,
    invoker: &HttpInvoker,
    client: &str,
    operation: &str,
    path: &str,
    count: usize,
    concurrency: usize,
) -> CallSummary {
    let results: Vec<_> = stream::iter(0..count)
        .map(|_| guard.call(client, operation, || invoker.get(path)))
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await;

    let mut summary = CallSummary::default();
    for result in results {
        match result {
            Ok(_) => summary.succeeded += 1,
            Err(e) => {
                match &e {
                    GuardError::CircuitOpen(_) => summary.circuit_open += 1,
                    GuardError::RateLimited(_) => summary.rate_limited += 1,
                    GuardError::Cancelled { .. } => summary.cancelled += 1,
                    GuardError::Failed(_) => summary.failed += 1,
                }
                summary.last_error = Some(e.to_string());
            }
        }
    }
    tracing::info!(
        succeeded = summary.succeeded,
        failed = summary.failed,
        circuit_open = summary.circuit_open,
        rate_limited = summary.rate_limited,
        "Batch complete"
    );
    summary
}
