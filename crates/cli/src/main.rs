//! `hooktrack` -- trigger a webhook and track the long-running operation
//! it starts until it completes, fails or times out.
//!
//! # Environment variables
//!
//! | Variable                         | Required | Default                   | Description                              |
//! |----------------------------------|----------|---------------------------|------------------------------------------|
//! | `HOOKTRACK_WEBHOOK_URL`          | trigger  | --                        | Webhook the payload is POSTed to         |
//! | `HOOKTRACK_STATUS_URL_TEMPLATE`  | no       | --                        | Status URL used when the webhook names none |
//! | `HOOKTRACK_API_URL`              | no       | --                        | Execution API base URL                   |
//! | `HOOKTRACK_API_KEY`              | no       | --                        | Execution API key                        |
//! | `HOOKTRACK_API_KEY_HEADER`       | no       | `X-N8N-API-KEY`           | Header carrying the API key              |
//! | `HOOKTRACK_POLL_INTERVAL_MS`     | no       | `2000`                    | Base interval between status checks      |
//! | `HOOKTRACK_POLL_TIMEOUT_SECS`    | no       | `300`                     | Give up after this long                  |
//! | `HOOKTRACK_POLL_MAX_ATTEMPTS`    | no       | --                        | Give up after this many checks           |
//! | `HOOKTRACK_BACKOFF`              | no       | `fixed`                   | `fixed` or `exponential`                 |
//! | `HOOKTRACK_POLL_MAX_INTERVAL_MS` | no       | `30000`                   | Cap for exponential backoff              |
//! | `HOOKTRACK_REQUEST_TIMEOUT_SECS` | no       | `30`                      | Per-request HTTP timeout                 |
//! | `HOOKTRACK_STATE_FILE`           | no       | `.hooktrack/handles.json` | Handle store file                        |
//! | `DATABASE_URL`                   | no       | --                        | Store handles in Postgres instead        |
//!
//! When both `HOOKTRACK_API_URL` and `HOOKTRACK_API_KEY` are set, status
//! checks go to the execution API; otherwise to the status endpoint.

mod cli;
mod commands;
mod config;

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use cli::{Cli, Commands};
use config::TrackerConfig;

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.json);

    let config = match TrackerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "Invalid configuration");
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        }
    };

    let result = match cli.command {
        Commands::Trigger(args) => commands::trigger(args, config).await,
        Commands::Resume(args) => commands::resume(args, config).await,
        Commands::Status(args) => commands::status(args, config).await,
    };

    result.unwrap_or_else(|e| {
        eprintln!("error: {e:#}");
        ExitCode::FAILURE
    })
}

/// Logs go to stderr so stdout carries only results.
fn init_tracing(verbose: u8, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        match verbose {
            0 => "hooktrack=info,hooktrack_client=info,hooktrack_db=info",
            1 => "hooktrack=debug,hooktrack_client=debug,hooktrack_db=debug",
            _ => "trace",
        }
        .into()
    });

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}
