//! Subcommand implementations.

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use hooktrack_client::api::{Attachment, OperationRequest, WebhookApi};
use hooktrack_client::endpoint::EndpointFetcher;
use hooktrack_client::fetcher::StatusFetcher;
use hooktrack_client::resource::ExecutionFetcher;
use hooktrack_client::store::{FileHandleStore, HandleStore};
use hooktrack_client::tracker::Tracker;
use hooktrack_core::error::{PollError, PollErrorKind};
use hooktrack_core::polling::PollingConfig;
use hooktrack_core::types::OperationHandle;
use serde_json::{json, Value};
use tokio::io::AsyncReadExt;

use crate::cli::{parse_attachment_spec, ResumeArgs, StatusArgs, TriggerArgs};
use crate::config::TrackerConfig;

/// Process exit code for a tracking outcome.
pub fn exit_code(outcome: &Result<Value, PollError>) -> u8 {
    match outcome {
        Ok(_) => 0,
        Err(e) => match e.kind() {
            PollErrorKind::TimedOut | PollErrorKind::AttemptsExceeded => 2,
            PollErrorKind::Cancelled => 130,
            PollErrorKind::InvalidRequest
            | PollErrorKind::Transport
            | PollErrorKind::Remote
            | PollErrorKind::MissingWiring => 1,
        },
    }
}

pub async fn trigger(args: TriggerArgs, config: TrackerConfig) -> Result<ExitCode> {
    let webhook_url = args
        .webhook_url
        .clone()
        .or_else(|| config.webhook_url.clone())
        .context("no webhook URL: pass --webhook-url or set HOOKTRACK_WEBHOOK_URL")?;

    let payload = read_payload(args.payload.as_deref()).await?;
    let mut request = OperationRequest::new(payload);
    for spec in &args.attachments {
        request = request.with_attachment(read_attachment(spec).await?);
    }

    let polling = args.polling.apply(config.polling.clone());
    let tracker = Arc::new(build_tracker(&config, webhook_url, polling).await?);
    let _guard = cancel_on_ctrl_c(Arc::clone(&tracker));

    let outcome = tracker.trigger(&request).await;
    Ok(report(&outcome))
}

pub async fn resume(args: ResumeArgs, config: TrackerConfig) -> Result<ExitCode> {
    let polling = args.polling.apply(config.polling.clone());
    let webhook_url = config.webhook_url.clone().unwrap_or_default();
    let tracker = Arc::new(build_tracker(&config, webhook_url, polling).await?);
    let _guard = cancel_on_ctrl_c(Arc::clone(&tracker));

    if !args.all {
        let Some((operation_id, outcome)) = tracker.resume_latest().await? else {
            tracing::info!("No pending operations to resume");
            return Ok(ExitCode::SUCCESS);
        };
        tracing::info!(operation_id = %operation_id, "Resumed operation finished");
        return Ok(report(&outcome));
    }

    let outcomes = tracker.resume_all().await?;
    if outcomes.is_empty() {
        tracing::info!("No pending operations to resume");
        return Ok(ExitCode::SUCCESS);
    }

    let mut code = 0;
    for (operation_id, outcome) in &outcomes {
        match outcome {
            Ok(result) => println!("{}", json!({ "operationId": operation_id, "result": result })),
            Err(e) => tracing::error!(operation_id = %operation_id, error = %e, "Operation did not complete"),
        }
        // The first failure decides the exit code.
        if code == 0 {
            code = exit_code(outcome);
        }
    }
    Ok(ExitCode::from(code))
}

pub async fn status(args: StatusArgs, config: TrackerConfig) -> Result<ExitCode> {
    let client = http_client(&config)?;
    let fetcher = build_fetcher(&config, client);

    let mut handle = OperationHandle::new(args.operation_id);
    if let Some(location) = args.status_url {
        handle = handle.with_status_location(location);
    }

    fetcher.check_wiring(&handle)?;
    let record = fetcher.fetch(&handle).await?;
    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(ExitCode::SUCCESS)
}

// ---- private helpers ----

fn http_client(config: &TrackerConfig) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(config.request_timeout)
        .build()
        .context("failed to build HTTP client")
}

fn build_fetcher(config: &TrackerConfig, client: reqwest::Client) -> Arc<dyn StatusFetcher> {
    if config.uses_execution_api() {
        let api_url = config.api_url.clone().unwrap_or_default();
        tracing::debug!(api_url = %api_url, "Using execution API status fetcher");
        Arc::new(
            ExecutionFetcher::with_client(client, api_url, config.api_key.clone())
                .with_api_key_header(config.api_key_header.clone()),
        )
    } else {
        tracing::debug!("Using status endpoint fetcher");
        let fetcher = EndpointFetcher::with_client(client);
        match &config.status_url_template {
            Some(template) => Arc::new(fetcher.with_template(template.clone())),
            None => Arc::new(fetcher),
        }
    }
}

async fn build_store(config: &TrackerConfig) -> Result<Arc<dyn HandleStore>> {
    if let Some(database_url) = &config.database_url {
        let pool = hooktrack_db::create_pool(database_url)
            .await
            .context("failed to connect to DATABASE_URL")?;
        hooktrack_db::run_migrations(&pool).await?;
        tracing::debug!("Persisting handles in Postgres");
        return Ok(Arc::new(hooktrack_db::PgHandleStore::new(pool)));
    }
    tracing::debug!(path = %config.state_file.display(), "Persisting handles in file");
    Ok(Arc::new(FileHandleStore::new(&config.state_file)))
}

async fn build_tracker(
    config: &TrackerConfig,
    webhook_url: String,
    polling: PollingConfig,
) -> Result<Tracker> {
    let client = http_client(config)?;
    let fetcher = build_fetcher(config, client.clone());
    let store = build_store(config).await?;
    let tracker = Tracker::new(WebhookApi::with_client(client, webhook_url), fetcher, polling)?
        .with_store(store);
    Ok(tracker)
}

/// Shut the tracker down on Ctrl-C. The watcher stops when the guard drops.
fn cancel_on_ctrl_c(tracker: Arc<Tracker>) -> AbortOnDrop {
    AbortOnDrop(tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling");
            tracker.shutdown().await;
        }
    }))
}

struct AbortOnDrop(tokio::task::JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Print a successful result to stdout and map the outcome to an exit code.
fn report(outcome: &Result<Value, PollError>) -> ExitCode {
    match outcome {
        Ok(result) => match serde_json::to_string_pretty(result) {
            Ok(text) => println!("{text}"),
            Err(e) => tracing::error!(error = %e, "Failed to render result"),
        },
        Err(e) => {
            tracing::error!(
                operation_id = e.operation_id().unwrap_or("-"),
                kind = e.kind().as_str(),
                error = %e,
                "Tracking failed",
            );
            eprintln!("error: {e}");
        }
    }
    ExitCode::from(exit_code(outcome))
}

async fn read_payload(path: Option<&Path>) -> Result<Value> {
    let raw = match path {
        None => return Ok(json!({})),
        Some(p) if p.as_os_str() == "-" => {
            let mut buf = String::new();
            tokio::io::stdin().read_to_string(&mut buf).await?;
            buf
        }
        Some(p) => tokio::fs::read_to_string(p)
            .await
            .with_context(|| format!("failed to read payload {}", p.display()))?,
    };
    serde_json::from_str(&raw).context("payload is not valid JSON")
}

async fn read_attachment(spec: &str) -> Result<Attachment> {
    let Some((field, path)) = parse_attachment_spec(spec) else {
        bail!("invalid attachment '{spec}', expected FIELD=PATH");
    };
    let path = Path::new(path);
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read attachment {}", path.display()))?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| field.to_string());
    Ok(Attachment {
        field: field.to_string(),
        file_name,
        content_type: None,
        bytes,
    })
}
