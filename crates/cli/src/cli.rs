//! CLI argument parsing with clap

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use hooktrack_core::polling::PollingConfig;

/// hooktrack - trigger webhook operations and track them to completion
#[derive(Parser, Debug)]
#[command(name = "hooktrack")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Invoke the webhook and track the operation it starts
    Trigger(TriggerArgs),

    /// Resume tracking persisted operations
    Resume(ResumeArgs),

    /// Fetch the current status of one operation
    Status(StatusArgs),
}

#[derive(Args, Debug)]
pub struct TriggerArgs {
    /// Webhook URL (overrides HOOKTRACK_WEBHOOK_URL)
    #[arg(long)]
    pub webhook_url: Option<String>,

    /// JSON payload file, or `-` for stdin
    #[arg(long, value_name = "FILE")]
    pub payload: Option<PathBuf>,

    /// Attach a file as a multipart field
    #[arg(long = "attach", value_name = "FIELD=PATH")]
    pub attachments: Vec<String>,

    #[command(flatten)]
    pub polling: PollingArgs,
}

/// Overrides for the polling settings from the environment.
#[derive(Args, Debug, Default)]
pub struct PollingArgs {
    /// Base interval between status checks
    #[arg(long, value_name = "MS")]
    pub interval_ms: Option<u64>,

    /// Give up after this many seconds
    #[arg(long, value_name = "N")]
    pub timeout_secs: Option<u64>,

    /// Give up after this many status checks
    #[arg(long, value_name = "N")]
    pub max_attempts: Option<u32>,

    /// Double the interval after each check
    #[arg(long)]
    pub exponential: bool,
}

impl PollingArgs {
    pub fn apply(&self, mut config: PollingConfig) -> PollingConfig {
        if let Some(ms) = self.interval_ms {
            config.base_interval = Duration::from_millis(ms);
        }
        if let Some(secs) = self.timeout_secs {
            config.timeout = Duration::from_secs(secs);
        }
        if let Some(max) = self.max_attempts {
            config.max_attempts = Some(max);
        }
        if self.exponential {
            let cap = config.max_interval;
            config = config.exponential(cap);
        }
        config
    }
}

#[derive(Args, Debug)]
pub struct ResumeArgs {
    /// Resume every stored operation, not just the latest
    #[arg(long)]
    pub all: bool,

    #[command(flatten)]
    pub polling: PollingArgs,
}

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Operation identifier
    pub operation_id: String,

    /// Status URL or template for the endpoint fetcher
    #[arg(long)]
    pub status_url: Option<String>,
}

/// Split a `FIELD=PATH` attachment spec.
pub fn parse_attachment_spec(spec: &str) -> Option<(&str, &str)> {
    let (field, path) = spec.split_once('=')?;
    let (field, path) = (field.trim(), path.trim());
    if field.is_empty() || path.is_empty() {
        return None;
    }
    Some((field, path))
}

#[cfg(test)]
mod tests {
    use hooktrack_core::polling::BackoffMode;

    use super::*;

    #[test]
    fn parses_trigger_flags() {
        let cli = Cli::try_parse_from([
            "hooktrack",
            "-vv",
            "trigger",
            "--payload",
            "req.json",
            "--attach",
            "image=in.png",
            "--attach",
            "mask=mask.png",
            "--max-attempts",
            "5",
            "--exponential",
        ])
        .unwrap();

        assert_eq!(cli.verbose, 2);
        let Commands::Trigger(args) = cli.command else {
            panic!("expected trigger");
        };
        assert_eq!(args.payload, Some(PathBuf::from("req.json")));
        assert_eq!(args.attachments, ["image=in.png", "mask=mask.png"]);

        let config = args.polling.apply(PollingConfig::default());
        assert_eq!(config.max_attempts, Some(5));
        assert_eq!(config.backoff_mode, BackoffMode::Exponential);
    }

    #[test]
    fn parses_resume_and_status() {
        let cli = Cli::try_parse_from(["hooktrack", "resume", "--all", "--json"]).unwrap();
        assert!(cli.json);
        assert!(matches!(cli.command, Commands::Resume(ResumeArgs { all: true, .. })));

        let cli = Cli::try_parse_from(["hooktrack", "status", "1042"]).unwrap();
        assert!(matches!(cli.command, Commands::Status(StatusArgs { ref operation_id, .. }) if operation_id == "1042"));

        assert!(Cli::try_parse_from(["hooktrack", "status"]).is_err());
    }

    #[test]
    fn absent_overrides_keep_config() {
        let base = PollingConfig::default().with_timeout(Duration::from_secs(42));
        assert_eq!(PollingArgs::default().apply(base.clone()), base);
    }

    #[test]
    fn attachment_spec_needs_both_halves() {
        assert_eq!(parse_attachment_spec("image=./a.png"), Some(("image", "./a.png")));
        assert_eq!(parse_attachment_spec("image="), None);
        assert_eq!(parse_attachment_spec("=a.png"), None);
        assert_eq!(parse_attachment_spec("a.png"), None);
    }
}
