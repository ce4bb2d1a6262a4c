//! dmthawd daemon entry point.
//!
//! Parses flags, wires up logging and the configured collaborators, and
//! runs the remediation loop until SIGINT or SIGTERM.

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use dmthawd::config::{self, DaemonConfig, DEFAULT_HEALTH_TIMEOUT};
use dmthawd::daemon::Daemon;
use dmthawd::dm::{DmsetupResumer, DmsetupScanner};
use dmthawd::health::HealthProbe;
use dmthawd::logging::{self, LogOptions};
use dmthawd::notify::{LogNotifier, Notifier, SendmailNotifier, WebhookNotifier};

#[derive(Parser, Debug)]
#[command(
    name = "dmthawd",
    version,
    about = "Resumes suspended device-mapper volumes and reports what it did"
)]
struct Args {
    /// Seconds between poll cycles. Invalid values fall back to the default.
    #[arg(long)]
    interval: Option<String>,

    /// Enable debug logging (RUST_LOG overrides this).
    #[arg(long)]
    debug: bool,

    /// Append log output to this file instead of the console.
    #[arg(long, value_name = "PATH")]
    log: Option<PathBuf>,

    /// Also send log output to the systemd journal.
    #[arg(long)]
    journald: bool,

    /// Liveness command for the target daemon, run through `sh -c` each
    /// cycle. Omit to disable the probe.
    #[arg(long, value_name = "CMD")]
    health_cmd: Option<String>,

    /// Seconds before a health check is killed and counted as a timeout.
    #[arg(long, value_name = "SECS", default_value_t = 30.0)]
    health_timeout: f64,

    /// Deliver notifications to this webhook URL.
    #[arg(long, value_name = "URL")]
    webhook_url: Option<String>,

    /// Deliver notifications by mail to this address.
    #[arg(long, value_name = "ADDR")]
    mail_to: Option<String>,

    /// sendmail binary used with --mail-to.
    #[arg(long, value_name = "PATH", default_value = "/usr/sbin/sendmail")]
    sendmail: String,

    /// dmsetup binary used for scanning and resuming.
    #[arg(long, value_name = "PATH", default_value = "dmsetup")]
    dmsetup: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let _log_guard = logging::init(&LogOptions {
        debug: args.debug,
        file: args.log.clone(),
        journald: args.journald,
    })?;

    let config = DaemonConfig {
        interval: config::parse_interval(args.interval.as_deref()),
        health_command: args.health_cmd,
        health_timeout: config::duration_from_secs(args.health_timeout).unwrap_or_else(|| {
            warn!(value = args.health_timeout, "invalid health timeout, using default");
            DEFAULT_HEALTH_TIMEOUT
        }),
    };
    let probe = config
        .health_command
        .as_ref()
        .map(|command| HealthProbe::new(command.clone(), config.health_timeout));
    let notifier: Box<dyn Notifier> = if let Some(url) = args.webhook_url {
        Box::new(WebhookNotifier::new(url))
    } else if let Some(recipient) = args.mail_to {
        Box::new(SendmailNotifier::new(recipient, args.sendmail))
    } else {
        Box::new(LogNotifier)
    };
    let daemon = Daemon::new(
        config,
        Box::new(DmsetupScanner::new(args.dmsetup.clone())),
        Box::new(DmsetupResumer::new(args.dmsetup)),
        notifier,
        probe,
    );

    let shutdown = CancellationToken::new();
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = sigterm.recv() => info!("SIGTERM received, shutting down"),
            _ = sigint.recv() => info!("SIGINT received, shutting down"),
        }
        trigger.cancel();
    });

    daemon.run(shutdown).await;
    Ok(())
}
