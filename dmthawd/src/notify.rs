//! Outbound notifications.
//!
//! Reports and health alerts leave the daemon through the [`Notifier`]
//! trait. Three transports exist: an HTTP webhook posting a JSON payload, a
//! local `sendmail` pipe, and a log-only fallback so the daemon stays useful
//! on hosts with no delivery path configured.

use std::process::Stdio;

use async_trait::async_trait;
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::info;

use crate::error::{Error, Result};

/// Delivers one subject/body pair somewhere an operator will see it.
///
/// Delivery is fire-and-forget from the daemon's point of view: a failed
/// send is logged and the cycle's state is not rolled back.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, subject: &str, body: &str) -> Result<()>;
}

/// Hostname used to identify this machine in subjects and sender addresses.
pub fn local_hostname() -> String {
    gethostname::gethostname().to_string_lossy().into_owned()
}

/// Posts notifications as JSON to a webhook URL. The payload shape
/// (`{"text": ...}`) is what chat-ops receivers commonly accept.
pub struct WebhookNotifier {
    url: String,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct WebhookPayload<'a> {
    text: &'a str,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send(&self, subject: &str, body: &str) -> Result<()> {
        let text = format!("{subject}\n\n{body}");
        self.client
            .post(&self.url)
            .json(&WebhookPayload { text: &text })
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

/// Pipes an RFC 822 style message into a local `sendmail -t`.
pub struct SendmailNotifier {
    recipient: String,
    program: String,
    sender: String,
}

impl SendmailNotifier {
    pub fn new(recipient: impl Into<String>, program: impl Into<String>) -> Self {
        Self {
            recipient: recipient.into(),
            program: program.into(),
            sender: format!("dmthawd@{}", local_hostname()),
        }
    }
}

#[async_trait]
impl Notifier for SendmailNotifier {
    async fn send(&self, subject: &str, body: &str) -> Result<()> {
        let message = mail_message(&self.sender, &self.recipient, subject, body);
        let mut child = Command::new(&self.program)
            .arg("-t")
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| Error::Launch {
                command: format!("{} -t", self.program),
                source,
            })?;
        let mut stdin = child.stdin.take().expect("stdin is piped");
        stdin.write_all(message.as_bytes()).await?;
        drop(stdin);
        let output = child.wait_with_output().await?;
        if !output.status.success() {
            return Err(Error::Command {
                command: format!("{} -t", self.program),
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }
}

fn mail_message(sender: &str, recipient: &str, subject: &str, body: &str) -> String {
    format!("From: {sender}\nTo: {recipient}\nSubject: {subject}\n\n{body}")
}

/// Fallback transport that only writes to the log.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, subject: &str, body: &str) -> Result<()> {
        info!(subject = %subject, "notification (log only):\n{body}");
        Ok(())
    }
}
