//! Bounded-time liveness probe for the target daemon.
//!
//! The probe runs an operator-supplied command through `sh -c` and waits at
//! most a fixed deadline for it to finish. A command that neither exits nor
//! gets killed would stall the whole control loop, so the child is spawned
//! with `kill_on_drop` and the timed-out wait future is simply dropped,
//! which delivers SIGKILL. Timing out is reported as its own outcome,
//! distinct from a command that ran and failed.

use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tokio::time;

use crate::error::{Error, Result};

/// One liveness check, run fresh each cycle.
pub struct HealthProbe {
    command: String,
    timeout: Duration,
}

/// What a completed probe observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// The command exited zero.
    Passed { output: String },
    /// The command ran to completion but exited non-zero (or died to a
    /// signal, in which case `code` is `None`).
    Failed { code: Option<i32>, output: String },
    /// The command was still running at the deadline and has been killed.
    TimedOut,
}

impl HealthProbe {
    pub fn new(command: impl Into<String>, timeout: Duration) -> Self {
        Self {
            command: command.into(),
            timeout,
        }
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Runs the liveness command once. `Err` means the shell itself could
    /// not be spawned; everything the command does is a [`ProbeOutcome`].
    pub async fn run(&self) -> Result<ProbeOutcome> {
        let child = Command::new("/bin/sh")
            .arg("-c")
            .arg(&self.command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| Error::Launch {
                command: self.command.clone(),
                source,
            })?;
        match time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => {
                let text = combined_output(&output.stdout, &output.stderr);
                if output.status.success() {
                    Ok(ProbeOutcome::Passed { output: text })
                } else {
                    Ok(ProbeOutcome::Failed {
                        code: output.status.code(),
                        output: text,
                    })
                }
            }
            Ok(Err(source)) => Err(Error::Io(source)),
            // Dropping the wait future drops the child handle, and
            // kill_on_drop turns that into SIGKILL.
            Err(_) => Ok(ProbeOutcome::TimedOut),
        }
    }
}

fn combined_output(stdout: &[u8], stderr: &[u8]) -> String {
    let stdout = String::from_utf8_lossy(stdout);
    let stderr = String::from_utf8_lossy(stderr);
    let stdout = stdout.trim();
    let stderr = stderr.trim();
    match (stdout.is_empty(), stderr.is_empty()) {
        (true, true) => String::new(),
        (false, true) => stdout.to_string(),
        (true, false) => stderr.to_string(),
        (false, false) => format!("{stdout}\n{stderr}"),
    }
}
