//! Crate-wide error type.
//!
//! The daemon's recovery strategy is "log and move on", so callers only need
//! to distinguish a command that could not be started from one that ran and
//! reported failure.

use std::process::ExitStatus;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// An external command could not be started at all.
    #[error("failed to launch `{command}`: {source}")]
    Launch {
        command: String,
        source: std::io::Error,
    },

    /// An external command ran but exited unsuccessfully.
    #[error("`{command}` exited with {status}: {stderr}")]
    Command {
        command: String,
        status: ExitStatus,
        stderr: String,
    },

    /// Webhook notification could not be delivered.
    #[error("webhook delivery failed: {0}")]
    Webhook(#[from] reqwest::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
