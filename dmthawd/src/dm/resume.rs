//! Resuming suspended devices.
//!
//! Resumes go through `dmsetup resume` rather than `lvchange`: the hidden
//! `-real` and `-cow` companion devices that most often stay wedged after a
//! snapshot operation are not addressable through LVM commands at all, only
//! through the device-mapper layer underneath.

use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::dm::ResumeExecutor;
use crate::error::{Error, Result};

/// Executor that shells out to `dmsetup resume <device>`.
pub struct DmsetupResumer {
    program: String,
}

impl DmsetupResumer {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for DmsetupResumer {
    fn default() -> Self {
        Self::new("dmsetup")
    }
}

#[async_trait]
impl ResumeExecutor for DmsetupResumer {
    async fn resume(&self, device: &str) -> Result<bool> {
        let output = Command::new(&self.program)
            .arg("resume")
            .arg(device)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|source| Error::Launch {
                command: format!("{} resume {}", self.program, device),
                source,
            })?;
        if !output.status.success() {
            debug!(
                device,
                status = %output.status,
                stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                "dmsetup resume reported failure"
            );
        }
        Ok(output.status.success())
    }
}
