//! Suspended volume discovery via `dmsetup info`.
//!
//! `dmsetup info` prints one block of `Key: value` lines per device,
//! separated by blank lines. Parsing works on whole blocks rather than
//! pairing adjacent lines, so field order and extra fields inside a block do
//! not matter.

use std::collections::BTreeSet;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::dm::name::matches_convention;
use crate::dm::VolumeScanner;
use crate::error::{Error, Result};

/// Scanner that shells out to `dmsetup info`.
pub struct DmsetupScanner {
    program: String,
}

impl DmsetupScanner {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for DmsetupScanner {
    fn default() -> Self {
        Self::new("dmsetup")
    }
}

#[async_trait]
impl VolumeScanner for DmsetupScanner {
    async fn scan(&self) -> Result<BTreeSet<String>> {
        let command = format!("{} info", self.program);
        let output = Command::new(&self.program)
            .arg("info")
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|source| Error::Launch {
                command: command.clone(),
                source,
            })?;
        if !output.status.success() {
            return Err(Error::Command {
                command,
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        debug!(output = %stdout.trim_end(), "dmsetup info output");
        Ok(parse_dmsetup_info(&stdout))
    }
}

/// Extracts the names of suspended cinder devices from `dmsetup info` output.
///
/// Devices outside the cinder naming convention are ignored no matter their
/// state, as are convention devices in any state other than `SUSPENDED`.
pub fn parse_dmsetup_info(output: &str) -> BTreeSet<String> {
    let mut suspended = BTreeSet::new();
    let mut name: Option<&str> = None;
    let mut state: Option<&str> = None;
    // Trailing sentinel line flushes the final block.
    for line in output.lines().chain(std::iter::once("")) {
        let line = line.trim_end();
        if line.is_empty() {
            if let (Some(device), Some("SUSPENDED")) = (name, state) {
                if matches_convention(device) {
                    suspended.insert(device.to_string());
                }
            }
            name = None;
            state = None;
        } else if let Some(value) = line.strip_prefix("Name:") {
            name = Some(value.trim());
        } else if let Some(value) = line.strip_prefix("State:") {
            state = Some(value.trim());
        }
    }
    suspended
}
