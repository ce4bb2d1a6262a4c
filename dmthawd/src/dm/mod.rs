//! Device-mapper access.
//!
//! The daemon never talks to device-mapper directly. It goes through the two
//! traits below so the orchestration and debounce logic can be exercised
//! against scripted collaborators, with `dmsetup`-backed implementations
//! wired in by the binary.

use std::collections::BTreeSet;

use async_trait::async_trait;

use crate::error::Result;

pub mod name;
pub mod resume;
pub mod scan;

pub use resume::DmsetupResumer;
pub use scan::DmsetupScanner;

/// Source of the currently suspended cinder device names.
///
/// A scan reflects one instant; devices may appear, vanish, or resume on
/// their own between calls. Errors mean the state of the host is unknown,
/// not that no devices are suspended.
#[async_trait]
pub trait VolumeScanner: Send + Sync {
    async fn scan(&self) -> Result<BTreeSet<String>>;
}

/// Attempts to resume a single suspended device.
///
/// `Ok(true)` means the resume command completed successfully, `Ok(false)`
/// that it ran and reported failure. `Err` is reserved for not being able to
/// run the command at all.
#[async_trait]
pub trait ResumeExecutor: Send + Sync {
    async fn resume(&self, device: &str) -> Result<bool>;
}
