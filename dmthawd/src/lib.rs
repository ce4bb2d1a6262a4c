//! dmthawd keeps cinder volumes on a storage host usable.
//!
//! LVM occasionally leaves device-mapper volumes suspended after snapshot
//! operations, which freezes all I/O against them until someone resumes the
//! device by hand. This crate watches for that condition, debounces it over
//! consecutive scans, resumes the affected devices in dependency-safe order,
//! and reports everything it did. An optional bounded-time health probe
//! keeps an eye on the storage target daemon alongside.

pub mod config;
pub mod daemon;
pub mod dm;
pub mod error;
pub mod health;
pub mod logging;
pub mod notify;
pub mod report;
pub mod tracker;

pub use config::DaemonConfig;
pub use daemon::Daemon;
pub use error::{Error, Result};
