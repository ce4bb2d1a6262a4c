//! Daemon configuration.

use std::time::Duration;

use tracing::warn;

/// Seconds between poll cycles when none is given on the command line.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(10);

/// How long the health probe waits before killing the liveness command.
pub const DEFAULT_HEALTH_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct DaemonConfig {
    /// Pause between the end of one cycle and the start of the next.
    pub interval: Duration,
    /// Liveness command for the target daemon, run through `sh -c`.
    /// `None` disables the probe entirely.
    pub health_command: Option<String>,
    /// Deadline for a single probe run.
    pub health_timeout: Duration,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            health_command: None,
            health_timeout: DEFAULT_HEALTH_TIMEOUT,
        }
    }
}

/// Parses the `--interval` argument.
///
/// A value that is missing, unparseable, non-positive or absurdly large falls
/// back to [`DEFAULT_INTERVAL`] with a warning instead of aborting startup.
/// An operator typo should not keep the remediation loop from running.
pub fn parse_interval(raw: Option<&str>) -> Duration {
    let Some(raw) = raw else {
        return DEFAULT_INTERVAL;
    };
    match raw.trim().parse::<f64>() {
        Ok(secs) => duration_from_secs(secs).unwrap_or_else(|| {
            warn!(value = %raw, "invalid poll interval, using default");
            DEFAULT_INTERVAL
        }),
        Err(_) => {
            warn!(value = %raw, "unparseable poll interval, using default");
            DEFAULT_INTERVAL
        }
    }
}

/// Converts a seconds value into a `Duration`, rejecting values that make no
/// sense as a schedule (NaN, infinite, zero, negative, or out of range).
pub fn duration_from_secs(secs: f64) -> Option<Duration> {
    if secs.is_finite() && secs > 0.0 {
        Duration::try_from_secs_f64(secs).ok()
    } else {
        None
    }
}
