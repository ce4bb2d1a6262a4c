//! Log initialization.
//!
//! Logs go to the console by default, or append to a file when `--log` is
//! given so restarts never clobber history. `RUST_LOG` overrides the level
//! chosen by `--debug`. The returned guard must stay alive for the life of
//! the process or buffered file output is lost.

use std::fs::OpenOptions;
use std::path::PathBuf;

use time::macros::format_description;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::error::Result;

#[derive(Debug, Default, Clone)]
pub struct LogOptions {
    pub debug: bool,
    pub file: Option<PathBuf>,
    pub journald: bool,
}

pub fn init(options: &LogOptions) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if options.debug {
            "info,dmthawd=debug"
        } else {
            "info"
        })
    });

    let timer = UtcTime::new(format_description!(
        "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:3]Z"
    ));

    let journald = if options.journald {
        match tracing_journald::layer() {
            Ok(layer) => Some(layer),
            Err(error) => {
                eprintln!("dmthawd: journald logging unavailable: {error}");
                None
            }
        }
    } else {
        None
    };

    let registry = tracing_subscriber::registry().with(filter).with(journald);

    match &options.file {
        Some(path) => {
            let file = OpenOptions::new().append(true).create(true).open(path)?;
            let (writer, guard) = tracing_appender::non_blocking(file);
            registry
                .with(
                    fmt::layer()
                        .with_writer(writer)
                        .with_ansi(false)
                        .with_timer(timer),
                )
                .init();
            Ok(Some(guard))
        }
        None => {
            registry.with(fmt::layer().with_timer(timer)).init();
            Ok(None)
        }
    }
}
