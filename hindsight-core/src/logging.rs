//! File logging
//!
//! stdout carries command output, so events go to a daily-rotated file under
//! `$XDG_STATE_HOME/hindsight/`. `RUST_LOG` takes precedence over
//! `logging.level`.

use crate::config::{Config, LoggingConfig};
use crate::error::{Error, Result};
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

/// Prefix of the rotated log files (`hindsight.log.YYYY-MM-DD`).
pub const LOG_FILE_PREFIX: &str = "hindsight.log";

/// Keeps the background writer alive. Pending events are flushed on drop.
pub struct LoggingGuard {
    dir: PathBuf,
    _worker: WorkerGuard,
}

impl LoggingGuard {
    /// Directory the log files are written to.
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

/// Install the global subscriber writing to the state directory.
///
/// Run spans are logged when they close, so each analysis run leaves its
/// duration in the log.
pub fn init(config: &LoggingConfig) -> Result<LoggingGuard> {
    let dir = Config::state_dir();
    std::fs::create_dir_all(&dir)?;

    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => level_filter(&config.level)?,
    };

    let appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(LOG_FILE_PREFIX)
        .max_log_files(config.max_files.max(1))
        .build(&dir)
        .map_err(|e| Error::Config(format!("failed to create log file: {e}")))?;
    let (writer, worker) = tracing_appender::non_blocking(appender);

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true)
                .with_span_events(FmtSpan::CLOSE),
        )
        .try_init()
        .map_err(|e| Error::Config(format!("failed to install logger: {e}")))?;

    tracing::info!(
        log_dir = %dir.display(),
        level = %config.level,
        max_files = config.max_files,
        "Logging initialized"
    );

    Ok(LoggingGuard {
        dir,
        _worker: worker,
    })
}

fn level_filter(level: &str) -> Result<EnvFilter> {
    EnvFilter::try_new(level)
        .map_err(|e| Error::Config(format!("invalid logging.level {level:?}: {e}")))
}
