//! Global tracing subscriber.
//!
//! Output goes to the console and to `rust-restream.log.YYYY-MM-DD` in the
//! log directory. The filter can be swapped at runtime through
//! [`LoggingConfig`]. Encoder stderr arrives under the
//! `rust_restream::encoder` target.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, NaiveDate, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::Writer, time::FormatTime},
    layer::SubscriberExt,
    reload,
    util::SubscriberInitExt,
};

use crate::utils::fs;

/// Used when `RUST_LOG` is unset or invalid.
pub const DEFAULT_LOG_FILTER: &str = "rust_restream=info,tower_http=info";

const LOG_FILE_PREFIX: &str = "rust-restream.log";

const LOG_RETENTION_DAYS: i64 = 7;

const RETENTION_SWEEP_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// Local-time RFC 3339 timestamps with milliseconds.
#[derive(Debug, Clone, Copy)]
struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z"))
    }
}

type FilterHandle = reload::Handle<EnvFilter, tracing_subscriber::Registry>;

/// Runtime control over the installed subscriber.
pub struct LoggingConfig {
    filter: FilterHandle,
    log_dir: PathBuf,
}

impl LoggingConfig {
    /// The active filter directive.
    pub fn get_filter(&self) -> String {
        self.filter
            .with_current(ToString::to_string)
            .unwrap_or_default()
    }

    /// Swap in a new filter such as `rust_restream=debug`.
    ///
    /// Invalid directives are a validation error and leave the current
    /// filter in place.
    pub fn set_filter(&self, directive: &str) -> crate::Result<()> {
        let filter = EnvFilter::try_new(directive)
            .map_err(|e| crate::Error::validation(format!("Invalid filter directive: {e}")))?;
        self.filter
            .reload(filter)
            .map_err(|e| crate::Error::Other(format!("Failed to reload filter: {e}")))?;
        info!(directive = %directive, "Log filter updated");
        Ok(())
    }

    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    /// Sweep expired log files now and then once a day until cancelled.
    pub fn start_retention_cleanup(self: &Arc<Self>, cancel_token: CancellationToken) {
        let log_dir = self.log_dir.clone();
        tokio::spawn(async move {
            loop {
                match cleanup_old_logs(&log_dir, LOG_RETENTION_DAYS).await {
                    Ok(0) => {}
                    Ok(count) => info!(count, "Removed expired log files"),
                    Err(e) => warn!(error = %e, "Log retention sweep failed"),
                }
                tokio::select! {
                    _ = cancel_token.cancelled() => break,
                    _ = tokio::time::sleep(RETENTION_SWEEP_INTERVAL) => {}
                }
            }
            debug!("Log retention task stopped");
        });
    }
}

/// Date encoded in a rolled log file name, if it is one of ours.
fn log_file_date(name: &str) -> Option<NaiveDate> {
    let date = name.strip_prefix(LOG_FILE_PREFIX)?.strip_prefix('.')?;
    NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()
}

/// Remove rolled log files dated before the retention window.
async fn cleanup_old_logs(log_dir: &Path, retention_days: i64) -> std::io::Result<usize> {
    let cutoff = (Utc::now() - chrono::Duration::days(retention_days)).date_naive();
    let mut entries = tokio::fs::read_dir(log_dir).await?;
    let mut removed = 0;

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let expired = path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(log_file_date)
            .is_some_and(|date| date < cutoff);
        if !expired || !path.is_file() {
            continue;
        }
        match tokio::fs::remove_file(&path).await {
            Ok(()) => removed += 1,
            Err(e) => warn!(path = %path.display(), error = %e, "Cannot remove expired log file"),
        }
    }

    Ok(removed)
}

/// Install the global subscriber.
///
/// The returned guard flushes the file writer on drop; hold it until exit.
pub fn init_logging(log_dir: &Path) -> crate::Result<(Arc<LoggingConfig>, WorkerGuard)> {
    fs::ensure_dir_all_sync_with_op("creating log directory", log_dir)?;

    let appender = tracing_appender::rolling::daily(log_dir, LOG_FILE_PREFIX);
    let (file_writer, guard) = tracing_appender::non_blocking(appender);

    let initial =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let (filter_layer, filter) = reload::Layer::new(initial);

    let console = fmt::layer().with_timer(LocalTimer);
    let file = fmt::layer()
        .with_writer(file_writer)
        .with_ansi(false)
        .with_timer(LocalTimer);

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(console)
        .with(file)
        .try_init()
        .map_err(|e| crate::Error::Other(format!("Logging already initialized: {e}")))?;

    let config = LoggingConfig {
        filter,
        log_dir: log_dir.to_path_buf(),
    };
    Ok((Arc::new(config), guard))
}

/// Targets worth tuning individually.
pub fn available_modules() -> Vec<(&'static str, &'static str)> {
    vec![
        ("rust_restream", "Main application"),
        ("rust_restream::supervisor", "Stream supervision"),
        ("rust_restream::encoder", "Encoder stderr output"),
        ("tower_http", "HTTP requests"),
    ]
}
