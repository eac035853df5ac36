use std::fs;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Log file prefix; the appender adds the date suffix
const LOG_FILE_PREFIX: &str = "observatory_etl.log";

/// Filter used when `RUST_LOG` is unset or invalid
const DEFAULT_FILTER: &str = "observatory_etl=info,warn";

/// Install the global subscriber: human-readable progress on stdout and one
/// JSON object per event in a daily file under `log_dir`.
///
/// Buffered file output is flushed when the returned guard drops, so the
/// caller keeps it alive for the whole run.
pub fn init_logging(log_dir: &Path) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    if let Err(e) = fs::create_dir_all(log_dir) {
        let console = fmt::layer().with_target(false).with_writer(std::io::stdout);
        tracing_subscriber::registry().with(filter).with(console).init();
        tracing::warn!("File logging disabled, cannot create {}: {}", log_dir.display(), e);
        return None;
    }

    let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::daily(log_dir, LOG_FILE_PREFIX));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().with_writer(writer))
        .with(fmt::layer().with_target(false).with_writer(std::io::stdout))
        .init();
    Some(guard)
}
