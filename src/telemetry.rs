use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

const LOG_FILE_PREFIX: &str = "ozon-ads.log";

fn env_filter(level: &str) -> EnvFilter {
  EnvFilter::try_from_default_env()
    .or_else(|_| EnvFilter::try_new(level))
    .unwrap_or_else(|_| EnvFilter::new("info"))
}

fn file_logging_disabled() -> bool {
  std::env::var("DISABLE_FILE_LOGGING")
    .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
    .unwrap_or(false)
}

/// Stdout logging plus a daily rolling file in `log_dir`.
///
/// `RUST_LOG` wins over `level`. The returned guard flushes the file writer on drop and must be
/// held for the life of the process. File output is skipped when `DISABLE_FILE_LOGGING` is set
/// or the directory can't be created.
pub fn init_logging(level: &str, log_dir: &Path) -> Option<WorkerGuard> {
  let stdout_layer = tracing_subscriber::fmt::layer()
    .with_target(false)
    .with_filter(env_filter(level));

  let file = if file_logging_disabled() {
    None
  } else if let Err(e) = std::fs::create_dir_all(log_dir) {
    eprintln!("log directory {} unavailable: {e}", log_dir.display());
    None
  } else {
    let appender = tracing_appender::rolling::daily(log_dir, LOG_FILE_PREFIX);
    Some(tracing_appender::non_blocking(appender))
  };

  match file {
    Some((writer, guard)) => {
      let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_filter(env_filter(level));
      let _ = tracing_subscriber::registry()
        .with(stdout_layer)
        .with(file_layer)
        .try_init();
      Some(guard)
    }
    None => {
      let _ = tracing_subscriber::registry().with(stdout_layer).try_init();
      None
    }
  }
}

/// Stdout-only logging for serverless handlers.
pub fn init_stdout(level: &str) {
  let _ = tracing_subscriber::fmt()
    .with_env_filter(env_filter(level))
    .with_target(false)
    .without_time()
    .try_init();
}
