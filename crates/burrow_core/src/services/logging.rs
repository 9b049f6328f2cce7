use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Guard that must be kept alive for the duration of the host application.
/// Dropping it flushes any remaining log entries and shuts down the
/// non-blocking writer worker thread.
pub struct LogGuard {
    _guard: WorkerGuard,
}

/// Initialize the logging system with file-based daily rotation.
///
/// Logs are written to `{log_dir}/burrow.YYYY-MM-DD.log`. Debug mode enables
/// debug-level logging and a stdout layer. The default level is overridable
/// via `RUST_LOG`.
pub fn init_logging(log_dir: &Path, is_debug: bool) -> LogGuard {
    let file_appender = tracing_appender::rolling::RollingFileAppender::builder()
        .rotation(tracing_appender::rolling::Rotation::DAILY)
        .filename_prefix("burrow")
        .filename_suffix("log")
        .build(log_dir)
        .expect("Failed to create log appender");

    // Non-blocking writer so query paths are never stalled by log IO
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let default_level = if is_debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(default_level)
            .add_directive("mysql_async=info".parse().unwrap())
            .add_directive("russh=info".parse().unwrap())
            .add_directive("mio=info".parse().unwrap())
    });

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    if is_debug {
        let stdout_layer = tracing_subscriber::fmt::layer()
            .with_writer(std::io::stdout)
            .with_ansi(true)
            .with_target(true)
            .with_thread_ids(false);

        tracing_subscriber::registry()
            .with(filter)
            .with(file_layer)
            .with(stdout_layer)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(file_layer)
            .init();
    }

    tracing::info!(
        "Logging initialized: dir={:?}, level={}",
        log_dir,
        default_level
    );

    LogGuard { _guard: guard }
}
