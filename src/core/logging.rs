use std::sync::OnceLock;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::core::config::{AppConfig, AppPaths};

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Installs the global subscriber: stdout plus a daily rolling `server.log`.
///
/// `RUST_LOG` wins over the configured level when set.
pub fn init(config: &AppConfig, paths: &AppPaths) {
    let log_dir = &paths.log_dir;
    let _ = std::fs::create_dir_all(log_dir);

    let file_appender = tracing_appender::rolling::daily(log_dir, "server.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    let _ = LOG_GUARD.set(guard);

    let level = config.effective_log_level().to_string();
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(&level))
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let stdout_layer = tracing_subscriber::fmt::layer().with_target(true);
    let file_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_ansi(false)
        .with_writer(non_blocking);

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .with(file_layer)
        .try_init();

    tracing::info!(env = %config.env, level = %level, "Logging initialized");
    if config.env == crate::core::config::Environment::Development {
        tracing::warn!("Running in development mode. Do not use in production.");
    }
}
