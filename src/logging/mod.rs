/*!
 * Logging Module
 * Centralized logging configuration and utilities
 */
pub mod config;
pub mod middleware;

use std::io;
use tracing::Subscriber;
use tracing_appender::{
    non_blocking,
    non_blocking::{NonBlocking, WorkerGuard},
    rolling,
};
use tracing_subscriber::{
    filter::LevelFilter, fmt, layer::SubscriberExt, registry::LookupSpan,
    util::SubscriberInitExt, EnvFilter, Layer,
};

/// Writer guards for the non-blocking appenders.
///
/// Dropping these flushes and stops the background writer threads, so the
/// caller keeps them alive for as long as the process logs.
#[must_use = "dropping the guards stops log output"]
pub struct LogGuards {
    _file: WorkerGuard,
    _error: WorkerGuard,
    _console: WorkerGuard,
}

/// Default filter directive for the given level.
fn default_directive(log_level: &str) -> String {
    format!(
        "platforms_backend={},tower_http=debug,axum=debug,sqlx=warn",
        log_level
    )
}

/// ERROR events as JSON into `error.log`, whatever the environment.
///
/// Generic over the subscriber so each environment's stack gets its own
/// instance of the filtered layer.
fn error_file_layer<S>(writer: NonBlocking) -> impl Layer<S>
where
    S: Subscriber + for<'span> LookupSpan<'span>,
{
    fmt::layer()
        .json()
        .with_writer(writer)
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_filter(LevelFilter::ERROR)
}

/// Initialize the logging system
pub fn init() -> LogGuards {
    let environment = std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());
    let is_production = environment == "production";

    std::fs::create_dir_all("logs").ok();

    let file_appender = rolling::daily("logs", "app.log");
    let (file_writer, file_guard) = non_blocking(file_appender);

    let error_appender = rolling::daily("logs", "error.log");
    let (error_writer, error_guard) = non_blocking(error_appender);

    let (console_writer, console_guard) = non_blocking(io::stdout());

    let log_level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| {
        if is_production {
            "info".to_string()
        } else {
            "debug".to_string()
        }
    });

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(&log_level)));

    let subscriber = tracing_subscriber::registry().with(env_filter);

    if is_production {
        let file_layer = fmt::layer()
            .json()
            .with_writer(file_writer)
            .with_target(true)
            .with_thread_ids(true)
            .with_thread_names(true)
            .with_file(true)
            .with_line_number(true);

        let console_layer = fmt::layer()
            .json()
            .with_writer(console_writer)
            .with_target(false);

        subscriber
            .with(file_layer)
            .with(error_file_layer(error_writer))
            .with(console_layer)
            .init();
    } else {
        let file_layer = fmt::layer()
            .with_writer(file_writer)
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .with_ansi(false);

        let console_layer = fmt::layer()
            .with_writer(console_writer)
            .with_target(true)
            .pretty();

        subscriber
            .with(file_layer)
            .with(error_file_layer(error_writer))
            .with(console_layer)
            .init();
    }

    tracing::info!("Logging initialized for {} environment", environment);

    LogGuards {
        _file: file_guard,
        _error: error_guard,
        _console: console_guard,
    }
}
