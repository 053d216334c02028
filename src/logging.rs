use crate::config::LoggingConfig;
use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::time::ChronoLocal;
use tracing_subscriber::{prelude::*, EnvFilter};

const LOG_FILE_PREFIX: &str = "townsquare.log";

/// Filter for the configured level. The database drivers log every
/// statement at info, so they are held at warn.
fn filter(config: &LoggingConfig) -> Result<EnvFilter> {
    Ok(EnvFilter::from_default_env()
        .add_directive(config.log_level().into())
        .add_directive("sqlx=warn".parse()?)
        .add_directive("sea_orm=warn".parse()?))
}

/// Install the global subscriber: stdout plus a daily rotated file in
/// `config.dir`. Dropping the returned guard flushes the file writer.
pub fn init_logging(config: &LoggingConfig) -> Result<WorkerGuard> {
    std::fs::create_dir_all(&config.dir)
        .with_context(|| format!("Failed to create log directory {}", config.dir))?;

    let file_appender = tracing_appender::rolling::daily(&config.dir, LOG_FILE_PREFIX);
    let (writer, guard) = tracing_appender::non_blocking(file_appender);
    let timer = ChronoLocal::rfc_3339();

    tracing_subscriber::registry()
        .with(filter(config)?)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_timer(timer.clone()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_timer(timer)
                .with_writer(writer),
        )
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(guard)
}
