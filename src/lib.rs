pub mod config;
pub mod dashboard;
pub mod db;
pub mod errors;
pub mod filters;
pub mod metrics;
pub mod models;
pub mod server;

use crate::config::Config;
use crate::dashboard::Dashboard;
use crate::db::Database;
use crate::errors::{AppError, AppResult};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::writer::BoxMakeWriter;

static LOG_GUARD: std::sync::OnceLock<WorkerGuard> = std::sync::OnceLock::new();

pub async fn run(config: Config) -> AppResult<()> {
    config.validate()?;
    init_tracing(config.log_dir.as_deref())?;

    let db = Database::new(&config.database, config.pool_size)?;
    server::serve(&config, Dashboard::new(db)).await
}

fn init_tracing(log_dir: Option<&Path>) -> AppResult<()> {
    let writer = match log_dir {
        Some(log_dir) => {
            std::fs::create_dir_all(log_dir)?;
            let file_appender = tracing_appender::rolling::daily(log_dir, "dashboard.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            let _ = LOG_GUARD.set(guard);
            BoxMakeWriter::new(non_blocking)
        }
        None => BoxMakeWriter::new(std::io::stdout),
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .json()
        .with_writer(writer)
        .try_init()
        .map_err(|error| AppError::Internal(error.to_string()))
}
