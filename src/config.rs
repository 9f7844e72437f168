use crate::errors::{AppError, AppResult};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;

/// Service configuration, parsed once at startup.
#[derive(Parser, Debug, Clone, PartialEq, Eq)]
#[command(name = "growth-dashboard", version, about = "Growth and engagement dashboard API")]
pub struct Config {
    /// Port the HTTP server listens on.
    #[arg(long, env = "PORT", default_value = "3001")]
    pub port: u16,

    /// SQLite database file holding users, scans and domain lists.
    #[arg(long, env = "DATABASE_PATH", default_value = "dashboard.sqlite")]
    pub database: PathBuf,

    /// Maximum number of concurrently open database connections.
    #[arg(long, env = "DB_POOL_SIZE", default_value = "5")]
    pub pool_size: usize,

    /// Comma-separated allowed origins, or "*" to allow any origin.
    #[arg(long, env = "CORS_ALLOWED_ORIGINS", default_value = "*")]
    pub cors_allowed_origins: String,

    /// Directory for daily-rotated JSON logs. Logs go to stdout when unset.
    #[arg(long, env = "LOG_DIR")]
    pub log_dir: Option<PathBuf>,
}

impl Config {
    pub fn validate(&self) -> AppResult<()> {
        if self.pool_size == 0 {
            return Err(AppError::Config("--pool-size must be at least 1".to_string()));
        }
        Ok(())
    }

    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::from(([0, 0, 0, 0], self.port))
    }

    /// Explicit origin allow-list, or `None` when any origin is allowed.
    pub fn cors_origins(&self) -> Option<Vec<String>> {
        let raw = self.cors_allowed_origins.trim();
        if raw.is_empty() || raw == "*" {
            return None;
        }
        let origins: Vec<String> = raw
            .split(',')
            .map(str::trim)
            .filter(|origin| !origin.is_empty())
            .map(ToString::to_string)
            .collect();
        if origins.is_empty() {
            None
        } else {
            Some(origins)
        }
    }
}
