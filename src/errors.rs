use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("QUERY_FAILED: {0}")]
    Query(String),
    #[error("AGGREGATION_FAILED: {metric}: {source}")]
    Aggregation {
        metric: &'static str,
        #[source]
        source: Box<AppError>,
    },
    #[error("CONFIG_INVALID: {0}")]
    Config(String),
    #[error("IO_FAILURE: {0}")]
    Io(String),
    #[error("INTERNAL: {0}")]
    Internal(String),
}

impl AppError {
    pub fn aggregation(metric: &'static str, source: AppError) -> Self {
        Self::Aggregation {
            metric,
            source: Box::new(source),
        }
    }

    /// Name of the metric that failed, when this is an aggregation failure.
    pub fn failed_metric(&self) -> Option<&'static str> {
        match self {
            Self::Aggregation { metric, .. } => Some(*metric),
            _ => None,
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value.to_string())
    }
}

impl From<rusqlite::Error> for AppError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Query(value.to_string())
    }
}

impl From<tokio::task::JoinError> for AppError {
    fn from(value: tokio::task::JoinError) -> Self {
        Self::Internal(format!("storage task failed: {value}"))
    }
}

pub type AppResult<T> = Result<T, AppError>;
