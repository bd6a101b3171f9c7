//! Application error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Configuration load error: {0}")]
    ConfigLoad(#[from] config::ConfigError),

    #[error("Analytics error: {0}")]
    Analytics(#[from] pulse_analytics::AnalyticsError),

    #[error("Feed error: {0}")]
    Feed(#[from] pulse_feed::FeedError),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] pulse_telemetry::TelemetryError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Task failed: {0}")]
    Task(String),
}

pub type AppResult<T> = Result<T, AppError>;
