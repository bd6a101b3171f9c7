//! Error types for pulse-analytics.

use thiserror::Error;

/// Analytics error types.
///
/// Insufficient history is never an error; estimators return `None` instead.
#[derive(Debug, Error)]
pub enum AnalyticsError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Malformed snapshot: {0}")]
    MalformedSnapshot(String),

    #[error("Malformed trade: {0}")]
    MalformedTrade(String),

    #[error("Core error: {0}")]
    Core(#[from] pulse_core::CoreError),
}

/// Result type alias for analytics operations.
pub type AnalyticsResult<T> = std::result::Result<T, AnalyticsError>;
