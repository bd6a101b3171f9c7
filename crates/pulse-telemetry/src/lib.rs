//! Observability for the pulse engine.
//!
//! - Structured logging with tracing (JSON in production, pretty otherwise)
//! - Prometheus metrics for inputs, rejections, actions and signal values
//! - Session summaries read back from the metrics registry

pub mod error;
pub mod logging;
pub mod metrics;
pub mod summary;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::init_logging;
pub use metrics::Metrics;
pub use summary::{PairSessionStats, SessionReporter};
