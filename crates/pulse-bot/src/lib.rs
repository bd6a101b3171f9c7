//! Pulse streaming signal engine.
//!
//! Orchestrates:
//! - Input source (JSON lines from a file or stdin)
//! - One single-writer worker task per pair, each owning a `UnifiedMMAnalyzer`
//! - A writer task emitting one JSON signal per processed snapshot
//! - Metrics and periodic session summaries

pub mod app;
pub mod config;
pub mod error;
pub mod worker;

pub use app::{Application, RunSummary};
pub use config::{AppConfig, PairConfig};
pub use error::{AppError, AppResult};
pub use worker::PairWorker;
