//! Input side of the pulse engine.
//!
//! Turns raw JSON messages into the core `TickSnapshot` / `TradeEvent`
//! shapes and exposes the await point where the engine waits for its next
//! input. Malformed messages are rejected one at a time; the stream keeps
//! going.

pub mod error;
pub mod parser;
pub mod source;

pub use error::{FeedError, FeedResult};
pub use parser::{MarketEvent, MessageParser, ParseStats};
pub use source::{open_source, DynReader, EventSource, JsonLinesSource, SourceKind, STDIN_PATH};
