//! Event sources: the point where the engine awaits its next input.
//!
//! Only JSON-lines replay is implemented. On-chain venues are recognised by
//! name but resolve to [`FeedError::SourceNotConfigured`]; reading pool
//! state from a chain is left to an external collector that writes JSON
//! lines.

use std::future::Future;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use crate::error::{FeedError, FeedResult};
use crate::parser::{MarketEvent, MessageParser};

/// Path that selects standard input.
pub const STDIN_PATH: &str = "-";

/// A stream of parsed market events.
pub trait EventSource {
    /// Next event, `Ok(None)` at end of stream.
    ///
    /// An `Err` rejects a single message; callers may keep reading.
    fn next_event(&mut self) -> impl Future<Output = FeedResult<Option<MarketEvent>>> + Send;
}

/// Input venue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Newline-delimited JSON from a file or stdin.
    #[default]
    #[serde(rename = "jsonl")]
    JsonLines,
    Lynex,
    Nile,
    SyncSwap,
    Kyber,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::JsonLines => "jsonl",
            Self::Lynex => "lynex",
            Self::Nile => "nile",
            Self::SyncSwap => "syncswap",
            Self::Kyber => "kyber",
        }
    }

    /// Whether this build can read from the venue.
    pub fn is_configured(&self) -> bool {
        matches!(self, Self::JsonLines)
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Newline-delimited JSON source over any async buffered reader.
///
/// A line that is not valid UTF-8 is rejected on its own; only read
/// failures end the stream.
pub struct JsonLinesSource<R> {
    reader: R,
    /// Bytes of the line being read. Kept across calls so a cancelled read
    /// resumes where it stopped.
    buf: Vec<u8>,
    parser: MessageParser,
    line_number: u64,
}

impl<R: AsyncBufRead + Unpin + Send> JsonLinesSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: Vec::new(),
            parser: MessageParser::new(),
            line_number: 0,
        }
    }

    /// Number of the last line read (1-based).
    pub fn line_number(&self) -> u64 {
        self.line_number
    }

    pub fn parser(&self) -> &MessageParser {
        &self.parser
    }
}

impl<R: AsyncBufRead + Unpin + Send> EventSource for JsonLinesSource<R> {
    async fn next_event(&mut self) -> FeedResult<Option<MarketEvent>> {
        loop {
            let read = self.reader.read_until(b'\n', &mut self.buf).await?;
            if read == 0 && self.buf.is_empty() {
                return Ok(None);
            }
            self.line_number += 1;

            let parsed = match std::str::from_utf8(&self.buf) {
                Ok(line) => self.parser.parse_line(line),
                Err(e) => {
                    self.parser.stats().record_rejected();
                    Err(FeedError::InvalidData(format!("line is not valid UTF-8: {e}")))
                }
            };
            self.buf.clear();

            match parsed {
                Ok(Some(event)) => return Ok(Some(event)),
                Ok(None) => continue,
                Err(e) => {
                    warn!(line = self.line_number, error = %e, "Rejected input line");
                    return Err(e);
                }
            }
        }
    }
}

/// Boxed reader so files and stdin share one source type.
pub type DynReader = Box<dyn AsyncBufRead + Unpin + Send>;

/// Open the configured source. `path` is a file, or `-` for stdin.
pub async fn open_source(kind: SourceKind, path: &Path) -> FeedResult<JsonLinesSource<DynReader>> {
    if !kind.is_configured() {
        return Err(FeedError::SourceNotConfigured(format!(
            "{kind} requires an external collector; replay its output as jsonl"
        )));
    }

    let reader: DynReader = if path == Path::new(STDIN_PATH) {
        info!("Reading events from stdin");
        Box::new(BufReader::new(tokio::io::stdin()))
    } else {
        info!(path = %path.display(), "Reading events from file");
        Box::new(BufReader::new(tokio::fs::File::open(path).await?))
    };
    Ok(JsonLinesSource::new(reader))
}
