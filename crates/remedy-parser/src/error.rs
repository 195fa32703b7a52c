use thiserror::Error;

/// A sink rejects a flushed batch with an opaque, boxed error — the caller
/// (typically a bulk-insert against the columnar store) owns the concrete
/// error type.
pub type SinkError = Box<dyn std::error::Error + Send + Sync>;

/// Errors surfaced by [`crate::streaming::parse_file`]. Every variant
/// carries the count already flushed so callers can report partial
/// progress.
#[derive(Debug, Error)]
pub enum ParseFileError {
    #[error("I/O error reading log file after {parsed_so_far} entries: {source}")]
    Io {
        #[source]
        source: std::io::Error,
        parsed_so_far: u64,
    },

    #[error("sink rejected batch after {parsed_so_far} entries: {source}")]
    Sink {
        #[source]
        source: SinkError,
        parsed_so_far: u64,
    },

    #[error("parse cancelled after {parsed_so_far} entries")]
    Cancelled { parsed_so_far: u64 },
}

impl ParseFileError {
    /// The number of entries flushed before this error was raised.
    pub fn parsed_so_far(&self) -> u64 {
        match self {
            ParseFileError::Io { parsed_so_far, .. }
            | ParseFileError::Sink { parsed_so_far, .. }
            | ParseFileError::Cancelled { parsed_so_far } => *parsed_so_far,
        }
    }
}
