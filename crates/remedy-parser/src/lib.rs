//! Line decoder and streaming parser for BMC Remedy AR Server debug logs.

pub mod decoder;
pub mod error;
pub mod streaming;

pub use decoder::parse_line;
pub use error::{ParseFileError, SinkError};
pub use streaming::{parse_file, parse_reader};
