//! Serve outcome types
//!
//! What the static server hands back to the host: a stream plus metadata,
//! or the reason there is none.

use chrono::{DateTime, Utc};
use std::fmt;
use std::path::PathBuf;
use std::pin::Pin;
use tokio::io::{AsyncRead, AsyncSeek};

use super::error::ServeError;

/// Random-access byte source
pub trait SeekableRead: AsyncRead + AsyncSeek + Send + Unpin {}

impl<T> SeekableRead for T where T: AsyncRead + AsyncSeek + Send + Unpin {}

/// Byte stream tagged with its capability, decided once when it is obtained
pub enum StaticStream {
    /// Supports conditional GET and byte ranges
    Seekable(Box<dyn SeekableRead>),
    /// Generated or in-memory data, copied through unconditionally
    Sequential(Pin<Box<dyn AsyncRead + Send>>),
}

impl fmt::Debug for StaticStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Seekable(_) => f.write_str("Seekable(..)"),
            Self::Sequential(_) => f.write_str("Sequential(..)"),
        }
    }
}

/// Metadata of a resolved path, produced only after the path-safety check
#[derive(Debug, Clone)]
pub struct ResolvedFile {
    pub absolute_path: PathBuf,
    pub is_directory: bool,
    pub is_file: bool,
    pub size: u64,
    pub modified: Option<DateTime<Utc>>,
}

/// A servable body with the metadata needed to render it
#[derive(Debug)]
pub struct StaticBinary {
    pub stream: StaticStream,
    /// Base name, used to infer the content type
    pub name: String,
    /// Declared length; `None` means unknown (computed from a seekable stream)
    pub length: Option<u64>,
    pub mod_time: DateTime<Utc>,
}

impl StaticBinary {
    pub fn seekable(
        reader: impl SeekableRead + 'static,
        name: impl Into<String>,
        length: Option<u64>,
        mod_time: DateTime<Utc>,
    ) -> Self {
        Self {
            stream: StaticStream::Seekable(Box::new(reader)),
            name: name.into(),
            length,
            mod_time,
        }
    }

    /// Wrap a reader that cannot seek; it is always sent whole with a 200
    #[allow(dead_code)]
    pub fn sequential(
        reader: impl AsyncRead + Send + 'static,
        name: impl Into<String>,
        length: Option<u64>,
        mod_time: DateTime<Utc>,
    ) -> Self {
        Self {
            stream: StaticStream::Sequential(Box::pin(reader)),
            name: name.into(),
            length,
            mod_time,
        }
    }
}

/// Result of one serve call, discarded once the response is written
#[derive(Debug)]
pub enum ServeOutcome {
    Ok(StaticBinary),
    NotFound(&'static str),
    Forbidden(&'static str),
    InternalError(ServeError),
}

impl From<ServeError> for ServeOutcome {
    fn from(err: ServeError) -> Self {
        match err {
            ServeError::PathRejected { .. } => Self::NotFound(""),
            ServeError::NotFound { .. } | ServeError::NotRegular { .. } => {
                Self::NotFound("File not found")
            }
            ServeError::Forbidden { .. } => Self::Forbidden("Directory listing not allowed"),
            internal @ ServeError::Internal { .. } => Self::InternalError(internal),
        }
    }
}

impl From<Result<StaticBinary, ServeError>> for ServeOutcome {
    fn from(result: Result<StaticBinary, ServeError>) -> Self {
        match result {
            Ok(binary) => Self::Ok(binary),
            Err(err) => {
                err.log();
                err.into()
            }
        }
    }
}
