// Serve error taxonomy
// Every filesystem failure is classified into one of these at the failing call

use std::io;
use thiserror::Error;

use crate::logger;

#[derive(Debug, Error)]
pub enum ServeError {
    /// Traversal attempt, empty prefix, unknown module or malformed segment
    #[error("request path rejected: {path}")]
    PathRejected { path: String },

    #[error("file not found ({path}): {source}")]
    NotFound {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("not a regular file: {path}")]
    NotRegular { path: String },

    #[error("directory listing not allowed: {path}")]
    Forbidden { path: String },

    #[error("{action} '{path}' failed: {source}")]
    Internal {
        action: &'static str,
        path: String,
        #[source]
        source: io::Error,
    },
}

impl ServeError {
    /// Classify a stat/open failure: missing paths and non-directory path
    /// components are the client's problem, anything else is ours
    pub fn from_io(action: &'static str, path: &std::path::Path, source: io::Error) -> Self {
        let path = path.display().to_string();
        match source.kind() {
            io::ErrorKind::NotFound | io::ErrorKind::NotADirectory => Self::NotFound { path, source },
            _ => Self::Internal {
                action,
                path,
                source,
            },
        }
    }

    /// Log with the severity of whoever is responsible for the failure
    pub fn log(&self) {
        match self {
            Self::PathRejected { path } => {
                logger::log_warning(&format!("Rejected request path outside of base path: {path}"));
            }
            Self::NotFound { .. } | Self::NotRegular { .. } => logger::log_warning(&self.to_string()),
            Self::Forbidden { path } => {
                logger::log_warning(&format!("Attempted directory listing of {path}"));
            }
            Self::Internal { .. } => logger::log_error(&self.to_string()),
        }
    }
}
