//! Server error types

use relay_core::OperationStatus;
use thiserror::Error;

/// Startup and listener errors
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Core error: {0}")]
    Core(#[from] relay_core::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, ServerError>;

/// Failure of a single operation, scoped to the request that caused it
#[derive(Error, Debug)]
pub enum OperationError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Upstream {location} timed out")]
    Timeout { location: String },

    #[error("Upstream {location} unreachable: {source}")]
    Upstream {
        location: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("File {path}: {source}")]
    File {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl OperationError {
    pub fn upstream(location: &str, source: reqwest::Error) -> Self {
        if source.is_timeout() {
            OperationError::Timeout {
                location: location.to_string(),
            }
        } else {
            OperationError::Upstream {
                location: location.to_string(),
                source,
            }
        }
    }

    pub fn file(path: &str, source: std::io::Error) -> Self {
        OperationError::File {
            path: path.to_string(),
            source,
        }
    }

    /// Status reported back to the caller
    pub fn status(&self) -> OperationStatus {
        match self {
            OperationError::BadRequest(_) => OperationStatus::BadRequest,
            OperationError::Timeout { .. }
            | OperationError::Upstream { .. }
            | OperationError::File { .. } => OperationStatus::NotFound,
        }
    }
}

impl From<relay_core::Error> for OperationError {
    fn from(err: relay_core::Error) -> Self {
        OperationError::BadRequest(err.to_string())
    }
}

/// Returned to hyper to close a connection without writing a response
#[derive(Error, Debug)]
#[error("request dropped without response")]
pub struct Dropped;
