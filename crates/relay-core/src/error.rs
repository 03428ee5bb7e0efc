//! Error types for relay-core

use std::path::PathBuf;

use thiserror::Error;

use crate::operation::OperationKind;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid setting {key}={value:?}: {reason}")]
    InvalidSetting {
        key: String,
        value: String,
        reason: String,
    },

    #[error("Settings unavailable at {} after {attempts} attempts", path.display())]
    SettingsUnavailable { path: PathBuf, attempts: usize },

    #[error("No port available on loopback: {0}")]
    NoPortAvailable(std::io::Error),

    #[error("Malformed operation request: {0}")]
    MalformedRequest(String),

    #[error("{kind} operation requires a {field} field")]
    MissingField {
        kind: OperationKind,
        field: &'static str,
    },
}
