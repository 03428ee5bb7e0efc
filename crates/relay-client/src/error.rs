//! Client error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Relay answered with status {status}")]
    Relay { status: u16 },

    #[error("No relay answered DISCOVER on ports {tried:?}")]
    NotDiscovered { tried: Vec<u16> },

    #[error("Relay port unknown, run discovery first")]
    NoPort,
}

pub type Result<T> = std::result::Result<T, ClientError>;
