use reqwest::StatusCode;
use thiserror::Error;

/// Errors returned by the Spond API client.
#[derive(Error, Debug)]
pub enum SpondError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Spond API returned {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),
}

pub type SpondResult<T> = Result<T, SpondError>;
