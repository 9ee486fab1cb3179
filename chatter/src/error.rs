use reqwest::StatusCode;
use thiserror::Error;

use crate::models::chat::ApiErrorResponse;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error("chat completion stream cancelled")]
    Cancelled,
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to serialize request: {0}")]
    Serialize(#[source] serde_json::Error),
    #[error("blocking client used from within an async runtime")]
    BlockingInAsyncContext,
    #[error("failed to build blocking runtime: {0}")]
    Runtime(#[source] std::io::Error),
}

/// A stream line that was neither a chunk nor the termination sentinel.
///
/// `recovered` holds the full error object the server sent in place of the
/// chunk, if the rest of the stream could be parsed as one. The error is
/// raised either way.
#[derive(Debug, Error)]
#[error("failed to decode chunk from line {line:?}: {source}")]
pub struct DecodeError {
    pub line: String,
    #[source]
    pub source: serde_json::Error,
    pub recovered: Option<ApiErrorResponse>,
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("server responded with {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("failed reading response stream: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config path not set: {0}")]
    MissingPath(#[from] dotenvy::Error),
    #[error("failed to open config: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid header: {0}")]
    Header(String),
}
