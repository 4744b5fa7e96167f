//! Error types for the cache and HTTP layers
//!
//! Provides unified error handling using thiserror.

use std::path::PathBuf;

use reqwest::{Method, StatusCode};
use thiserror::Error;

// == File Cache Error ==
/// Failures inside the file cache.
///
/// These never leave the file cache: they are logged and turned into a miss.
#[derive(Error, Debug)]
pub enum FileCacheError {
    /// Key cannot be mapped to a file inside the cache directory
    #[error("Invalid file cache key: {0:?}")]
    InvalidKey(String),

    /// Filesystem failure
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Record could not be encoded or decoded
    #[error("Malformed cache record {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

// == Transport Error ==
/// Failure reported by a transport while sending a request or reading its body.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Connection could not be established
    #[error("Connection failed: {0}")]
    Connect(String),

    /// Attempt exceeded its timeout
    #[error("Request timed out: {0}")]
    Timeout(String),

    /// Body stream broke off
    #[error("Response body error: {0}")]
    Body(String),

    /// Anything else (invalid request, redirect loop, ...)
    #[error("Transport error: {0}")]
    Other(String),
}

impl TransportError {
    /// Connection and timeout errors are transient; everything else is final.
    pub fn is_retryable(&self) -> bool {
        matches!(self, TransportError::Connect(_) | TransportError::Timeout(_))
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        let message = err.to_string();
        if err.is_connect() {
            TransportError::Connect(message)
        } else if err.is_timeout() {
            TransportError::Timeout(message)
        } else if err.is_body() || err.is_decode() {
            TransportError::Body(message)
        } else {
            TransportError::Other(message)
        }
    }
}

// == Failure Cause ==
/// The last thing that went wrong in a request's attempt sequence.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FailureCause {
    /// Server answered with an error status
    #[error("HTTP status {0}")]
    Status(StatusCode),

    /// Transport failed before a status was received
    #[error(transparent)]
    Transport(TransportError),
}

// == Download Failure ==
/// Condition that aborted a streaming download after the file was created.
#[derive(Error, Debug)]
pub enum DownloadFailure {
    /// Writing the destination file failed
    #[error("write failed: {0}")]
    Io(#[from] std::io::Error),

    /// Body stream failed part way through
    #[error("stream failed: {0}")]
    Stream(#[from] TransportError),
}

// == Telemetry Error ==
/// Logging could not be set up.
#[derive(Error, Debug)]
pub enum TelemetryError {
    /// Log directory could not be prepared
    #[error("Failed to open log directory: {0}")]
    Appender(#[from] tracing_appender::rolling::InitError),

    /// A global subscriber is already installed
    #[error("Failed to install tracing subscriber: {0}")]
    Subscriber(#[from] tracing_subscriber::util::TryInitError),
}

// == HTTP Error ==
/// Single error type surfaced by the HTTP client.
#[derive(Error, Debug)]
pub enum HttpError {
    /// URL could not be parsed
    #[error("Invalid URL {url:?}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    /// Header name or value is not valid HTTP
    #[error("Invalid header {0:?}")]
    InvalidHeader(String),

    /// Request body could not be serialized
    #[error("Failed to encode request body: {0}")]
    Encode(#[source] serde_json::Error),

    /// Retries exhausted or a non-retryable failure occurred
    #[error("{method} {url} failed after {attempts} attempt(s): {cause}")]
    Request {
        method: Method,
        url: String,
        attempts: u32,
        #[source]
        cause: FailureCause,
    },

    /// Response body could not be read
    #[error("Failed to read response body from {url}: {source}")]
    Body {
        url: String,
        #[source]
        source: TransportError,
    },

    /// Response body was not the expected JSON
    #[error("Failed to decode response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    /// Streaming download failed; the partial file has been removed
    #[error("Download of {url} to {} failed: {source}", path.display())]
    Download {
        url: String,
        path: PathBuf,
        #[source]
        source: DownloadFailure,
    },

    /// Underlying client could not be constructed
    #[error("Failed to build HTTP client: {0}")]
    Client(String),
}

impl HttpError {
    /// Number of attempts made, when the error came out of the retry loop.
    pub fn attempts(&self) -> Option<u32> {
        match self {
            HttpError::Request { attempts, .. } => Some(*attempts),
            _ => None,
        }
    }

    /// Final HTTP status, when the server answered with one.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            HttpError::Request {
                cause: FailureCause::Status(status),
                ..
            } => Some(*status),
            _ => None,
        }
    }
}

// == Result Type Alias ==
/// Convenience Result type for the HTTP client.
pub type Result<T> = std::result::Result<T, HttpError>;
