//! HTTP Module
//!
//! Resilient HTTP client: declarative retry policy, pluggable transport and
//! streaming downloads.

mod client;
mod retry;
mod transport;

pub use client::{HttpClient, HttpConfig, RequestBuilder, Response, DEFAULT_CHUNK_SIZE};
pub use retry::{Attempt, RetryConfig, DEFAULT_RETRYABLE_STATUS, MAX_BACKOFF};
pub use transport::{
    BodyStream, HttpRequest, RequestBody, ReqwestTransport, Transport, TransportResponse,
};

// Types callers need to build requests and inspect responses
pub use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
pub use reqwest::{Method, StatusCode};
