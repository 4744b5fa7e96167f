//! Transport Module
//!
//! The seam between the retrying client and the network. `ReqwestTransport`
//! is the production implementation; tests plug in their own.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use reqwest::header::HeaderMap;
use reqwest::{Client, Method, StatusCode};
use url::Url;

use crate::error::{HttpError, TransportError};

/// Response body as a stream of chunks.
pub type BodyStream = BoxStream<'static, Result<Bytes, TransportError>>;

// == Request ==
/// Request body variants.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum RequestBody {
    #[default]
    Empty,
    /// Raw bytes sent as-is
    Bytes(Bytes),
    /// `application/x-www-form-urlencoded` pairs
    Form(Vec<(String, String)>),
    /// JSON document
    Json(serde_json::Value),
}

/// A fully described outbound request, handed to the transport once per
/// attempt.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub query: Vec<(String, String)>,
    pub body: RequestBody,
    /// Timeout for a single attempt
    pub timeout: Duration,
    /// Verify the server's TLS certificate
    pub verify_tls: bool,
}

impl HttpRequest {
    pub fn new(method: Method, url: Url, timeout: Duration) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            query: Vec::new(),
            body: RequestBody::Empty,
            timeout,
            verify_tls: true,
        }
    }

    /// True when the request travels over TLS.
    pub fn is_secure(&self) -> bool {
        self.url.scheme() == "https"
    }
}

// == Response ==
/// Status, headers and a body stream as produced by a transport.
pub struct TransportResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: BodyStream,
}

impl TransportResponse {
    pub fn new(status: StatusCode, headers: HeaderMap, body: BodyStream) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    /// Response with a body delivered in one chunk.
    pub fn from_bytes(status: StatusCode, body: impl Into<Bytes>) -> Self {
        let body = body.into();
        let stream: BodyStream = if body.is_empty() {
            stream::empty().boxed()
        } else {
            stream::once(async move { Ok(body) }).boxed()
        };
        Self::new(status, HeaderMap::new(), stream)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn into_parts(self) -> (StatusCode, HeaderMap, BodyStream) {
        (self.status, self.headers, self.body)
    }
}

impl fmt::Debug for TransportResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

// == Transport ==
/// Sends one attempt of a request.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &HttpRequest) -> Result<TransportResponse, TransportError>;
}

// == Reqwest Transport ==
/// Transport backed by `reqwest`, with separate clients for verified and
/// unverified TLS.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    verified: Client,
    unverified: Client,
}

impl ReqwestTransport {
    pub fn new(user_agent: &str) -> Result<Self, HttpError> {
        let build = |accept_invalid_certs: bool| {
            Client::builder()
                .user_agent(user_agent)
                .danger_accept_invalid_certs(accept_invalid_certs)
                .build()
                .map_err(|e| HttpError::Client(e.to_string()))
        };

        Ok(Self {
            verified: build(false)?,
            unverified: build(true)?,
        })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: &HttpRequest) -> Result<TransportResponse, TransportError> {
        let client = if request.verify_tls {
            &self.verified
        } else {
            &self.unverified
        };

        let mut builder = client
            .request(request.method.clone(), request.url.clone())
            .headers(request.headers.clone())
            .timeout(request.timeout);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        builder = match &request.body {
            RequestBody::Empty => builder,
            RequestBody::Bytes(bytes) => builder.body(bytes.clone()),
            RequestBody::Form(pairs) => builder.form(pairs),
            RequestBody::Json(value) => builder.json(value),
        };

        let response = builder.send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes_stream().map_err(TransportError::from).boxed();

        Ok(TransportResponse::new(status, headers, body))
    }
}
