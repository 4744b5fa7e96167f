//! HTTP Client Module
//!
//! Retrying HTTP client with per-request overrides and streaming downloads.

use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::error::{DownloadFailure, HttpError, Result};
use crate::http::retry::{Attempt, RetryConfig};
use crate::http::transport::{
    BodyStream, HttpRequest, ReqwestTransport, RequestBody, Transport,
};

/// Chunk size used by downloads when none (or zero) is given.
pub const DEFAULT_CHUNK_SIZE: usize = 8192;

// == Config ==
/// Client-wide defaults.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Timeout for a single attempt
    pub timeout: Duration,
    /// Retry policy used unless a request overrides it
    pub retry: RetryConfig,
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            retry: RetryConfig::default(),
            user_agent: concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"))
                .to_string(),
        }
    }
}

// == Client ==
/// HTTP client that retries transient failures with exponential backoff.
///
/// Cloning is cheap and clones share the transport.
#[derive(Clone)]
pub struct HttpClient {
    transport: Arc<dyn Transport>,
    config: Arc<HttpConfig>,
}

impl fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpClient")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl HttpClient {
    /// Creates a client backed by `reqwest`.
    pub fn new(config: HttpConfig) -> Result<Self> {
        let transport = ReqwestTransport::new(&config.user_agent)?;
        Ok(Self::with_transport(Arc::new(transport), config))
    }

    /// Creates a client over any transport.
    pub fn with_transport(transport: Arc<dyn Transport>, config: HttpConfig) -> Self {
        Self {
            transport,
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &HttpConfig {
        &self.config
    }

    /// Starts a request. Errors in the URL or in builder arguments surface
    /// from [`RequestBuilder::send`].
    pub fn request(&self, method: Method, url: &str) -> RequestBuilder {
        let request = Url::parse(url)
            .map(|parsed| HttpRequest::new(method, parsed, self.config.timeout))
            .map_err(|source| HttpError::InvalidUrl {
                url: url.to_string(),
                source,
            });

        RequestBuilder {
            client: self.clone(),
            request,
            retry: None,
        }
    }

    pub fn get(&self, url: &str) -> RequestBuilder {
        self.request(Method::GET, url)
    }

    pub fn post(&self, url: &str) -> RequestBuilder {
        self.request(Method::POST, url)
    }

    pub fn put(&self, url: &str) -> RequestBuilder {
        self.request(Method::PUT, url)
    }

    pub fn delete(&self, url: &str) -> RequestBuilder {
        self.request(Method::DELETE, url)
    }

    // == Download ==
    /// Streams the body of `GET url` into `path`, writing `chunk_size` bytes
    /// at a time, and returns the number of bytes written.
    ///
    /// The request goes through the retry policy. The body is written to a
    /// temporary sibling of `path` that is renamed into place only once it is
    /// complete and synced. If the stream or a write fails, the temporary
    /// file and `path` are removed before the error is returned. If the
    /// returned future is dropped mid-stream, the temporary file is deleted
    /// and `path` is left untouched, so `path` never holds a truncated
    /// download.
    pub async fn download_file(
        &self,
        url: &str,
        path: impl AsRef<Path>,
        chunk_size: usize,
    ) -> Result<u64> {
        let path = path.as_ref();
        let chunk_size = if chunk_size == 0 {
            DEFAULT_CHUNK_SIZE
        } else {
            chunk_size
        };

        info!("Downloading {} to {}", url, path.display());
        let response = self.get(url).send().await?;

        match write_body(response.into_stream(), path, chunk_size).await {
            Ok(written) => {
                info!("Downloaded {} bytes to {}", written, path.display());
                Ok(written)
            }
            Err(source) => {
                remove_partial(path).await;
                error!("Download of {} failed: {}", url, source);
                Err(HttpError::Download {
                    url: url.to_string(),
                    path: path.to_path_buf(),
                    source,
                })
            }
        }
    }

    // == Execute ==
    // Runs the attempt loop until success or a terminal failure.
    async fn execute(&self, request: HttpRequest, retry: &RetryConfig) -> Result<Response> {
        if !request.is_secure() {
            warn!("Insecure HTTP request to {}, prefer HTTPS", request.url);
        }
        if !request.verify_tls {
            warn!("TLS certificate verification disabled for {}", request.url);
        }

        let max_attempts = retry.attempts();
        let mut attempt = 1;

        loop {
            debug!("{} {} (attempt {}/{})", request.method, request.url, attempt, max_attempts);

            let result = self
                .transport
                .send(&request)
                .await
                .map(|response| (response.status(), response));

            match retry.classify(&request.method, result) {
                Attempt::Success(response) => {
                    debug!("{} {} -> {}", request.method, request.url, response.status());
                    let (status, headers, body) = response.into_parts();
                    return Ok(Response {
                        url: request.url,
                        status,
                        headers,
                        attempts: attempt,
                        body,
                    });
                }
                Attempt::RetryableFailure(cause) if attempt < max_attempts => {
                    let delay = retry.backoff(attempt);
                    warn!(
                        "{} {} failed ({}), retrying in {:?}",
                        request.method, request.url, cause, delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Attempt::RetryableFailure(cause) | Attempt::TerminalFailure(cause) => {
                    error!(
                        "{} {} failed after {} attempt(s): {}",
                        request.method, request.url, attempt, cause
                    );
                    return Err(HttpError::Request {
                        method: request.method,
                        url: request.url.to_string(),
                        attempts: attempt,
                        cause,
                    });
                }
            }
        }
    }
}

// == Request Builder ==
/// Per-request options. Nothing is sent until [`RequestBuilder::send`].
#[derive(Debug)]
pub struct RequestBuilder {
    client: HttpClient,
    request: Result<HttpRequest>,
    retry: Option<RetryConfig>,
}

impl RequestBuilder {
    fn map(mut self, f: impl FnOnce(&mut HttpRequest) -> Result<()>) -> Self {
        if let Ok(request) = &mut self.request {
            if let Err(err) = f(request) {
                self.request = Err(err);
            }
        }
        self
    }

    pub fn header(self, name: &str, value: &str) -> Self {
        self.map(|request| {
            let invalid = || HttpError::InvalidHeader(name.to_string());
            let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|_| invalid())?;
            let header_value = HeaderValue::from_str(value).map_err(|_| invalid())?;
            request.headers.insert(header_name, header_value);
            Ok(())
        })
    }

    pub fn headers(self, headers: HeaderMap) -> Self {
        self.map(|request| {
            request.headers.extend(headers);
            Ok(())
        })
    }

    /// Appends query parameters.
    pub fn query<I, K, V>(self, pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: ToString,
    {
        self.map(|request| {
            request
                .query
                .extend(pairs.into_iter().map(|(k, v)| (k.into(), v.to_string())));
            Ok(())
        })
    }

    /// Sends a url-encoded form body.
    pub fn form<I, K, V>(self, pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: ToString,
    {
        self.map(|request| {
            let pairs = pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.to_string()))
                .collect();
            request.body = RequestBody::Form(pairs);
            Ok(())
        })
    }

    /// Sends a raw body.
    pub fn body(self, body: impl Into<Bytes>) -> Self {
        self.map(|request| {
            request.body = RequestBody::Bytes(body.into());
            Ok(())
        })
    }

    /// Sends a JSON body.
    pub fn json<T: Serialize + ?Sized>(self, json: &T) -> Self {
        self.map(|request| {
            let value = serde_json::to_value(json).map_err(HttpError::Encode)?;
            request.body = RequestBody::Json(value);
            Ok(())
        })
    }

    /// Overrides the per-attempt timeout.
    pub fn timeout(self, timeout: Duration) -> Self {
        self.map(|request| {
            request.timeout = timeout;
            Ok(())
        })
    }

    /// Enables or disables TLS certificate verification.
    pub fn verify_tls(self, verify: bool) -> Self {
        self.map(|request| {
            request.verify_tls = verify;
            Ok(())
        })
    }

    /// Overrides the client's retry policy for this request.
    pub fn retry_config(mut self, retry: RetryConfig) -> Self {
        self.retry = Some(retry);
        self
    }

    /// Sends the request, retrying per the active policy.
    pub async fn send(self) -> Result<Response> {
        let request = self.request?;
        let retry = self
            .retry
            .unwrap_or_else(|| self.client.config.retry.clone());
        self.client.execute(request, &retry).await
    }
}

// == Response ==
/// Successful response. The body has not been read yet.
pub struct Response {
    url: Url,
    status: StatusCode,
    headers: HeaderMap,
    attempts: u32,
    body: BodyStream,
}

impl fmt::Debug for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Response")
            .field("url", &self.url.as_str())
            .field("status", &self.status)
            .field("attempts", &self.attempts)
            .finish_non_exhaustive()
    }
}

impl Response {
    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Number of attempts it took to get this response.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Reads the whole body.
    pub async fn bytes(self) -> Result<Bytes> {
        let url = self.url.to_string();
        let mut body = self.body;
        let mut buf = BytesMut::new();
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|source| HttpError::Body {
                url: url.clone(),
                source,
            })?;
            buf.extend_from_slice(&chunk);
        }
        Ok(buf.freeze())
    }

    /// Reads the body as text, replacing invalid UTF-8.
    pub async fn text(self) -> Result<String> {
        let bytes = self.bytes().await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Reads the body as JSON.
    pub async fn json<T: DeserializeOwned>(self) -> Result<T> {
        let url = self.url.to_string();
        let bytes = self.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|source| HttpError::Decode { url, source })
    }

    /// Hands over the raw body stream.
    pub fn into_stream(self) -> BodyStream {
        self.body
    }
}

// == Download Helpers ==
async fn write_body(
    mut body: BodyStream,
    path: &Path,
    chunk_size: usize,
) -> std::result::Result<u64, DownloadFailure> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    tokio::fs::create_dir_all(dir).await?;

    // The temp path deletes its file on drop, including when this future is
    // cancelled part way through.
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let (file, tmp_path) = tempfile::Builder::new()
        .prefix(&format!(".{}.", name))
        .suffix(".part")
        .tempfile_in(dir)?
        .into_parts();
    let mut file = tokio::fs::File::from_std(file);

    let mut pending = BytesMut::with_capacity(chunk_size);
    let mut written: u64 = 0;

    while let Some(chunk) = body.next().await {
        pending.extend_from_slice(&chunk?);
        while pending.len() >= chunk_size {
            let piece = pending.split_to(chunk_size);
            file.write_all(&piece).await?;
            written += piece.len() as u64;
        }
    }
    if !pending.is_empty() {
        file.write_all(&pending).await?;
        written += pending.len() as u64;
    }

    file.flush().await?;
    file.sync_all().await?;
    drop(file);

    tmp_path.persist(path).map_err(|err| err.error)?;
    Ok(written)
}

async fn remove_partial(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!("Removed partial download {}", path.display()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => warn!("Failed to remove partial download {}: {}", path.display(), err),
    }
}
