//! The HTTP executor: a single POST, no retries.
//!
//! [`Transport`] is the seam between the evaluation pipeline and the
//! network. [`HttpTransport`] is the production implementation over a pooled
//! `reqwest` client; tests inject their own implementation through
//! [`ClientBuilder::transport`](crate::ClientBuilder::transport).
//!
//! A transport reports a [`TransportFailure`] only when no complete HTTP
//! response was received. A response with any status code, including 4xx
//! and 5xx, is a successful exchange.

use crate::{config::Config, Error, Result};
use http::{header::CONTENT_TYPE, HeaderMap, HeaderValue, StatusCode};
use std::error::Error as _;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// The content type sent with every evaluation request.
pub const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";

/// The class of network failure behind a [`TransportFailure`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The connection could not be established.
    Connect,
    /// The hostname could not be resolved.
    Dns,
    /// The connect or read phase exceeded its timeout.
    Timeout,
    /// The response could not be read.
    Read,
    /// The peer reset the connection.
    ConnectionReset,
    /// Any other transport-level failure.
    Other,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureKind::Connect => "connect failure",
            FailureKind::Dns => "DNS failure",
            FailureKind::Timeout => "timeout",
            FailureKind::Read => "read failure",
            FailureKind::ConnectionReset => "connection reset",
            FailureKind::Other => "transport failure",
        };
        f.write_str(name)
    }
}

/// A network-level failure that happened before a complete response arrived.
///
/// These are the only failures the retry policy retries.
#[derive(thiserror::Error, Debug, Clone)]
#[error("{kind}: {message}")]
pub struct TransportFailure {
    kind: FailureKind,
    message: String,
}

impl TransportFailure {
    /// Creates a failure of the given kind.
    ///
    /// # Examples
    ///
    /// ```
    /// use pdp_client::transport::{FailureKind, TransportFailure};
    ///
    /// let failure = TransportFailure::new(FailureKind::Timeout, "read timed out");
    /// assert_eq!(failure.kind(), FailureKind::Timeout);
    /// assert_eq!(failure.to_string(), "timeout: read timed out");
    /// ```
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Returns the failure class.
    pub fn kind(&self) -> FailureKind {
        self.kind
    }

    /// Returns the failure description.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<reqwest::Error> for TransportFailure {
    fn from(error: reqwest::Error) -> Self {
        let kind = classify(&error);
        Self::new(kind, error.to_string())
    }
}

fn classify(error: &reqwest::Error) -> FailureKind {
    if error.is_timeout() {
        return FailureKind::Timeout;
    }

    // Walk the source chain for an io::Error to spot resets, which reqwest
    // otherwise reports as generic request errors.
    let mut source = error.source();
    while let Some(inner) = source {
        if let Some(io) = inner.downcast_ref::<std::io::Error>() {
            match io.kind() {
                std::io::ErrorKind::ConnectionReset | std::io::ErrorKind::ConnectionAborted => {
                    return FailureKind::ConnectionReset
                }
                std::io::ErrorKind::TimedOut => return FailureKind::Timeout,
                _ => {}
            }
        }
        if inner.to_string().contains("dns error") {
            return FailureKind::Dns;
        }
        source = inner.source();
    }

    if error.is_connect() {
        FailureKind::Connect
    } else if error.is_body() || error.is_decode() {
        FailureKind::Read
    } else {
        FailureKind::Other
    }
}

/// A complete HTTP response, body fully read.
#[derive(Debug, Clone)]
pub struct RawResponse {
    /// The HTTP status code.
    pub status: StatusCode,
    /// The response headers.
    pub headers: HeaderMap,
    /// The raw response body.
    pub body: Vec<u8>,
}

impl RawResponse {
    /// Creates a response with the given status and body and no headers.
    pub fn new(status: StatusCode, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }

    /// Returns the body as text, replacing invalid UTF-8.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Performs a single JSON POST to the PDP.
///
/// Implementations must be safe to call from many threads at once and must
/// not retry on their own; retries belong to the
/// [`RetryPolicy`](crate::retry::RetryPolicy).
///
/// # Examples
///
/// ```
/// use pdp_client::transport::{RawResponse, Transport, TransportFailure};
/// use http::StatusCode;
/// use url::Url;
///
/// struct AlwaysAllow;
///
/// impl Transport for AlwaysAllow {
///     fn post(&self, _url: &Url, _body: &[u8]) -> Result<RawResponse, TransportFailure> {
///         Ok(RawResponse::new(StatusCode::OK, r#"{"result":true}"#))
///     }
/// }
/// ```
pub trait Transport: Send + Sync {
    /// POSTs `body` to `url` with a JSON content type.
    fn post(&self, url: &Url, body: &[u8]) -> std::result::Result<RawResponse, TransportFailure>;
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn post(&self, url: &Url, body: &[u8]) -> std::result::Result<RawResponse, TransportFailure> {
        (**self).post(url, body)
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn post(&self, url: &Url, body: &[u8]) -> std::result::Result<RawResponse, TransportFailure> {
        (**self).post(url, body)
    }
}

/// The production transport, backed by a pooled `reqwest` client.
///
/// The connect phase is bounded by the connection timeout. Every read from
/// the socket, including the wait for response headers, is bounded by the
/// read timeout, which resets after each successful read, so a response
/// that keeps streaming is never cut off.
///
/// reqwest's own retry policy is set to never retry. hyper may still replay
/// a request over a fresh connection when a pooled connection was found
/// closed before any byte of the request was written; reqwest does not expose
/// that switch.
///
/// Requests are driven on a single I/O worker thread owned by the transport;
/// callers block until their exchange completes. Clones share the worker and
/// the connection pool.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    http_client: reqwest::Client,
    runtime: Arc<tokio::runtime::Runtime>,
}

impl HttpTransport {
    /// Creates a transport with the given timeouts. `None` disables a
    /// timeout.
    ///
    /// Must not be called, and the transport must not be used or dropped,
    /// from within an async runtime.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigurationError`] if the HTTP client or its I/O
    /// worker cannot be initialized.
    pub fn new(connect_timeout: Option<Duration>, read_timeout: Option<Duration>) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("pdp-client-io")
            .enable_all()
            .build()
            .map_err(|e| {
                Error::ConfigurationError(format!("Failed to start HTTP runtime: {}", e))
            })?;

        let mut builder = reqwest::Client::builder().retry(reqwest::retry::never());
        if let Some(connect_timeout) = connect_timeout {
            builder = builder.connect_timeout(connect_timeout);
        }
        if let Some(read_timeout) = read_timeout {
            builder = builder.read_timeout(read_timeout);
        }

        let http_client = {
            let _guard = runtime.enter();
            builder.build().map_err(|e| {
                Error::ConfigurationError(format!("Failed to build HTTP client: {}", e))
            })?
        };

        Ok(Self {
            http_client,
            runtime: Arc::new(runtime),
        })
    }

    /// Creates a transport using the timeouts from `config`.
    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(config.connection_timeout(), config.read_timeout())
    }

    async fn send(
        &self,
        url: &Url,
        body: &[u8],
    ) -> std::result::Result<RawResponse, TransportFailure> {
        let response = self
            .http_client
            .post(url.clone())
            .header(CONTENT_TYPE, HeaderValue::from_static(JSON_CONTENT_TYPE))
            .body(body.to_vec())
            .send()
            .await?;

        let status = response.status();
        let headers = response.headers().clone();
        // Reading the whole body releases the connection back to the pool.
        let body = response.bytes().await?.to_vec();

        Ok(RawResponse {
            status,
            headers,
            body,
        })
    }
}

impl Transport for HttpTransport {
    fn post(&self, url: &Url, body: &[u8]) -> std::result::Result<RawResponse, TransportFailure> {
        self.runtime.block_on(self.send(url, body))
    }
}
