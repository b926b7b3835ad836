//! Error types for policy evaluations.
//!
//! Every evaluation either returns a decoded result or exactly one [`Error`].
//! Each variant names the pipeline stage that failed so the message alone is
//! enough to tell an encoding problem from a dispatch or decoding problem.

use crate::transport::TransportFailure;
use http::StatusCode;
use url::Url;

/// The main error type for policy evaluations.
///
/// # Examples
///
/// ```no_run
/// use pdp_client::{Client, Error};
/// use serde_json::json;
///
/// # fn example() -> Result<(), Error> {
/// let client = Client::builder().build()?;
///
/// match client.get_json_response(&json!({ "user": "alice" })) {
///     Ok(tree) => println!("decision: {}", tree["result"]),
///     Err(Error::Transport { url, attempts, source }) => {
///         eprintln!("PDP at {} unreachable after {} attempts: {}", url, attempts, source);
///     }
///     Err(Error::DeserializationFailed { raw_response, status, .. }) => {
///         eprintln!("PDP answered {} with non-JSON body: {}", status, raw_response);
///     }
///     Err(e) => eprintln!("evaluation failed: {}", e),
/// }
/// # Ok(())
/// # }
/// ```
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The configuration cannot produce a usable endpoint or transport.
    ///
    /// Raised while building a [`Client`](crate::Client), never retried.
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// The caller's input could not be encoded to JSON.
    ///
    /// The transport is never invoked when this happens.
    #[error("encoding request: {0}")]
    SerializationFailed(#[source] serde_json::Error),

    /// Every attempt to reach the PDP failed at the network layer.
    ///
    /// Carries the last failure observed and the number of attempts made.
    #[error("dispatching to {url} failed after {attempts} attempt(s): {source}")]
    Transport {
        /// The endpoint the request was sent to
        url: Url,
        /// How many times the transport was invoked
        attempts: u32,
        /// The failure reported by the final attempt
        #[source]
        source: TransportFailure,
    },

    /// The response body is not valid JSON of the requested shape.
    ///
    /// The raw body and status are preserved, since a non-2xx answer with a
    /// plain-text body also ends up here.
    #[error("decoding response (status {status}): {serde_error}")]
    DeserializationFailed {
        /// The raw response body, lossily converted to UTF-8
        raw_response: String,
        /// The serde error message
        serde_error: String,
        /// The HTTP status code
        status: StatusCode,
    },

    /// The PDP answered with a status of 400 or above.
    ///
    /// Only produced when the client was built with
    /// [`error_for_status(true)`](crate::ClientBuilder::error_for_status).
    #[error("HTTP error {status}: {raw_response}")]
    HttpError {
        /// The HTTP status code
        status: StatusCode,
        /// The raw response body
        raw_response: String,
    },
}

impl Error {
    /// Returns `true` if this error came from the network layer.
    ///
    /// Only transport failures are ever retried; everything else is
    /// surfaced on first occurrence.
    ///
    /// # Examples
    ///
    /// ```
    /// use pdp_client::Error;
    ///
    /// let err = Error::ConfigurationError("policy path must start with '/'".to_string());
    /// assert!(!err.is_retryable());
    /// ```
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Transport { .. })
    }

    /// Returns the HTTP status code if this error has one.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Error::HttpError { status, .. } => Some(*status),
            Error::DeserializationFailed { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Returns the raw response body if this error has one.
    pub fn raw_response(&self) -> Option<&str> {
        match self {
            Error::HttpError { raw_response, .. } => Some(raw_response),
            Error::DeserializationFailed { raw_response, .. } => Some(raw_response),
            _ => None,
        }
    }
}

/// A specialized `Result` type for policy evaluations.
pub type Result<T> = std::result::Result<T, Error>;
