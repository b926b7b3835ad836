//! Response wrapper that keeps the decoded result alongside exchange details.
//!
//! The plain evaluation methods return only the decoded body. [`Response`]
//! is returned by [`Client::evaluate`](crate::Client::evaluate) for callers
//! that need the status code, latency, or attempt count, for instance to
//! decide themselves whether a 4xx or 5xx answer counts as a failure.

use http::{HeaderMap, StatusCode};
use std::time::Duration;

/// A decoded PDP response plus details of the HTTP exchange.
///
/// # Examples
///
/// ```no_run
/// use pdp_client::Client;
/// use serde::Deserialize;
/// use serde_json::json;
///
/// #[derive(Deserialize)]
/// struct Decision {
///     result: bool,
/// }
///
/// # fn example() -> Result<(), pdp_client::Error> {
/// let client = Client::builder().build()?;
/// let response = client.evaluate::<Decision, _>(&json!({ "user": "alice" }))?;
///
/// if !response.status.is_success() {
///     eprintln!("PDP answered {}: {}", response.status, response.raw_body);
/// }
/// println!("allowed: {} after {} attempt(s)", response.data.result, response.attempts);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Response<T> {
    /// The decoded response body.
    pub data: T,

    /// The raw response body, lossily converted to UTF-8.
    pub raw_body: String,

    /// The HTTP status code of the response.
    pub status: StatusCode,

    /// The response headers.
    pub headers: HeaderMap,

    /// Time from the first attempt until the response was received,
    /// backoff delays included.
    pub latency: Duration,

    /// The number of transport invocations it took to get this response.
    pub attempts: u32,
}

impl<T> Response<T> {
    /// Creates a new `Response`.
    pub fn new(
        data: T,
        raw_body: String,
        status: StatusCode,
        headers: HeaderMap,
        latency: Duration,
        attempts: u32,
    ) -> Self {
        Self {
            data,
            raw_body,
            status,
            headers,
            latency,
            attempts,
        }
    }

    /// Maps the decoded data while keeping the exchange details.
    ///
    /// # Examples
    ///
    /// ```
    /// # use pdp_client::Response;
    /// # use http::{HeaderMap, StatusCode};
    /// # use std::time::Duration;
    /// let response = Response::new(
    ///     serde_json::json!({ "result": true }),
    ///     r#"{"result":true}"#.to_string(),
    ///     StatusCode::OK,
    ///     HeaderMap::new(),
    ///     Duration::from_millis(3),
    ///     1,
    /// );
    ///
    /// let allowed = response.map(|tree| tree["result"] == true);
    /// assert!(allowed.data);
    /// ```
    pub fn map<U, F>(self, f: F) -> Response<U>
    where
        F: FnOnce(T) -> U,
    {
        Response {
            data: f(self.data),
            raw_body: self.raw_body,
            status: self.status,
            headers: self.headers,
            latency: self.latency,
            attempts: self.attempts,
        }
    }

    /// Returns `true` if the request required retries.
    pub fn was_retried(&self) -> bool {
        self.attempts > 1
    }

    /// Returns a header value by name, if present and valid UTF-8.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)?.to_str().ok()
    }
}

impl<T> AsRef<T> for Response<T> {
    fn as_ref(&self) -> &T {
        &self.data
    }
}

impl<T> std::ops::Deref for Response<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    fn response(attempts: u32) -> Response<u8> {
        let mut headers = HeaderMap::new();
        headers.insert("content-type", HeaderValue::from_static("application/json"));
        Response::new(
            7,
            "7".to_string(),
            StatusCode::OK,
            headers,
            Duration::from_millis(1),
            attempts,
        )
    }

    #[test]
    fn was_retried_reflects_attempts() {
        assert!(!response(1).was_retried());
        assert!(response(2).was_retried());
    }

    #[test]
    fn header_lookup_is_case_insensitive() {
        assert_eq!(response(1).header("Content-Type"), Some("application/json"));
        assert_eq!(response(1).header("x-missing"), None);
    }

    #[test]
    fn deref_reaches_data() {
        let r = response(1);
        assert_eq!(*r, 7);
        assert_eq!(r.map(|n| n * 2).data, 14);
    }
}
