//! # pdp-client - a blocking client for Policy Decision Points
//!
//! `pdp-client` sends an authorization input document to a Policy Decision
//! Point (PDP) over HTTP and returns the evaluation result as JSON. It owns
//! the request pipeline so callers don't have to: configuration from code
//! and environment, endpoint construction, JSON encoding, bounded retries on
//! network failures, and decoding of the answer.
//!
//! ## Quick Start
//!
//! ```no_run
//! use pdp_client::{Client, PdpRequest};
//! use serde_json::json;
//!
//! fn main() -> Result<(), pdp_client::Error> {
//!     // Unset fields come from PDP_* environment variables, then defaults:
//!     // http://localhost:8181/authz, 2 attempts, 250ms backoff.
//!     let client = Client::builder()
//!         .policy_path("/v1/data/httpapi/authz")
//!         .build()?;
//!
//!     // Free-form input, decoded as a JSON tree
//!     let tree = client.get_json_response(&json!({
//!         "input": { "user": "alice", "method": "GET", "path": ["finance", "salary", "alice"] }
//!     }))?;
//!     println!("allowed: {}", tree["result"]["allow"]);
//!
//!     // Typed input, decoded as a string-keyed mapping
//!     let request = PdpRequest::new("bob", "delete", "reports/q3");
//!     let mapping = client.get_mapped_response(&request)?;
//!     println!("decision: {:?}", mapping.get("result"));
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration
//!
//! | Builder method         | Environment variable                  | Default     |
//! |------------------------|---------------------------------------|-------------|
//! | `port`                 | `PDP_PORT`                            | `8181`      |
//! | `hostname`             | `PDP_HOSTNAME`                        | `localhost` |
//! | `scheme`               | `PDP_SCHEMA`                          | `http`      |
//! | `policy_path`          | `PDP_POLICY_PATH`                     | `/authz`    |
//! | `read_timeout`         | `PDP_READ_TIMEOUT_MILLISECONDS`       | `5000`      |
//! | `connection_timeout`   | `PDP_CONNECTION_TIMEOUT_MILLISECONDS` | `5000`      |
//! | `retry_max_attempts`   | `PDP_RETRY_MAX_ATTEMPTS`              | `2`         |
//! | `retry_backoff`        | `PDP_RETRY_BACKOFF_MILLISECONDS`      | `250`       |
//!
//! A value set on the builder always wins. Malformed environment values are
//! ignored.
//!
//! ## Retries
//!
//! Only network-level failures (connect, DNS, timeout, read, reset) are
//! retried. The delay before attempt `n` is
//! `min(backoff * 2^(n - 2), backoff * max_attempts + 1ms)`. An HTTP response
//! with any status code is never retried, and by default its body is decoded
//! whatever the status; see [`ClientBuilder::error_for_status`] to opt into
//! treating 4xx/5xx as errors.
//!
//! ## Logging
//!
//! The crate emits structured events through `tracing` and never installs a
//! subscriber.

mod client;
pub mod codec;
pub mod config;
pub mod endpoint;
mod error;
mod request;
mod response;
pub mod retry;
pub mod transport;

pub use client::{Client, ClientBuilder};
pub use config::Config;
pub use error::{Error, Result};
pub use request::PdpRequest;
pub use response::Response;
pub use retry::RetryPolicy;
pub use transport::{HttpTransport, RawResponse, Transport, TransportFailure};
