//! JSON encoding of requests and decoding of PDP responses.
//!
//! Thin adapter over `serde_json` so the rest of the pipeline only deals in
//! [`Error`] variants that name the stage that failed.

use crate::{Error, Result};
use http::StatusCode;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};

/// Encodes any serializable input to JSON bytes.
pub fn encode<T>(input: &T) -> Result<Vec<u8>>
where
    T: Serialize + ?Sized,
{
    serde_json::to_vec(input).map_err(Error::SerializationFailed)
}

/// Decodes a response body into any deserializable type.
///
/// The status is only used to annotate the error; the body is decoded
/// whatever the status is.
pub fn decode<T>(body: &[u8], status: StatusCode) -> Result<T>
where
    T: DeserializeOwned,
{
    serde_json::from_slice(body).map_err(|e| {
        let raw_response = String::from_utf8_lossy(body).into_owned();

        tracing::error!(
            error = %e,
            status = status.as_u16(),
            raw_response = %raw_response,
            "Failed to decode PDP response"
        );

        Error::DeserializationFailed {
            raw_response,
            serde_error: e.to_string(),
            status,
        }
    })
}

/// Decodes a response body into an opaque JSON tree.
pub fn decode_tree(body: &[u8], status: StatusCode) -> Result<Value> {
    decode(body, status)
}

/// Decodes a response body into a string-keyed mapping.
///
/// Fails if the top-level value is not a JSON object.
pub fn decode_map(body: &[u8], status: StatusCode) -> Result<Map<String, Value>> {
    decode(body, status)
}
