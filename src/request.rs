//! Typed authorization query.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A domain-level authorization query.
///
/// Encodes to the same JSON object a caller would otherwise build by hand:
///
/// ```json
/// {"subject": ..., "action": ..., "resource": ..., "context": ...}
/// ```
///
/// `context` is omitted when it is `null`. All fields are free-form JSON.
///
/// # Examples
///
/// ```
/// use pdp_client::PdpRequest;
/// use serde_json::json;
///
/// let request = PdpRequest::new("alice", "read", json!({ "type": "document", "id": 42 }))
///     .with_context(json!({ "ip": "10.0.0.1" }));
///
/// let encoded = serde_json::to_value(&request).unwrap();
/// assert_eq!(encoded["subject"], "alice");
/// assert_eq!(encoded["resource"]["id"], 42);
/// assert_eq!(encoded["context"]["ip"], "10.0.0.1");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PdpRequest {
    pub subject: Value,
    pub action: Value,
    pub resource: Value,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub context: Value,
}

impl PdpRequest {
    /// Creates a request without context.
    pub fn new(
        subject: impl Into<Value>,
        action: impl Into<Value>,
        resource: impl Into<Value>,
    ) -> Self {
        Self {
            subject: subject.into(),
            action: action.into(),
            resource: resource.into(),
            context: Value::Null,
        }
    }

    /// Attaches free-form context such as request metadata or time.
    pub fn with_context(mut self, context: impl Into<Value>) -> Self {
        self.context = context.into();
        self
    }
}
