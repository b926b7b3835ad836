//! Example evaluating a policy against a running PDP.
//!
//! This example shows how to:
//! - Build a client from `PDP_*` environment variables and builder overrides
//! - Send free-form and typed inputs
//! - Decode the answer as a tree, a mapping, or a typed struct
//! - Tell network failures apart from bad responses
//!
//! Start a PDP first, for example Open Policy Agent:
//! `opa run --server --addr :8181 policy.rego`
//!
//! Run with: `PDP_POLICY_PATH=/v1/data/authz cargo run --example evaluate`

use pdp_client::{Client, Error, PdpRequest};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct Decision {
    #[serde(default)]
    result: Option<serde_json::Value>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter("pdp_client=debug,evaluate=info")
        .init();

    let client = Client::builder()
        .retry_max_attempts(3)
        .retry_backoff(Duration::from_millis(100))
        .build()?;

    println!("=== Configuration ===");
    println!("{}", serde_json::to_string_pretty(client.config())?);
    println!("Endpoint: {}", client.endpoint());
    println!();

    println!("=== Free-form input, JSON tree ===");
    let input = json!({ "input": { "user": "alice", "action": "read", "resource": "reports/q3" } });
    match client.get_json_response(&input) {
        Ok(tree) => println!("Result: {}", tree["result"]),
        Err(Error::Transport {
            url,
            attempts,
            source,
        }) => {
            println!("PDP unreachable at {} after {} attempt(s)", url, attempts);
            println!("  Failure kind: {:?}", source.kind());
            return Ok(());
        }
        Err(e) => println!("Evaluation failed: {}", e),
    }
    println!();

    println!("=== Typed input, mapping ===");
    let request = PdpRequest::new("bob", "delete", "reports/q3")
        .with_context(json!({ "mfa": false }));
    match client.get_mapped_response(&json!({ "input": request })) {
        Ok(mapping) => {
            for (key, value) in &mapping {
                println!("  {} = {}", key, value);
            }
        }
        Err(e) => println!("Evaluation failed: {}", e),
    }
    println!();

    println!("=== Typed output with exchange details ===");
    match client.evaluate::<Decision, _>(&input) {
        Ok(response) => {
            println!("Status: {}", response.status);
            println!("Attempts: {}", response.attempts);
            println!("Latency: {:?}", response.latency);
            println!("Decision: {:?}", response.data.result);
        }
        Err(Error::DeserializationFailed {
            raw_response,
            status,
            serde_error,
        }) => {
            println!("PDP answered {} with an unexpected body: {}", status, serde_error);
            println!("  Raw response: {}", raw_response);
        }
        Err(e) => println!("Evaluation failed: {}", e),
    }

    Ok(())
}
