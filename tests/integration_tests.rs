//! Integration tests using wiremock to simulate a PDP over real HTTP.
//!
//! The client is blocking, so every call runs on tokio's blocking pool while
//! the mock server runs on the async runtime.

use pdp_client::transport::FailureKind;
use pdp_client::{Client, ClientBuilder, Error, PdpRequest};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

async fn blocking<T, F>(f: F) -> T
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .expect("blocking task panicked")
}

fn builder_for(server: &MockServer) -> ClientBuilder {
    let address = *server.address();
    Client::builder()
        .env_source(HashMap::new())
        .hostname(address.ip().to_string())
        .port(address.port())
}

#[tokio::test(flavor = "multi_thread")]
async fn test_successful_evaluation() {
    init_tracing();
    let mock_server = MockServer::start().await;
    let input = json!({ "user": "alice", "action": "read" });

    Mock::given(method("POST"))
        .and(path("/authz"))
        .and(header("content-type", "application/json; charset=utf-8"))
        .and(body_json(&input))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "result": true })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let builder = builder_for(&mock_server);
    let tree = blocking(move || builder.build().unwrap().get_json_response(&input))
        .await
        .unwrap();

    assert_eq!(tree["result"], true);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_environment_selects_endpoint() {
    init_tracing();
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/data/authz"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "result": { "allow": true } })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let address = *mock_server.address();
    let env: HashMap<String, String> = [
        ("PDP_HOSTNAME", address.ip().to_string()),
        ("PDP_PORT", address.port().to_string()),
        ("PDP_POLICY_PATH", "/v1/data/authz".to_string()),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect();

    let mapping = blocking(move || {
        let client = Client::builder().env_source(env).build().unwrap();
        client.get_mapped_response(&json!({ "user": "alice" }))
    })
    .await
    .unwrap();

    assert_eq!(mapping["result"]["allow"], true);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_typed_request_body() {
    let mock_server = MockServer::start().await;
    let request = PdpRequest::new("alice", "read", json!({ "kind": "report" }));

    Mock::given(method("POST"))
        .and(path("/authz"))
        .and(body_json(json!({
            "subject": "alice",
            "action": "read",
            "resource": { "kind": "report" },
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "result": false })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let builder = builder_for(&mock_server);
    let tree = blocking(move || builder.build().unwrap().get_json_response(&request))
        .await
        .unwrap();

    assert_eq!(tree["result"], false);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_echo_round_trip() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/authz"))
        .respond_with(|req: &Request| ResponseTemplate::new(200).set_body_bytes(req.body.clone()))
        .mount(&mock_server)
        .await;

    let input = json!({
        "subject": { "id": "u-1", "groups": ["eng", "oncall"] },
        "action": "deploy",
        "weight": 0.25,
        "flags": null,
    });
    let expected = input.clone();

    let builder = builder_for(&mock_server);
    let mapping = blocking(move || builder.build().unwrap().get_mapped_response(&input))
        .await
        .unwrap();

    assert_eq!(Value::Object(mapping), expected);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_error_status_body_is_decoded() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/authz"))
        .respond_with(
            ResponseTemplate::new(500).set_body_json(json!({ "code": "internal_error" })),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let builder = builder_for(&mock_server);
    let response = blocking(move || {
        builder
            .retry_max_attempts(3)
            .build()
            .unwrap()
            .evaluate::<Value, _>(&json!({}))
    })
    .await
    .unwrap();

    assert_eq!(response.status.as_u16(), 500);
    assert_eq!(response.data["code"], "internal_error");
    assert_eq!(response.attempts, 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_non_json_error_body_is_a_decode_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/authz"))
        .respond_with(ResponseTemplate::new(502).set_body_string("Bad Gateway"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let builder = builder_for(&mock_server);
    let result = blocking(move || builder.build().unwrap().get_json_response(&json!({}))).await;

    match result {
        Err(Error::DeserializationFailed {
            raw_response,
            status,
            ..
        }) => {
            assert_eq!(status.as_u16(), 502);
            assert_eq!(raw_response, "Bad Gateway");
        }
        other => panic!("Expected DeserializationFailed, got {:?}", other),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_strict_status_mode() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/authz"))
        .respond_with(ResponseTemplate::new(403).set_body_string("forbidden"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let builder = builder_for(&mock_server);
    let result = blocking(move || {
        builder
            .error_for_status(true)
            .build()
            .unwrap()
            .get_json_response(&json!({}))
    })
    .await;

    match result {
        Err(Error::HttpError {
            status,
            raw_response,
        }) => {
            assert_eq!(status.as_u16(), 403);
            assert_eq!(raw_response, "forbidden");
        }
        other => panic!("Expected HttpError, got {:?}", other),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_read_timeout_is_retried_until_exhausted() {
    init_tracing();
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/authz"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "result": true }))
                .set_delay(Duration::from_millis(500)),
        )
        .mount(&mock_server)
        .await;

    let builder = builder_for(&mock_server);
    let result = blocking(move || {
        builder
            .read_timeout(Duration::from_millis(100))
            .retry_max_attempts(2)
            .retry_backoff(Duration::from_millis(10))
            .build()
            .unwrap()
            .get_json_response(&json!({}))
    })
    .await;

    let err = result.unwrap_err();
    assert!(err.to_string().contains("dispatching"));
    match err {
        Error::Transport {
            attempts, source, ..
        } => {
            assert_eq!(attempts, 2);
            assert_eq!(source.kind(), FailureKind::Timeout);
        }
        other => panic!("Expected Transport error, got {:?}", other),
    }

    let received = mock_server.received_requests().await.unwrap();
    assert_eq!(received.len(), 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_shared_client_across_threads() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/authz"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "result": true })))
        .expect(8)
        .mount(&mock_server)
        .await;

    let builder = builder_for(&mock_server);
    let results = blocking(move || {
        let client = builder.build().unwrap();
        std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|i| {
                    let client = client.clone();
                    scope.spawn(move || client.get_json_response(&json!({ "worker": i })))
                })
                .collect();
            handles
                .into_iter()
                .map(|handle| handle.join().unwrap())
                .collect::<Vec<_>>()
        })
    })
    .await;

    for result in results {
        assert_eq!(result.unwrap()["result"], true);
    }
}

#[test]
fn test_connection_refused_is_retried() {
    init_tracing();
    // Bind and release a port so nothing is listening on it.
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };

    let client = Client::builder()
        .env_source(HashMap::new())
        .hostname("127.0.0.1")
        .port(port)
        .retry_max_attempts(3)
        .retry_backoff(Duration::from_millis(5))
        .build()
        .unwrap();

    let err = client.get_json_response(&json!({})).unwrap_err();

    assert!(err.is_retryable());
    match err {
        Error::Transport {
            attempts, source, ..
        } => {
            assert_eq!(attempts, 3);
            assert_eq!(source.kind(), FailureKind::Connect);
        }
        other => panic!("Expected Transport error, got {:?}", other),
    }
}

#[test]
fn test_unresolvable_host_is_retried() {
    init_tracing();
    let client = Client::builder()
        .env_source(HashMap::new())
        .hostname("nonexistent.invalid")
        .connection_timeout(Duration::from_secs(5))
        .retry_max_attempts(3)
        .retry_backoff(Duration::from_millis(5))
        .build()
        .unwrap();

    let err = client.get_json_response(&json!({})).unwrap_err();

    assert!(err.to_string().contains("dispatching to http://nonexistent.invalid:8181/authz"));
    match err {
        Error::Transport {
            attempts, source, ..
        } => {
            assert_eq!(attempts, 3);
            assert_eq!(source.kind(), FailureKind::Dns);
        }
        other => panic!("Expected Transport error, got {:?}", other),
    }
}

/// Reads one HTTP/1.1 request (headers plus a `content-length` body).
fn read_request(stream: &mut TcpStream) {
    let mut received = Vec::new();
    let mut chunk = [0u8; 1024];
    loop {
        let n = stream.read(&mut chunk).unwrap();
        if n == 0 {
            return;
        }
        received.extend_from_slice(&chunk[..n]);

        let text = String::from_utf8_lossy(&received);
        if let Some(end) = text.find("\r\n\r\n") {
            let content_length = text[..end]
                .lines()
                .filter_map(|line| line.split_once(':'))
                .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
                .and_then(|(_, value)| value.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if received.len() >= end + 4 + content_length {
                return;
            }
        }
    }
}

#[test]
fn test_read_timeout_applies_per_read_not_per_exchange() {
    init_tracing();
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();

    let server = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        read_request(&mut stream);

        let body = br#"{"result":"granted"}"#;
        let head = format!(
            "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n",
            body.len()
        );
        stream.write_all(head.as_bytes()).unwrap();
        stream.flush().unwrap();

        // 20 bytes in 3-byte pieces, 100ms apart: 700ms in total, no gap
        // anywhere near the read timeout.
        for piece in body.chunks(3) {
            thread::sleep(Duration::from_millis(100));
            stream.write_all(piece).unwrap();
            stream.flush().unwrap();
        }
    });

    let client = Client::builder()
        .env_source(HashMap::new())
        .hostname("127.0.0.1")
        .port(port)
        .read_timeout(Duration::from_millis(300))
        .retry_max_attempts(1)
        .build()
        .unwrap();

    let start = Instant::now();
    let tree = client.get_json_response(&json!({})).unwrap();

    assert!(start.elapsed() >= Duration::from_millis(600));
    assert_eq!(tree["result"], "granted");
    server.join().unwrap();
}

#[test]
fn test_each_attempt_is_a_single_request_on_the_wire() {
    init_tracing();
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let accepted = Arc::new(AtomicUsize::new(0));

    let counter = accepted.clone();
    thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(mut stream) = stream else { break };
            counter.fetch_add(1, Ordering::SeqCst);
            // Hang up after the request arrives, without answering.
            read_request(&mut stream);
        }
    });

    let client = Client::builder()
        .env_source(HashMap::new())
        .hostname("127.0.0.1")
        .port(port)
        .retry_max_attempts(2)
        .retry_backoff(Duration::from_millis(5))
        .build()
        .unwrap();

    let err = client.get_json_response(&json!({})).unwrap_err();

    assert!(matches!(err, Error::Transport { attempts: 2, .. }));
    assert_eq!(accepted.load(Ordering::SeqCst), 2);
}
