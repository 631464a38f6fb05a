// Shared helpers for relay integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use http_body_util::BodyExt;
use nebula_relay::auth::TokenProvider;
use nebula_relay::config::RelayConfig;
use nebula_relay::server::{create_router, RelayServer};
use nebula_relay::usage::{UsageLogger, UsageRecord};
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tower::ServiceExt;

pub const CONFIG_STATE_ID: &str = "cfg-test";
pub const NEW_CONVERSATION_PATH: &str = "/api/internal/configStates/cfg-test/conversations";

pub fn segments_path(conversation_id: &str) -> String {
    format!("{NEW_CONVERSATION_PATH}/{conversation_id}/segments")
}

/// Upstream SSE body: ids event, a status update, then one event per chunk
pub fn sse_body(conversation_id: &str, segment_id: &str, chunks: &[&str]) -> String {
    let ids = format!(
        r#"{{"ConversationId":"{conversation_id}","ConversationSegmentId":"{segment_id}"}}"#
    );
    let mut body = format!(
        "event: conversation-and-segment-id\ndata: {}\n\nevent: step-update\ndata: {}\n\n",
        STANDARD.encode(ids),
        STANDARD.encode("Thinking"),
    );
    for chunk in chunks {
        body.push_str(&format!(
            "event: response-updated\ndata: {}\n\n",
            STANDARD.encode(chunk)
        ));
    }
    body
}

/// Token provider stub that hands out a fixed token and counts calls
pub struct StubProvider {
    token: Option<String>,
    calls: AtomicUsize,
}

impl StubProvider {
    pub fn returning(token: &str) -> Arc<Self> {
        Arc::new(Self {
            token: Some(token.to_string()),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            token: None,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenProvider for StubProvider {
    async fn obtain_fresh_token(&self) -> anyhow::Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.token
            .clone()
            .ok_or_else(|| anyhow::anyhow!("browser login failed"))
    }
}

pub struct TestRelay {
    pub server: Arc<RelayServer>,
    pub router: Router,
    pub usage_path: PathBuf,
    pub env_path: PathBuf,
    _dir: TempDir,
}

impl TestRelay {
    pub fn new(
        base_url: &str,
        token: Option<&str>,
        provider: Option<Arc<dyn TokenProvider>>,
        extra: &[(&str, &str)],
    ) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let usage_path = dir.path().join("usage.csv");
        let env_path = dir.path().join(".env");

        let mut vars: HashMap<String, String> = HashMap::new();
        vars.insert("NEBULA_BASE_URL".into(), base_url.to_string());
        vars.insert("NEBULA_CONFIG_STATE_ID".into(), CONFIG_STATE_ID.into());
        vars.insert("RELAY_USAGE_LOG".into(), usage_path.display().to_string());
        vars.insert("RELAY_ENV_FILE".into(), env_path.display().to_string());
        if let Some(token) = token {
            vars.insert("NEBULA_AUTH_TOKEN".into(), token.to_string());
        }
        for (key, value) in extra {
            vars.insert(key.to_string(), value.to_string());
        }

        let config = RelayConfig::from_lookup(|key| vars.get(key).cloned()).unwrap();
        let server = Arc::new(RelayServer::new(config, provider).unwrap());
        let router = create_router(Arc::clone(&server));

        Self {
            server,
            router,
            usage_path,
            env_path,
            _dir: dir,
        }
    }

    pub fn usage_records(&self) -> Vec<UsageRecord> {
        UsageLogger::new(self.usage_path.clone())
            .read_records()
            .unwrap()
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, String) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    pub async fn send_json(&self, request: Request<Body>) -> (StatusCode, Value) {
        let (status, body) = self.send(request).await;
        let value = serde_json::from_str(&body)
            .unwrap_or_else(|e| panic!("non-JSON body ({e}): {body}"));
        (status, value)
    }
}

pub fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn post_json_with(uri: &str, body: Value, header: (&str, &str)) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .header(header.0, header.1)
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

/// JSON payloads of every `data:` line in an SSE body
pub fn sse_payloads(body: &str) -> Vec<Value> {
    body.lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|data| serde_json::from_str(data.trim()).unwrap())
        .collect()
}

/// How a hand-rolled upstream answers its single connection
pub enum UpstreamScript {
    /// Send `body` as one chunk, then hold the connection until the relay closes it
    Stall(String),
    /// Send `body` as one chunk, then hang up without finishing the response
    Truncate(String),
    /// Wait, then send `body` as a complete response
    Delay(Duration, String),
}

/// Serve one upstream connection following `script`.
///
/// The receiver fires once the script is done; for `Stall` that is when the
/// relay closed the connection.
pub async fn raw_upstream(script: UpstreamScript) -> (String, oneshot::Receiver<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());
    let (done_tx, done_rx) = oneshot::channel();

    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        read_request(&mut socket).await;

        match script {
            UpstreamScript::Stall(body) => {
                write_chunk(&mut socket, &body).await;
                let mut buf = [0u8; 1024];
                while let Ok(n) = socket.read(&mut buf).await {
                    if n == 0 {
                        break;
                    }
                }
            }
            UpstreamScript::Truncate(body) => {
                write_chunk(&mut socket, &body).await;
                let _ = socket.shutdown().await;
            }
            UpstreamScript::Delay(delay, body) => {
                tokio::time::sleep(delay).await;
                write_chunk(&mut socket, &body).await;
                socket.write_all(b"0\r\n\r\n").await.unwrap();
                let _ = socket.shutdown().await;
            }
        }
        let _ = done_tx.send(());
    });

    (url, done_rx)
}

/// Consume the request head and its Content-Length body
async fn read_request(socket: &mut TcpStream) {
    let mut data = Vec::new();
    let mut buf = [0u8; 4096];
    loop {
        let n = socket.read(&mut buf).await.unwrap();
        if n == 0 {
            return;
        }
        data.extend_from_slice(&buf[..n]);

        if let Some(end) = data.windows(4).position(|w| w == b"\r\n\r\n") {
            let head = String::from_utf8_lossy(&data[..end]).to_ascii_lowercase();
            let content_length = head
                .lines()
                .find_map(|line| line.strip_prefix("content-length:"))
                .and_then(|value| value.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if data.len() >= end + 4 + content_length {
                return;
            }
        }
    }
}

/// Response head plus `body` as the first chunk of a chunked SSE body
async fn write_chunk(socket: &mut TcpStream, body: &str) {
    let response = format!(
        "HTTP/1.1 200 OK\r\ncontent-type: text/event-stream\r\ntransfer-encoding: chunked\r\n\r\n{:x}\r\n{}\r\n",
        body.len(),
        body
    );
    socket.write_all(response.as_bytes()).await.unwrap();
    socket.flush().await.unwrap();
}
