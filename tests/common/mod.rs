//! Shared mock servers for integration tests.
//!
//! Both mocks speak just enough HTTP/1.1 over raw TCP: read the request head
//! and `Content-Length` body, answer, close the connection.

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use inference_bench::config::BenchConfig;
use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// Parsed request head.
#[derive(Debug, Clone)]
pub struct ReceivedRequest {
    pub method: String,
    pub path: String,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

async fn read_request(socket: &mut TcpStream) -> Option<ReceivedRequest> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let head_end = loop {
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
    };

    let head = String::from_utf8_lossy(&buf[..head_end]).to_string();
    let mut lines = head.split("\r\n");
    let mut request_line = lines.next()?.split_whitespace();
    let method = request_line.next()?.to_string();
    let path = request_line.next()?.to_string();
    let headers: HashMap<String, String> = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(k, v)| (k.trim().to_ascii_lowercase(), v.trim().to_string()))
        .collect();

    let length: usize = headers
        .get("content-length")
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);
    let mut body = buf[head_end..].to_vec();
    while body.len() < length {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            break;
        }
        body.extend_from_slice(&chunk[..n]);
    }

    Some(ReceivedRequest {
        method,
        path,
        headers,
        body,
    })
}

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        404 => "Not Found",
        429 => "Too Many Requests",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        _ => "Unknown",
    }
}

async fn write_plain(socket: &mut TcpStream, status: u16, content_type: &str, body: &str) {
    let response = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        reason(status),
        content_type,
        body.len(),
        body
    );
    let _ = socket.write_all(response.as_bytes()).await;
    let _ = socket.shutdown().await;
}

/// Content chunk in the OpenAI streaming format.
pub fn content_chunk(text: &str) -> String {
    json!({
        "id": "chatcmpl-mock",
        "object": "chat.completion.chunk",
        "created": 0,
        "model": "mock-model",
        "choices": [{"index": 0, "delta": {"content": text}, "finish_reason": null}]
    })
    .to_string()
}

/// Final usage-only chunk.
pub fn usage_chunk(prompt_tokens: u64, completion_tokens: u64) -> String {
    json!({
        "id": "chatcmpl-mock",
        "object": "chat.completion.chunk",
        "created": 0,
        "model": "mock-model",
        "choices": [],
        "usage": {
            "prompt_tokens": prompt_tokens,
            "completion_tokens": completion_tokens,
            "total_tokens": prompt_tokens + completion_tokens
        }
    })
    .to_string()
}

/// What the mock inference server does with every request.
#[derive(Debug, Clone)]
pub enum Behavior {
    /// Send `chunks` as `data:` events, `delay` before each, then `[DONE]`
    /// if `done` is set. Without `done` the connection just closes.
    Stream {
        chunks: Vec<String>,
        delay: Duration,
        done: bool,
    },
    /// Answer with a plain status and body.
    Status(u16, String),
}

impl Behavior {
    /// `units` content chunks, `delay` apart, properly terminated.
    pub fn units(units: usize, delay: Duration) -> Self {
        Behavior::Stream {
            chunks: (0..units).map(|i| content_chunk(&format!("tok{} ", i))).collect(),
            delay,
            done: true,
        }
    }
}

pub struct MockInference {
    pub addr: SocketAddr,
    pub requests: Arc<Mutex<Vec<ReceivedRequest>>>,
}

impl MockInference {
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn traceparents(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter_map(|r| r.headers.get("traceparent").cloned())
            .collect()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

async fn serve_inference(mut socket: TcpStream, behavior: Behavior, log: Arc<Mutex<Vec<ReceivedRequest>>>) {
    let Some(request) = read_request(&mut socket).await else {
        return;
    };
    log.lock().unwrap().push(request);

    match behavior {
        Behavior::Status(status, body) => write_plain(&mut socket, status, "text/plain", &body).await,
        Behavior::Stream { chunks, delay, done } => {
            let head = "HTTP/1.1 200 OK\r\nContent-Type: text/event-stream\r\nCache-Control: no-cache\r\nConnection: close\r\n\r\n";
            if socket.write_all(head.as_bytes()).await.is_err() {
                return;
            }
            for chunk in chunks {
                tokio::time::sleep(delay).await;
                let event = format!("data: {}\n\n", chunk);
                if socket.write_all(event.as_bytes()).await.is_err() {
                    return;
                }
                let _ = socket.flush().await;
            }
            if done {
                let _ = socket.write_all(b"data: [DONE]\n\n").await;
            }
            let _ = socket.shutdown().await;
        }
    }
}

/// Start a mock streaming chat-completions server on an ephemeral port.
pub async fn start_mock_inference(behavior: Behavior) -> MockInference {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let requests = Arc::new(Mutex::new(Vec::new()));
    let log = requests.clone();

    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            tokio::spawn(serve_inference(socket, behavior.clone(), log.clone()));
        }
    });

    MockInference { addr, requests }
}

/// Mock Jaeger query API.
pub struct MockJaeger {
    pub addr: SocketAddr,
    /// Lookups per trace id.
    pub lookups: Arc<Mutex<HashMap<String, u32>>>,
    pub total_lookups: Arc<AtomicU32>,
}

impl MockJaeger {
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn total_lookups(&self) -> u32 {
        self.total_lookups.load(Ordering::SeqCst)
    }

    pub fn queried_trace_ids(&self) -> Vec<String> {
        self.lookups.lock().unwrap().keys().cloned().collect()
    }
}

/// Start a mock Jaeger that answers 404 for a trace until its
/// `ready_after`-th lookup, then returns one `llm_request` span with `tags`.
/// `None` never finds anything.
pub async fn start_mock_jaeger(ready_after: Option<u32>, tags: Vec<(&str, Value)>) -> MockJaeger {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let lookups = Arc::new(Mutex::new(HashMap::<String, u32>::new()));
    let total_lookups = Arc::new(AtomicU32::new(0));
    let tags: Vec<Value> = tags
        .into_iter()
        .map(|(key, value)| json!({"key": key, "type": "float64", "value": value}))
        .collect();

    let (lookup_log, total) = (lookups.clone(), total_lookups.clone());
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let lookups = lookup_log.clone();
            let total = total.clone();
            let tags = tags.clone();
            tokio::spawn(async move {
                let Some(request) = read_request(&mut socket).await else {
                    return;
                };
                let Some(trace_id) = request.path.strip_prefix("/api/traces/") else {
                    write_plain(&mut socket, 404, "application/json", "{}").await;
                    return;
                };
                total.fetch_add(1, Ordering::SeqCst);
                let seen = {
                    let mut map = lookups.lock().unwrap();
                    let count = map.entry(trace_id.to_string()).or_insert(0);
                    *count += 1;
                    *count
                };

                match ready_after {
                    Some(ready) if seen >= ready => {
                        let body = json!({
                            "data": [{
                                "traceID": trace_id,
                                "spans": [
                                    {"operationName": "http_request", "tags": []},
                                    {"operationName": "llm_request", "tags": tags}
                                ]
                            }]
                        });
                        write_plain(&mut socket, 200, "application/json", &body.to_string()).await;
                    }
                    _ => {
                        let body = json!({"data": null, "errors": [{"code": 404, "msg": "trace not found"}]});
                        write_plain(&mut socket, 404, "application/json", &body.to_string()).await;
                    }
                }
            });
        }
    });

    MockJaeger {
        addr,
        lookups,
        total_lookups,
    }
}

/// Config pointing at `inference`, with the span store disabled.
pub fn bench_config(inference: &MockInference, request_count: u64) -> BenchConfig {
    let mut config = BenchConfig::default();
    config.target.base_url = inference.base_url();
    config.load.request_count = Some(request_count);
    config.load.request_timeout_ms = 10_000;
    config.load.progress_interval_secs = 0;
    config.span_store.enabled = false;
    config.workload.prompts = vec!["Explain the KV cache.".into()];
    config
}

/// Enable the span store against `jaeger` with short timings.
pub fn with_span_store(mut config: BenchConfig, jaeger: &MockJaeger, timeout_ms: u64) -> BenchConfig {
    config.span_store.enabled = true;
    config.span_store.base_url = jaeger.base_url();
    config.span_store.timeout_ms = timeout_ms;
    config.span_store.initial_backoff_ms = 20;
    config.span_store.max_backoff_ms = 100;
    config
}
