//! Shared test helpers: a mocked LM Studio server.

#![allow(dead_code)]

use std::time::Duration;

use lmbridge::config::Settings;
use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const COMPLETIONS_PATH: &str = "/v1/chat/completions";

/// Base URL in the same shape LM Studio uses (`.../v1`).
pub fn base_url(server: &MockServer) -> String {
    format!("{}/v1", server.uri())
}

/// Settings pointing the `local_llm` section at the mock server.
pub fn settings_for(server: &MockServer) -> Settings {
    let mut settings = Settings::new();
    settings.set("local_llm", "lmstudio_url", base_url(server));
    settings
}

/// A chat completion response body with a single choice.
pub fn completion_body(text: &str) -> Value {
    json!({
        "id": "chatcmpl-1",
        "object": "chat.completion",
        "created": 1_700_000_000,
        "model": "mock-model",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": text},
            "finish_reason": "stop"
        }],
        "usage": {"prompt_tokens": 12, "completion_tokens": 8, "total_tokens": 20}
    })
}

/// Answer every completion request with `text`.
pub async fn mount_completion(server: &MockServer, text: &str) {
    Mock::given(method("POST"))
        .and(path(COMPLETIONS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_body(text)))
        .mount(server)
        .await;
}

/// Answer only the next completion request with `text`.
pub async fn mount_completion_once(server: &MockServer, text: &str) {
    Mock::given(method("POST"))
        .and(path(COMPLETIONS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_body(text)))
        .up_to_n_times(1)
        .mount(server)
        .await;
}

/// An SSE body streaming `pieces` and then `[DONE]`.
pub fn sse_body(pieces: &[&str]) -> String {
    let mut body = String::from(": keep-alive\n\n");
    for piece in pieces {
        body.push_str(&sse_event(piece));
    }
    let done = json!({"choices": [{"delta": {}, "finish_reason": "stop"}]});
    body.push_str(&format!("data: {done}\n\n"));
    body.push_str("data: [DONE]\n\n");
    body
}

/// Mount a streaming completion response.
pub async fn mount_stream(server: &MockServer, pieces: &[&str]) {
    Mock::given(method("POST"))
        .and(path(COMPLETIONS_PATH))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(sse_body(pieces), "text/event-stream"),
        )
        .mount(server)
        .await;
}

/// Serve a single streaming response over raw TCP, writing each of `chunks`
/// as its own HTTP chunk. When `finish` is false the connection is closed
/// without the terminating chunk. Returns the base URL.
pub async fn spawn_chunked_server(chunks: Vec<Vec<u8>>, finish: bool) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        read_request(&mut socket).await;

        socket
            .write_all(
                b"HTTP/1.1 200 OK\r\n\
                  Content-Type: text/event-stream\r\n\
                  Transfer-Encoding: chunked\r\n\
                  Connection: close\r\n\r\n",
            )
            .await
            .unwrap();
        for chunk in chunks {
            socket
                .write_all(format!("{:x}\r\n", chunk.len()).as_bytes())
                .await
                .unwrap();
            socket.write_all(&chunk).await.unwrap();
            socket.write_all(b"\r\n").await.unwrap();
            socket.flush().await.unwrap();
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        if finish {
            socket.write_all(b"0\r\n\r\n").await.unwrap();
        }
        let _ = socket.shutdown().await;
    });

    format!("http://{addr}/v1")
}

/// Consume the request headers and its `Content-Length` body.
async fn read_request(socket: &mut TcpStream) {
    let mut received = Vec::new();
    let mut buf = [0u8; 4096];
    loop {
        let n = socket.read(&mut buf).await.unwrap();
        if n == 0 {
            return;
        }
        received.extend_from_slice(&buf[..n]);
        let Some(header_end) = received.windows(4).position(|w| w == b"\r\n\r\n") else {
            continue;
        };
        let headers = String::from_utf8_lossy(&received[..header_end]).to_ascii_lowercase();
        let content_length = headers
            .lines()
            .find_map(|line| line.strip_prefix("content-length:"))
            .and_then(|v| v.trim().parse::<usize>().ok())
            .unwrap_or(0);
        if received.len() >= header_end + 4 + content_length {
            return;
        }
    }
}

/// One SSE `data:` event carrying a content delta.
pub fn sse_event(content: &str) -> String {
    let chunk = json!({"choices": [{"delta": {"content": content}, "finish_reason": null}]});
    format!("data: {chunk}\n\n")
}

/// JSON bodies of every request the server has seen.
pub async fn request_bodies(server: &MockServer) -> Vec<Value> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .map(|req| req.body_json::<Value>().expect("request body is JSON"))
        .collect()
}
