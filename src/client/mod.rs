//! OpenAI-compatible chat completions client.
//!
//! Works against any server exposing `/chat/completions` in the OpenAI shape;
//! LM Studio is the main target.

pub mod http;

use std::time::Duration;

use futures::stream::BoxStream;
use futures::StreamExt;
use reqwest::Url;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::{BridgeError, Result};
use crate::types::*;

use self::http::{bearer_headers, parse_sse_data, status_to_error};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// A single chat completion request.
#[derive(Debug, Clone)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub settings: GenerationSettings,
    pub response_format: Option<ResponseFormat>,
}

impl ChatCompletionRequest {
    pub fn new(model: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
            settings: GenerationSettings::default(),
            response_format: None,
        }
    }

    pub fn with_settings(mut self, settings: GenerationSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_response_format(mut self, format: ResponseFormat) -> Self {
        self.response_format = Some(format);
        self
    }
}

/// Result of a non-streaming completion.
#[derive(Debug, Clone)]
pub struct ChatCompletion {
    pub text: String,
    pub model: Option<String>,
    pub usage: Usage,
    pub finish_reason: Option<FinishReason>,
}

/// HTTP client bound to one OpenAI-compatible server.
///
/// Building a client performs no I/O; connections are opened on the first
/// request.
#[derive(Debug, Clone)]
pub struct ChatClient {
    http: reqwest::Client,
    base_url: String,
}

impl ChatClient {
    pub fn new(base_url: impl Into<String>, api_key: &str) -> Result<Self> {
        let base_url = base_url.into();
        let parsed = Url::parse(&base_url).map_err(|e| BridgeError::InvalidUrl {
            url: base_url.clone(),
            message: e.to_string(),
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(BridgeError::InvalidUrl {
                url: base_url,
                message: format!("unsupported scheme '{}'", parsed.scheme()),
            });
        }

        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .pool_max_idle_per_host(10)
            .default_headers(bearer_headers(api_key)?)
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    /// Issue a non-streaming completion.
    pub async fn create(&self, request: &ChatCompletionRequest) -> Result<ChatCompletion> {
        let body = build_request_body(request, false);

        debug!(
            model = %request.model,
            messages = request.messages.len(),
            "chat completion"
        );

        let resp = self
            .http
            .post(self.completions_url())
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        let body_text = resp.text().await?;
        if !status.is_success() {
            return Err(status_to_error(status.as_u16(), &body_text));
        }

        let data: ChatResponse = serde_json::from_str(&body_text)?;
        let choice = data
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| BridgeError::api(status.as_u16(), "No choices in completion response"))?;

        Ok(ChatCompletion {
            text: choice.message.content.unwrap_or_default(),
            model: data.model,
            usage: data.usage.map(Usage::from).unwrap_or_default(),
            finish_reason: choice.finish_reason.as_deref().and_then(parse_finish_reason),
        })
    }

    /// Issue a streaming completion, yielding text deltas as they arrive.
    pub async fn create_stream(
        &self,
        request: &ChatCompletionRequest,
    ) -> Result<BoxStream<'static, Result<TextStreamDelta>>> {
        let body = build_request_body(request, true);

        debug!(model = %request.model, "streaming chat completion");

        let resp = self
            .http
            .post(self.completions_url())
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body_text = resp.text().await.unwrap_or_default();
            return Err(status_to_error(status.as_u16(), &body_text));
        }

        let byte_stream = resp.bytes_stream();

        let stream = async_stream::stream! {
            // Raw bytes: a multi-byte character may straddle two network chunks.
            let mut buffer: Vec<u8> = Vec::new();
            futures::pin_mut!(byte_stream);

            while let Some(chunk_result) = byte_stream.next().await {
                let chunk = match chunk_result {
                    Ok(c) => c,
                    Err(e) => {
                        yield Err(BridgeError::Network(e));
                        return;
                    }
                };

                buffer.extend_from_slice(&chunk);

                while let Some(line_end) = buffer.iter().position(|&b| b == b'\n') {
                    let line: Vec<u8> = buffer.drain(..=line_end).collect();
                    if let Some(delta) = parse_sse_line(&line) {
                        yield Ok(delta);
                    }
                }
            }

            // Final line without a trailing newline.
            if let Some(delta) = parse_sse_line(&buffer) {
                yield Ok(delta);
            }
        };

        Ok(Box::pin(stream))
    }
}

fn build_request_body(request: &ChatCompletionRequest, stream: bool) -> serde_json::Value {
    let messages: Vec<serde_json::Value> =
        request.messages.iter().map(ChatMessage::to_openai).collect();

    let mut obj = serde_json::Map::new();
    obj.insert("model".into(), request.model.clone().into());
    obj.insert("messages".into(), messages.into());
    obj.insert("stream".into(), stream.into());

    let settings = &request.settings;
    if let Some(max) = settings.max_tokens {
        obj.insert("max_tokens".into(), max.into());
    }
    if let Some(temp) = settings.temperature {
        obj.insert("temperature".into(), temp.into());
    }
    if let Some(top_p) = settings.top_p {
        obj.insert("top_p".into(), top_p.into());
    }
    if let Some(ref stops) = settings.stop_sequences {
        obj.insert("stop".into(), serde_json::json!(stops));
    }
    if let Some(pp) = settings.presence_penalty {
        obj.insert("presence_penalty".into(), pp.into());
    }
    if let Some(fp) = settings.frequency_penalty {
        obj.insert("frequency_penalty".into(), fp.into());
    }
    if let Some(seed) = settings.seed {
        obj.insert("seed".into(), seed.into());
    }

    match request.response_format {
        Some(ResponseFormat::JsonObject) => {
            obj.insert(
                "response_format".into(),
                serde_json::json!({"type": "json_object"}),
            );
        }
        Some(ResponseFormat::JsonSchema {
            ref schema,
            ref name,
        }) => {
            obj.insert(
                "response_format".into(),
                serde_json::json!({
                    "type": "json_schema",
                    "json_schema": {
                        "name": name,
                        "schema": schema,
                        "strict": true,
                    }
                }),
            );
        }
        Some(ResponseFormat::Text) | None => {}
    }

    serde_json::Value::Object(obj)
}

/// Decode one complete SSE line into a delta, if it carries one.
fn parse_sse_line(raw: &[u8]) -> Option<TextStreamDelta> {
    let line = String::from_utf8_lossy(raw);
    let line = line.trim();
    if line.is_empty() || line.starts_with(':') {
        return None;
    }

    let data = parse_sse_data(line)?;
    match serde_json::from_str::<StreamChunk>(data) {
        Ok(chunk) => chunk.into_delta(),
        Err(e) => {
            warn!(error = %e, "skipping unparseable stream chunk");
            None
        }
    }
}

fn parse_finish_reason(s: &str) -> Option<FinishReason> {
    s.parse().ok()
}

// Wire types (internal)

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    model: Option<String>,
    choices: Vec<ChatChoice>,
    usage: Option<WireUsage>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: WireMessage,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct WireMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct WireUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

impl From<WireUsage> for Usage {
    fn from(u: WireUsage) -> Self {
        Usage {
            input_tokens: u.prompt_tokens,
            output_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        }
    }
}

#[derive(Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    usage: Option<WireUsage>,
}

#[derive(Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct StreamDelta {
    content: Option<String>,
}

impl StreamChunk {
    fn into_delta(self) -> Option<TextStreamDelta> {
        let usage = self.usage.map(Usage::from);
        let choice = self.choices.into_iter().next()?;
        let finish_reason = choice.finish_reason.as_deref().and_then(parse_finish_reason);
        let event_type = if finish_reason.is_some() {
            StreamEventType::Done
        } else {
            StreamEventType::TextDelta
        };
        Some(TextStreamDelta {
            text: choice.delta.content.unwrap_or_default(),
            event_type,
            finish_reason,
            usage,
        })
    }
}
