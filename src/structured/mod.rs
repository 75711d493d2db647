//! Structured output: coerce chat completions into JSON matching a schema.
//!
//! [`InstructedCompleter`] wraps a [`ChatClient`] and implements
//! [`StructuredCompletion`]. It tells the model which schema to follow, pulls
//! the JSON out of the answer, validates it and asks again when the answer is
//! unusable.

pub mod extract;
pub mod validate;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use strum::{Display, EnumString};
use tracing::{debug, warn};

use crate::client::{ChatClient, ChatCompletionRequest};
use crate::error::{BridgeError, Result};
use crate::types::{ChatMessage, GenerationSettings, ResponseFormat, Role, Usage};

pub use extract::extract_json;
pub use validate::SchemaValidator;

/// How the model is asked to produce structured data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum StructuredMode {
    /// Prompt for a ```json fenced block and parse it out of the text.
    #[default]
    MdJson,
    /// Request `response_format: json_object`.
    Json,
    /// Request `response_format: json_schema` with the schema attached.
    JsonSchema,
}

/// A structured completion request.
#[derive(Debug, Clone)]
pub struct StructuredRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub schema: Value,
    /// Schema name, shown to the model and sent with `json_schema` requests.
    pub name: String,
    pub settings: GenerationSettings,
}

impl StructuredRequest {
    pub fn new(
        model: impl Into<String>,
        messages: Vec<ChatMessage>,
        schema: Value,
        name: impl Into<String>,
    ) -> Self {
        Self {
            model: model.into(),
            messages,
            schema,
            name: name.into(),
            settings: GenerationSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: GenerationSettings) -> Self {
        self.settings = settings;
        self
    }
}

/// A parsed structured answer.
#[derive(Debug, Clone)]
pub struct StructuredResponse {
    pub value: Value,
    pub raw_text: String,
    /// Usage summed over every attempt.
    pub usage: Usage,
    pub attempts: u32,
}

/// Capability to issue completions whose answers are parsed into JSON.
#[async_trait]
pub trait StructuredCompletion: Send + Sync {
    fn mode(&self) -> StructuredMode;

    async fn complete_structured(&self, request: StructuredRequest) -> Result<StructuredResponse>;
}

/// Structured completion built on top of a plain [`ChatClient`].
pub struct InstructedCompleter {
    client: Arc<ChatClient>,
    mode: StructuredMode,
    max_attempts: u32,
}

impl InstructedCompleter {
    pub fn new(client: Arc<ChatClient>, mode: StructuredMode) -> Self {
        Self {
            client,
            mode,
            max_attempts: 1,
        }
    }

    /// Total attempts, including the first; at least one.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn client(&self) -> &Arc<ChatClient> {
        &self.client
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    fn response_format(&self, request: &StructuredRequest) -> Option<ResponseFormat> {
        match self.mode {
            StructuredMode::MdJson => None,
            StructuredMode::Json => Some(ResponseFormat::JsonObject),
            StructuredMode::JsonSchema => Some(ResponseFormat::JsonSchema {
                schema: request.schema.clone(),
                name: request.name.clone(),
            }),
        }
    }
}

#[async_trait]
impl StructuredCompletion for InstructedCompleter {
    fn mode(&self) -> StructuredMode {
        self.mode
    }

    async fn complete_structured(&self, request: StructuredRequest) -> Result<StructuredResponse> {
        let validator = SchemaValidator::new(&request.schema)?;
        let response_format = self.response_format(&request);
        let mut messages = prepare_messages(self.mode, &request)?;
        let mut usage = Usage::default();
        let mut last_error = None;

        for attempt in 1..=self.max_attempts {
            debug!(
                model = %request.model,
                mode = %self.mode,
                attempt,
                "structured completion"
            );

            let mut chat = ChatCompletionRequest::new(request.model.clone(), messages.clone())
                .with_settings(request.settings.clone());
            if let Some(format) = response_format.clone() {
                chat = chat.with_response_format(format);
            }

            let completion = self.client.create(&chat).await?;
            usage.merge(&completion.usage);

            let parsed = extract_json(&completion.text)
                .and_then(|value| validator.validate(&value).map(|()| value));
            match parsed {
                Ok(value) => {
                    return Ok(StructuredResponse {
                        value,
                        raw_text: completion.text,
                        usage,
                        attempts: attempt,
                    })
                }
                Err(e) if e.is_reaskable() => {
                    warn!(attempt, max_attempts = self.max_attempts, error = %e, "structured answer rejected");
                    messages.push(ChatMessage::assistant(completion.text));
                    messages.push(ChatMessage::user(reask_prompt(self.mode, &e)));
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(BridgeError::StructuredOutput {
            attempts: self.max_attempts,
            message: last_error.map(|e| failure_detail(&e)).unwrap_or_default(),
        })
    }
}

/// Add the schema instruction (and, for fenced mode, the closing request).
fn prepare_messages(mode: StructuredMode, request: &StructuredRequest) -> Result<Vec<ChatMessage>> {
    let mut messages = request.messages.clone();
    if mode == StructuredMode::JsonSchema {
        return Ok(messages);
    }

    let instruction = format!(
        "Answer with a JSON instance of the `{}` schema below. Return the data itself, not the schema.\n\n{}",
        request.name,
        serde_json::to_string_pretty(&request.schema)?
    );
    match messages.first_mut() {
        Some(first) if first.role == Role::System => {
            first.content = format!("{}\n\n{instruction}", first.content);
        }
        _ => messages.insert(0, ChatMessage::system(instruction)),
    }

    if mode == StructuredMode::MdJson {
        messages.push(ChatMessage::user(format!(
            "Reply with the `{}` JSON inside a ```json code block.",
            request.name
        )));
    }
    Ok(messages)
}

fn reask_prompt(mode: StructuredMode, err: &BridgeError) -> String {
    let detail = failure_detail(err);
    match mode {
        StructuredMode::MdJson => format!(
            "That answer could not be used: {detail}. Reply again with only the corrected JSON inside a ```json code block."
        ),
        StructuredMode::Json | StructuredMode::JsonSchema => format!(
            "That answer could not be used: {detail}. Reply again with only the corrected JSON."
        ),
    }
}

fn failure_detail(err: &BridgeError) -> String {
    match err {
        BridgeError::StructuredOutput { message, .. } => message.clone(),
        other => other.to_string(),
    }
}
