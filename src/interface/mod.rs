//! Shared LLM interface used by the assistant framework.
//!
//! [`LlmInterfaceBase`] holds what every backend hands over at construction:
//! the conversation history, the chat and function-calling model names, the
//! raw chat client and the structured completion capability. The
//! [`LlmInterface`] trait issues requests on top of that state; backends only
//! provide [`LlmInterface::base`].

pub mod lmstudio;

pub use lmstudio::LmStudioInterface;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::client::{ChatClient, ChatCompletion, ChatCompletionRequest};
use crate::error::Result;
use crate::history::History;
use crate::structured::{StructuredCompletion, StructuredRequest};
use crate::types::{ChatMessage, GenerationSettings};

/// State shared by every LLM backend.
#[derive(Clone)]
pub struct LlmInterfaceBase {
    history: History,
    model_name: String,
    function_calling_model_name: String,
    client: Arc<ChatClient>,
    structured: Arc<dyn StructuredCompletion>,
    settings: GenerationSettings,
}

impl fmt::Debug for LlmInterfaceBase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LlmInterfaceBase")
            .field("history_len", &self.history.len())
            .field("model_name", &self.model_name)
            .field("function_calling_model_name", &self.function_calling_model_name)
            .field("client", &self.client.base_url())
            .field("structured", &self.structured.mode())
            .field("settings", &self.settings)
            .finish()
    }
}

impl LlmInterfaceBase {
    pub fn new(
        history: History,
        model_name: impl Into<String>,
        function_calling_model_name: impl Into<String>,
        client: Arc<ChatClient>,
        structured: Arc<dyn StructuredCompletion>,
    ) -> Self {
        Self {
            history,
            model_name: model_name.into(),
            function_calling_model_name: function_calling_model_name.into(),
            client,
            structured,
            settings: GenerationSettings::default(),
        }
    }

    /// Generation settings applied to every request.
    pub fn with_settings(mut self, settings: GenerationSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_structured_completion(mut self, structured: Arc<dyn StructuredCompletion>) -> Self {
        self.structured = structured;
        self
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    pub fn function_calling_model_name(&self) -> &str {
        &self.function_calling_model_name
    }

    pub fn client(&self) -> &Arc<ChatClient> {
        &self.client
    }

    pub fn structured_completion(&self) -> &Arc<dyn StructuredCompletion> {
        &self.structured
    }

    pub fn settings(&self) -> &GenerationSettings {
        &self.settings
    }

    fn chat_request(&self, messages: Vec<ChatMessage>) -> ChatCompletionRequest {
        ChatCompletionRequest::new(self.model_name.clone(), messages)
            .with_settings(self.settings.clone())
    }
}

/// Requests every LLM backend supports.
#[async_trait]
pub trait LlmInterface: Send + Sync {
    fn base(&self) -> &LlmInterfaceBase;

    fn model_name(&self) -> &str {
        self.base().model_name()
    }

    fn function_calling_model_name(&self) -> &str {
        self.base().function_calling_model_name()
    }

    fn history(&self) -> &History {
        self.base().history()
    }

    /// One chat request with the given messages; history is not touched.
    async fn complete(&self, messages: Vec<ChatMessage>) -> Result<ChatCompletion> {
        let base = self.base();
        base.client.create(&base.chat_request(messages)).await
    }

    /// Add `prompt` to the history, ask the chat model and record its reply.
    ///
    /// On failure the user message stays in the history.
    async fn generate(&self, prompt: &str) -> Result<String> {
        let base = self.base();
        base.history.push(ChatMessage::user(prompt));
        debug!(model = %base.model_name, turns = base.history.len(), "generate");

        let completion = self.complete(base.history.snapshot()).await?;
        base.history
            .push(ChatMessage::assistant(completion.text.clone()));
        Ok(completion.text)
    }

    /// Streaming variant of [`LlmInterface::generate`]. The assistant reply is
    /// recorded once the stream ends without error.
    async fn stream_generate(&self, prompt: &str) -> Result<BoxStream<'static, Result<String>>> {
        let base = self.base();
        base.history.push(ChatMessage::user(prompt));
        debug!(model = %base.model_name, turns = base.history.len(), "stream_generate");

        let mut deltas = base
            .client
            .create_stream(&base.chat_request(base.history.snapshot()))
            .await?;
        let history = base.history.clone();

        let stream = async_stream::stream! {
            let mut reply = String::new();
            let mut failed = false;
            while let Some(item) = deltas.next().await {
                match item {
                    Ok(delta) => {
                        if !delta.text.is_empty() {
                            reply.push_str(&delta.text);
                            yield Ok(delta.text);
                        }
                    }
                    Err(e) => {
                        failed = true;
                        yield Err(e);
                        break;
                    }
                }
            }
            if !failed {
                history.push(ChatMessage::assistant(reply));
            }
        };

        Ok(Box::pin(stream))
    }

    /// Structured request against the function-calling model.
    async fn structured_value(
        &self,
        messages: Vec<ChatMessage>,
        schema: Value,
        name: &str,
    ) -> Result<Value> {
        let base = self.base();
        let request = StructuredRequest::new(
            base.function_calling_model_name.clone(),
            messages,
            schema,
            name,
        )
        .with_settings(base.settings.clone());
        Ok(base.structured.complete_structured(request).await?.value)
    }
}

impl LlmInterface for LlmInterfaceBase {
    fn base(&self) -> &LlmInterfaceBase {
        self
    }
}

/// Typed structured request: the answer is deserialized into `T`.
pub async fn structured<T, I>(
    interface: &I,
    messages: Vec<ChatMessage>,
    schema: Value,
    name: &str,
) -> Result<T>
where
    T: DeserializeOwned,
    I: LlmInterface + ?Sized,
{
    let value = interface.structured_value(messages, schema, name).await?;
    Ok(serde_json::from_value(value)?)
}
