//! LM Studio backend (local, OpenAI-compatible).

use std::path::Path;
use std::sync::Arc;

use tracing::debug;

use crate::client::ChatClient;
use crate::config::{ConfigStore, LocalLlmConfig};
use crate::error::Result;
use crate::history::History;
use crate::structured::{InstructedCompleter, StructuredMode};
use crate::types::GenerationSettings;

use super::{LlmInterface, LlmInterfaceBase};

/// LM Studio does not check credentials, but the client still sends one.
pub const PLACEHOLDER_API_KEY: &str = "dummy";

/// Interface to a model served by a local LM Studio instance.
#[derive(Debug, Clone)]
pub struct LmStudioInterface {
    base: LlmInterfaceBase,
    config: LocalLlmConfig,
}

impl LmStudioInterface {
    /// Resolve the `local_llm` settings from `config` and build the interface.
    ///
    /// `model_path` is accepted so every backend shares one constructor shape;
    /// LM Studio serves whatever model it has loaded, so it is ignored.
    /// A non-empty `model_name` overrides the configured chat model.
    pub fn new(
        history: History,
        model_path: Option<&Path>,
        model_name: Option<&str>,
        config: &dyn ConfigStore,
    ) -> Result<Self> {
        if let Some(path) = model_path {
            debug!(path = %path.display(), "ignoring model path for LM Studio");
        }
        let resolved = LocalLlmConfig::resolve(config, model_name)?;
        Self::from_config(history, resolved)
    }

    /// Build the interface from already resolved settings.
    pub fn from_config(history: History, config: LocalLlmConfig) -> Result<Self> {
        let client = Arc::new(ChatClient::new(
            config.lmstudio_url.as_str(),
            PLACEHOLDER_API_KEY,
        )?);
        let structured = Arc::new(InstructedCompleter::new(
            Arc::clone(&client),
            StructuredMode::MdJson,
        ));

        debug!(
            url = %config.lmstudio_url,
            model = %config.model_name,
            function_calling_model = %config.function_calling_model_name,
            "LM Studio interface ready"
        );

        let base = LlmInterfaceBase::new(
            history,
            config.model_name.clone(),
            config.function_calling_model_name.clone(),
            client,
            structured,
        );
        Ok(Self { base, config })
    }

    /// Resolved settings this interface was built from.
    pub fn config(&self) -> &LocalLlmConfig {
        &self.config
    }

    /// Generation settings applied to every request.
    pub fn with_settings(mut self, settings: GenerationSettings) -> Self {
        self.base = self.base.with_settings(settings);
        self
    }

    /// Allow re-asking the model when a structured answer does not parse or
    /// validate.
    pub fn with_structured_attempts(mut self, max_attempts: u32) -> Self {
        let completer = InstructedCompleter::new(Arc::clone(self.base.client()), StructuredMode::MdJson)
            .with_max_attempts(max_attempts);
        self.base = self.base.with_structured_completion(Arc::new(completer));
        self
    }
}

impl LlmInterface for LmStudioInterface {
    fn base(&self) -> &LlmInterfaceBase {
        &self.base
    }
}
