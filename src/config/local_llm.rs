//! Resolved settings for the local LM Studio server.

use serde::{Deserialize, Serialize};

use super::{ConfigStore, LOCAL_LLM_SECTION};
use crate::error::Result;

/// Model used for chat when nothing is configured.
pub const DEFAULT_MODEL_NAME: &str =
    "lmstudio-community/Meta-Llama-3.1-8B-Instruct-GGUF/Meta-Llama-3.1-8B-Instruct-Q8_0.gguf";

/// Model used for structured requests when nothing is configured.
pub const DEFAULT_FUNCTION_CALLING_MODEL_NAME: &str = DEFAULT_MODEL_NAME;

/// LM Studio's default OpenAI-compatible endpoint.
pub const DEFAULT_LMSTUDIO_URL: &str = "http://localhost:1234/v1";

/// The three values the LM Studio adapter needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalLlmConfig {
    pub model_name: String,
    pub function_calling_model_name: String,
    pub lmstudio_url: String,
}

impl Default for LocalLlmConfig {
    fn default() -> Self {
        Self {
            model_name: DEFAULT_MODEL_NAME.to_string(),
            function_calling_model_name: DEFAULT_FUNCTION_CALLING_MODEL_NAME.to_string(),
            lmstudio_url: DEFAULT_LMSTUDIO_URL.to_string(),
        }
    }
}

impl LocalLlmConfig {
    /// Resolve from a config store. A non-empty `model_name` override wins
    /// over the stored chat model name.
    pub fn resolve(store: &dyn ConfigStore, model_name: Option<&str>) -> Result<Self> {
        let model_name = match model_name.filter(|name| !name.is_empty()) {
            Some(name) => name.to_string(),
            None => store.get_or(LOCAL_LLM_SECTION, "model_name", DEFAULT_MODEL_NAME)?,
        };
        let function_calling_model_name = store.get_or(
            LOCAL_LLM_SECTION,
            "function_calling_model_name",
            DEFAULT_FUNCTION_CALLING_MODEL_NAME,
        )?;
        let lmstudio_url = store.get_or(LOCAL_LLM_SECTION, "lmstudio_url", DEFAULT_LMSTUDIO_URL)?;

        Ok(Self {
            model_name,
            function_calling_model_name,
            lmstudio_url,
        })
    }
}
