//! Convenience re-exports for common use.

pub use crate::client::{ChatClient, ChatCompletion, ChatCompletionRequest};
pub use crate::config::{ConfigStore, LocalLlmConfig, Settings};
pub use crate::error::{BridgeError, Result};
pub use crate::history::History;
pub use crate::interface::{structured, LlmInterface, LlmInterfaceBase, LmStudioInterface};
pub use crate::structured::{
    InstructedCompleter, StructuredCompletion, StructuredMode, StructuredRequest,
    StructuredResponse,
};
pub use crate::types::{ChatMessage, FinishReason, GenerationSettings, Role, Usage};
