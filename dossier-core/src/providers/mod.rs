//! LLM provider implementations.
//!
//! Dossier talks to any endpoint that follows the OpenAI chat completions
//! format (OpenAI, Azure, Ollama, vLLM, LM Studio). Use `create_provider()`
//! to instantiate the provider from config.

pub mod openai_compat;

use crate::brain::LlmProvider;
use crate::config::LlmConfig;
use crate::error::LlmError;
use std::sync::Arc;

pub use openai_compat::OpenAiCompatibleProvider;

/// Build the provider named by `config.provider`.
pub fn create_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    match config.provider.as_str() {
        "openai" | "local" | "ollama" | "vllm" | "azure" => {
            Ok(Arc::new(OpenAiCompatibleProvider::new(config)?))
        }
        other => Err(LlmError::ApiRequest {
            message: format!("Unsupported LLM provider '{other}'"),
        }),
    }
}
