//! Error types for the Dossier core.
//!
//! Uses `thiserror` for public API error types with structured variants
//! covering the LLM, tool, configuration, and research-pipeline domains.

use std::path::PathBuf;

/// Top-level error type for the Dossier core library.
#[derive(Debug, thiserror::Error)]
pub enum DossierError {
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Research error: {0}")]
    Research(#[from] ResearchError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors from LLM provider interactions.
#[derive(Debug, Clone, thiserror::Error)]
pub enum LlmError {
    #[error("API request failed: {message}")]
    ApiRequest { message: String },

    #[error("API response parse error: {message}")]
    ResponseParse { message: String },

    #[error("Context window exceeded: used {used} of {limit} tokens")]
    ContextOverflow { used: usize, limit: usize },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("Provider connection failed: {message}")]
    Connection { message: String },

    #[error("Provider returned an empty completion")]
    EmptyCompletion,
}

/// Errors from research tool registration and execution.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ToolError {
    #[error("Tool not found: {name}")]
    NotFound { name: String },

    #[error("Tool already registered: {name}")]
    AlreadyRegistered { name: String },

    #[error("Invalid arguments for tool '{name}': {reason}")]
    InvalidArguments { name: String, reason: String },

    #[error("Tool '{name}' execution failed: {message}")]
    ExecutionFailed { name: String, message: String },

    #[error("Tool '{name}' timed out after {timeout_secs}s")]
    Timeout { name: String, timeout_secs: u64 },

    #[error("Tool '{name}' is not configured: {reason}")]
    NotConfigured { name: String, reason: String },
}

impl ToolError {
    /// The short reason used in `"<tool> failed: <reason>"` notes.
    pub fn reason(&self) -> String {
        match self {
            ToolError::NotFound { .. } => "unknown tool".to_string(),
            ToolError::AlreadyRegistered { .. } => "duplicate registration".to_string(),
            ToolError::InvalidArguments { reason, .. } => reason.clone(),
            ToolError::ExecutionFailed { message, .. } => message.clone(),
            ToolError::Timeout { timeout_secs, .. } => format!("timed out after {timeout_secs}s"),
            ToolError::NotConfigured { reason, .. } => reason.clone(),
        }
    }
}

/// Errors from the configuration system.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Environment variable not set: {var}")]
    EnvVarMissing { var: String },

    #[error("Configuration parse error: {message}")]
    ParseError { message: String },
}

/// Errors raised by the research pipeline itself.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ResearchError {
    #[error("Brief compilation failed: {source}")]
    BriefCompilation {
        #[source]
        source: LlmError,
    },

    #[error("Report synthesis failed: {source}")]
    Synthesis {
        #[source]
        source: LlmError,
    },

    #[error("Research task for '{group}' failed: {reason}")]
    TaskFailed { group: String, reason: String },

    #[error("Research brief is empty")]
    EmptyBrief,
}

/// A type alias for results using the top-level `DossierError`.
pub type Result<T> = std::result::Result<T, DossierError>;
