//! # Dossier Core
//!
//! Core library for Dossier, a research orchestrator that turns a short
//! query about a company, person or project into a cited long-form report.
//! Provides the LLM interface (brain), provider implementations, research
//! tool contracts, configuration, and the research pipeline itself.

pub mod brain;
pub mod config;
pub mod error;
pub mod providers;
pub mod research;
pub mod tools;
pub mod types;

// Re-export commonly used types at the crate root.
pub use brain::{Brain, LlmProvider, MockLlmProvider};
pub use config::{DossierConfig, GroupMergePolicy, ResearchConfig, SourcePrunePolicy, ToolsConfig};
pub use error::{ConfigError, DossierError, LlmError, ResearchError, Result, ToolError};
pub use research::{
    PipelineObserver, Report, ReportStatus, ResearchPipeline, RunOutcome, RunRequest, RunStage,
    RunSummary,
};
pub use tools::{EntityResolver, NoopResolver, ResearchTool, ToolRegistry};
pub use types::{
    CompletionRequest, CompletionResponse, Content, Message, Role, SourceRef, SubjectType,
    TokenUsage, ToolDefinition, ToolOutput,
};
