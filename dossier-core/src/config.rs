//! Configuration system for Dossier.
//!
//! Uses `figment` for layered configuration: defaults -> config file -> environment -> CLI args.
//! Configuration is loaded from `~/.config/dossier/config.toml` and/or `.dossier/config.toml`
//! in the workspace directory.

use crate::error::ConfigError;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration for a Dossier run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DossierConfig {
    pub llm: LlmConfig,
    pub research: ResearchConfig,
    pub tools: ToolsConfig,
}

/// Configuration for the LLM provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Provider name: "openai" or "local" (any OpenAI-compatible endpoint).
    pub provider: String,
    /// Model identifier (e.g., "gpt-4o").
    pub model: String,
    /// Environment variable name containing the API key.
    pub api_key_env: String,
    /// Optional base URL override for the API endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Maximum tokens to generate in a response.
    pub max_tokens: usize,
    /// Default temperature for generation.
    pub temperature: f32,
    /// Context window size for the model.
    pub context_window: usize,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "gpt-4o".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            base_url: None,
            max_tokens: 8192,
            temperature: 0.3,
            context_window: 128_000,
            timeout_secs: 180,
        }
    }
}

/// How question groups beyond the cap are folded together.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupMergePolicy {
    /// Repeatedly merge the adjacent pair with the smallest combined length.
    #[default]
    MergeSmallest,
    /// Fold every overflow group into the last group that fits under the cap.
    FoldTail,
}

/// Which sources survive when a run collects more than `max_sources`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourcePrunePolicy {
    /// Keep the sources cited most often in the findings; ties keep the earlier one.
    #[default]
    MostCited,
    /// Keep the earliest-seen sources.
    FirstSeen,
}

/// Limits and switches for one research run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResearchConfig {
    /// Whether the clarification gate may stop the run with a question.
    pub clarification_enabled: bool,
    /// Upper bound on planned question groups.
    pub max_question_groups: usize,
    /// Policy applied when planning yields more groups than the cap.
    pub group_merge_policy: GroupMergePolicy,
    /// Upper bound on supervisor fan-out rounds.
    pub max_researcher_iterations: usize,
    /// Research tasks dispatched (and run concurrently) per round.
    pub max_concurrent_research_units: usize,
    /// Tool-use turns per research task.
    pub tool_call_iterations: usize,
    /// Upper bound on consolidated sources before pruning.
    pub max_sources: usize,
    /// Policy applied when consolidation exceeds `max_sources`.
    pub source_prune_policy: SourcePrunePolicy,
    /// Run the brief through the validator before planning.
    pub brief_validation: bool,
    /// Brief recompilations allowed after validator rejections.
    pub brief_max_revisions: usize,
    /// Report resyntheses allowed after quality-gate rejections.
    pub max_report_revisions: usize,
    /// Retries for transient completion-service errors.
    pub llm_max_retries: usize,
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            clarification_enabled: true,
            max_question_groups: 12,
            group_merge_policy: GroupMergePolicy::MergeSmallest,
            max_researcher_iterations: 3,
            max_concurrent_research_units: 5,
            tool_call_iterations: 6,
            max_sources: 40,
            source_prune_policy: SourcePrunePolicy::MostCited,
            brief_validation: false,
            brief_max_revisions: 2,
            max_report_revisions: 2,
            llm_max_retries: 2,
        }
    }
}

impl ResearchConfig {
    /// Reject limits that would make the pipeline unable to make progress.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_question_groups == 0 {
            return Err(ConfigError::Invalid {
                message: "research.max_question_groups must be at least 1".into(),
            });
        }
        if self.max_concurrent_research_units == 0 {
            return Err(ConfigError::Invalid {
                message: "research.max_concurrent_research_units must be at least 1".into(),
            });
        }
        if self.max_sources == 0 {
            return Err(ConfigError::Invalid {
                message: "research.max_sources must be at least 1".into(),
            });
        }
        Ok(())
    }
}

/// Configuration for the concrete research tools.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub web_search: WebSearchConfig,
    pub scrape: ScrapeConfig,
    pub deep_research: DeepResearchConfig,
    pub internal_search: InternalSearchConfig,
    pub resolver: ResolverConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebSearchConfig {
    pub enabled: bool,
    pub max_results: usize,
    pub timeout_secs: u64,
}

impl Default for WebSearchConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_results: 8,
            timeout_secs: 15,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrapeConfig {
    pub enabled: bool,
    /// Maximum characters of page text returned per scrape.
    pub max_chars: usize,
    pub timeout_secs: u64,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_chars: 8000,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeepResearchConfig {
    pub enabled: bool,
    /// OpenAI-compatible endpoint of a search-grounded model.
    pub base_url: String,
    pub model: String,
    pub api_key_env: String,
    pub timeout_secs: u64,
}

impl Default for DeepResearchConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: "https://api.perplexity.ai".to_string(),
            model: "sonar".to_string(),
            api_key_env: "PERPLEXITY_API_KEY".to_string(),
            timeout_secs: 120,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InternalSearchConfig {
    pub enabled: bool,
    /// Search endpoint; the tool is skipped when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    pub api_key_env: String,
    pub top_k: usize,
    pub timeout_secs: u64,
}

impl Default for InternalSearchConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: None,
            api_key_env: "DOSSIER_INTERNAL_SEARCH_KEY".to_string(),
            top_k: 8,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    pub timeout_secs: u64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self { timeout_secs: 10 }
    }
}

fn user_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("dev", "dossier", "dossier")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}

/// Path of the workspace-local config file.
pub fn workspace_config_path(workspace: &Path) -> PathBuf {
    workspace.join(".dossier").join("config.toml")
}

/// Load configuration from layered sources.
///
/// Priority (highest to lowest):
/// 1. Explicit overrides (passed as argument)
/// 2. Environment variables (prefixed with `DOSSIER_`)
/// 3. Workspace-local config (`.dossier/config.toml`)
/// 4. User config (`~/.config/dossier/config.toml`)
/// 5. Built-in defaults
pub fn load_config(
    workspace: Option<&Path>,
    overrides: Option<&DossierConfig>,
) -> Result<DossierConfig, Box<figment::Error>> {
    let mut figment = Figment::from(Serialized::defaults(DossierConfig::default()));

    if let Some(user_config) = user_config_path()
        && user_config.exists()
    {
        figment = figment.merge(Toml::file(&user_config));
    }

    if let Some(ws) = workspace {
        let ws_config = workspace_config_path(ws);
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    // DOSSIER_LLM__MODEL, DOSSIER_RESEARCH__MAX_SOURCES, etc.
    figment = figment.merge(Env::prefixed("DOSSIER_").split("__"));

    if let Some(overrides) = overrides {
        figment = figment.merge(Serialized::defaults(overrides));
    }

    figment.extract().map_err(Box::new)
}

/// Write a default config file into the workspace unless one already exists.
///
/// Returns the path of the config file.
pub fn write_default_config(workspace: &Path) -> Result<PathBuf, ConfigError> {
    let path = workspace_config_path(workspace);
    if path.exists() {
        return Err(ConfigError::Invalid {
            message: format!("{} already exists", path.display()),
        });
    }
    let rendered = toml::to_string_pretty(&DossierConfig::default()).map_err(|e| {
        ConfigError::ParseError {
            message: e.to_string(),
        }
    })?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| ConfigError::Invalid {
            message: format!("cannot create {}: {e}", parent.display()),
        })?;
    }
    std::fs::write(&path, rendered).map_err(|e| ConfigError::Invalid {
        message: format!("cannot write {}: {e}", path.display()),
    })?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DossierConfig::default();
        assert_eq!(config.llm.provider, "openai");
        assert_eq!(config.llm.model, "gpt-4o");
        assert_eq!(config.research.max_question_groups, 12);
        assert!(config.research.clarification_enabled);
        assert!(!config.research.brief_validation);
        assert!(config.tools.internal_search.endpoint.is_none());
    }

    #[test]
    fn test_config_serialization_roundtrip() {
        let config = DossierConfig::default();
        let toml_str = toml::to_string(&config).unwrap();
        let deserialized: DossierConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(deserialized.llm.model, config.llm.model);
        assert_eq!(
            deserialized.research.group_merge_policy,
            GroupMergePolicy::MergeSmallest
        );
        assert_eq!(
            deserialized.research.source_prune_policy,
            SourcePrunePolicy::MostCited
        );
    }

    #[test]
    fn test_load_config_defaults() {
        let config = load_config(None, None).unwrap();
        assert_eq!(config.research.max_researcher_iterations, 3);
    }

    #[test]
    fn test_load_config_with_overrides() {
        let mut overrides = DossierConfig::default();
        overrides.llm.model = "gpt-4o-mini".to_string();
        overrides.research.max_sources = 10;

        let config = load_config(None, Some(&overrides)).unwrap();
        assert_eq!(config.llm.model, "gpt-4o-mini");
        assert_eq!(config.research.max_sources, 10);
    }

    #[test]
    fn test_load_config_from_workspace() {
        let dir = tempfile::tempdir().unwrap();
        let config_dir = dir.path().join(".dossier");
        std::fs::create_dir_all(&config_dir).unwrap();
        std::fs::write(
            config_dir.join("config.toml"),
            r#"
[research]
max_question_groups = 6
group_merge_policy = "fold_tail"
brief_validation = true
"#,
        )
        .unwrap();

        let config = load_config(Some(dir.path()), None).unwrap();
        assert_eq!(config.research.max_question_groups, 6);
        assert_eq!(config.research.group_merge_policy, GroupMergePolicy::FoldTail);
        assert!(config.research.brief_validation);
        // Untouched keys keep their defaults.
        assert_eq!(config.research.max_report_revisions, 2);
        assert_eq!(config.llm.model, "gpt-4o");
    }

    #[test]
    fn test_write_default_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_default_config(dir.path()).unwrap();
        assert!(path.exists());
        let loaded = load_config(Some(dir.path()), None).unwrap();
        assert_eq!(loaded.research.max_sources, 40);

        // A second init refuses to clobber the file.
        assert!(write_default_config(dir.path()).is_err());
    }

    #[test]
    fn test_validate_rejects_zero_limits() {
        let config = ResearchConfig {
            max_concurrent_research_units: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
        assert!(ResearchConfig::default().validate().is_ok());
    }
}
