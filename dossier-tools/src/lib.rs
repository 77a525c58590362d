//! # Dossier Tools
//!
//! Concrete research tools for the Dossier pipeline: web search, page
//! scrape, deep research, internal search, and the page-title entity resolver.

pub mod deep_research;
pub mod html;
mod http;
pub mod internal_search;
pub mod resolver;
pub mod web;

use dossier_core::config::ToolsConfig;
use dossier_core::tools::{EntityResolver, ResearchTool, ToolRegistry};
use std::sync::Arc;
use tracing::{info, warn};

pub use deep_research::DeepResearchTool;
pub use internal_search::InternalSearchTool;
pub use resolver::PageTitleResolver;
pub use web::{ScrapePageTool, WebSearchTool};

/// Build a registry with every enabled and configured tool.
///
/// Tools that need credentials or an endpoint are left out when those are
/// missing, so the model is never offered a tool that can only fail.
pub fn build_registry(config: &ToolsConfig) -> ToolRegistry {
    let mut tools: Vec<Arc<dyn ResearchTool>> = Vec::new();

    if config.web_search.enabled {
        tools.push(Arc::new(WebSearchTool::new(&config.web_search)));
    }
    if config.scrape.enabled {
        tools.push(Arc::new(ScrapePageTool::new(&config.scrape)));
    }
    if config.deep_research.enabled {
        let tool = DeepResearchTool::new(&config.deep_research);
        if tool.is_configured() {
            tools.push(Arc::new(tool));
        } else {
            warn!(
                env = %config.deep_research.api_key_env,
                "Skipping deep_research: API key not set"
            );
        }
    }
    if config.internal_search.enabled {
        let tool = InternalSearchTool::new(&config.internal_search);
        if tool.is_configured() {
            tools.push(Arc::new(tool));
        } else {
            info!("Skipping internal_search: no endpoint configured");
        }
    }

    let mut registry = ToolRegistry::new();
    for tool in tools {
        if let Err(e) = registry.register(tool) {
            warn!("Failed to register tool: {}", e);
        }
    }
    registry
}

/// The entity resolver used by the clarification gate.
pub fn build_resolver(config: &ToolsConfig) -> Arc<dyn EntityResolver> {
    Arc::new(PageTitleResolver::new(&config.resolver))
}
