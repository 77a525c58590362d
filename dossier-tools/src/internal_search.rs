//! `internal_search`: query the organization's own knowledge base.
//!
//! This tool is the only source of the `Relationship status:` line the
//! synthesis stage trusts, so the status is rendered verbatim on its own line.

use crate::http;
use async_trait::async_trait;
use dossier_core::config::InternalSearchConfig;
use dossier_core::error::ToolError;
use dossier_core::tools::ResearchTool;
use dossier_core::types::{SourceRef, ToolOutput};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

const INTERNAL_SEARCH: &str = "internal_search";

pub struct InternalSearchTool {
    endpoint: Option<String>,
    api_key: Option<String>,
    top_k: usize,
    timeout: Duration,
}

impl InternalSearchTool {
    pub fn new(config: &InternalSearchConfig) -> Self {
        Self {
            endpoint: config
                .endpoint
                .as_deref()
                .map(str::trim)
                .filter(|e| !e.is_empty())
                .map(str::to_string),
            api_key: http::api_key_from_env(&config.api_key_env),
            top_k: config.top_k.max(1),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.endpoint.is_some()
    }
}

#[async_trait]
impl ResearchTool for InternalSearchTool {
    fn name(&self) -> &str {
        INTERNAL_SEARCH
    }

    fn description(&self) -> &str {
        "Search internal documents (CRM notes, past proposals, engagement records) about the \
         subject. Always run this once per subject: it reports whether we have worked with \
         them before."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "What to look for in internal documents"
                }
            },
            "required": ["query"]
        })
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn execute(&self, args: serde_json::Value) -> Result<ToolOutput, ToolError> {
        let query = http::required_str(INTERNAL_SEARCH, &args, "query")?;
        let endpoint = self
            .endpoint
            .as_deref()
            .ok_or_else(|| ToolError::NotConfigured {
                name: INTERNAL_SEARCH.to_string(),
                reason: "no internal search endpoint configured".to_string(),
            })?;

        let client = http::client(INTERNAL_SEARCH, self.timeout)?;
        let mut request = client
            .post(endpoint)
            .json(&serde_json::json!({ "query": query, "top_k": self.top_k }));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| http::failed(INTERNAL_SEARCH, format!("Request failed: {e}")))?;
        let response = http::check_status(INTERNAL_SEARCH, response).await?;
        let body: InternalSearchResponse = response.json().await.map_err(|e| {
            http::failed(INTERNAL_SEARCH, format!("Failed to parse response: {e}"))
        })?;

        debug!(results = body.results.len(), "Internal search finished");
        Ok(body.render(query, self.top_k))
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct InternalSearchResponse {
    #[serde(default)]
    pub results: Vec<InternalDocument>,
    #[serde(default)]
    pub relationship_status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct InternalDocument {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, alias = "source")]
    pub url: Option<String>,
    #[serde(default, alias = "snippet", alias = "text")]
    pub content: String,
}

impl InternalSearchResponse {
    /// Render results; documents with a URL get a `[k]` marker and a source.
    pub fn render(self, query: &str, top_k: usize) -> ToolOutput {
        let mut content = format!("Internal search results for \"{query}\":\n\n");
        if let Some(status) = self.relationship_status.as_deref().and_then(normalize_status) {
            content.push_str(&format!("Relationship status: {status}\n\n"));
        }

        let mut sources = Vec::new();
        let mut entries = Vec::new();
        for doc in self.results.into_iter().take(top_k) {
            let title = doc.title.as_deref().map(str::trim).unwrap_or("Untitled document");
            let snippet = doc.content.trim();
            match doc.url.as_deref().map(str::trim).filter(|u| !u.is_empty()) {
                Some(url) => {
                    sources.push(SourceRef::new(url).with_title(title));
                    entries.push(format!("[{}] {title}\n  {snippet}", sources.len()));
                }
                None => entries.push(format!("- {title}\n  {snippet}")),
            }
        }

        if entries.is_empty() {
            content.push_str("No internal documents matched.");
        } else {
            content.push_str(&entries.join("\n\n"));
        }
        ToolOutput::text(content).with_sources(sources)
    }
}

/// Canonical wording for the machine-readable status values.
fn normalize_status(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let key = trimmed.to_ascii_lowercase().replace(['_', '-'], " ");
    let canonical = match key.as_str() {
        "existing client" | "client" => "Existing client",
        "past engagement" | "former client" => "Past engagement",
        "no prior engagement" | "none" | "no engagement" => "No prior engagement",
        _ => return Some(trimmed.to_string()),
    };
    Some(canonical.to_string())
}
