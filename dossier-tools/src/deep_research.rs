//! `deep_research`: ask a search-grounded model and keep its citations.
//!
//! Speaks the OpenAI chat-completions format; the response's `citations`
//! (plain URLs) or `search_results` (`{url, title}`) become the sources, so
//! the answer's own `[k]` markers line up with them.

use crate::http;
use async_trait::async_trait;
use dossier_core::config::DeepResearchConfig;
use dossier_core::error::ToolError;
use dossier_core::tools::ResearchTool;
use dossier_core::types::{SourceRef, ToolOutput};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

const DEEP_RESEARCH: &str = "deep_research";

const SYSTEM_PROMPT: &str = "You are a meticulous research assistant. Answer with specific, \
verifiable facts, cite every claim with [n] markers that refer to your search results, and \
say plainly when something could not be found.";

pub struct DeepResearchTool {
    base_url: String,
    model: String,
    api_key_env: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl DeepResearchTool {
    /// Build from config, reading the API key from the configured env var.
    pub fn new(config: &DeepResearchConfig) -> Self {
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key_env: config.api_key_env.clone(),
            api_key: http::api_key_from_env(&config.api_key_env),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    fn request_body(&self, question: &str) -> serde_json::Value {
        serde_json::json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": question}
            ]
        })
    }
}

#[async_trait]
impl ResearchTool for DeepResearchTool {
    fn name(&self) -> &str {
        DEEP_RESEARCH
    }

    fn description(&self) -> &str {
        "Ask a web-grounded research model a focused question. Slower than web_search but \
         returns a synthesized answer with citations. Use for questions that need several \
         sources combined."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "question": {
                    "type": "string",
                    "description": "A specific, self-contained research question"
                }
            },
            "required": ["question"]
        })
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn execute(&self, args: serde_json::Value) -> Result<ToolOutput, ToolError> {
        let question = http::required_str(DEEP_RESEARCH, &args, "question")?;
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| ToolError::NotConfigured {
                name: DEEP_RESEARCH.to_string(),
                reason: format!("API key not set in environment variable {}", self.api_key_env),
            })?;

        let client = http::client(DEEP_RESEARCH, self.timeout)?;
        let response = client
            .post(self.endpoint())
            .bearer_auth(api_key)
            .json(&self.request_body(question))
            .send()
            .await
            .map_err(|e| http::failed(DEEP_RESEARCH, format!("Request failed: {e}")))?;
        let response = http::check_status(DEEP_RESEARCH, response).await?;
        let body: DeepResearchResponse = response.json().await.map_err(|e| {
            http::failed(DEEP_RESEARCH, format!("Failed to parse response: {e}"))
        })?;

        let output = body.into_output().ok_or_else(|| {
            http::failed(DEEP_RESEARCH, "Response contained no answer")
        })?;
        debug!(sources = output.sources.len(), "Deep research answered");
        Ok(output)
    }
}

#[derive(Debug, Deserialize)]
pub struct DeepResearchResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    citations: Vec<String>,
    #[serde(default)]
    search_results: Vec<SearchResult>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    url: String,
    #[serde(default)]
    title: Option<String>,
}

impl DeepResearchResponse {
    /// The first choice's answer with its citations, or `None` if empty.
    pub fn into_output(self) -> Option<ToolOutput> {
        let answer = self
            .choices
            .into_iter()
            .find_map(|c| c.message.content)
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())?;

        let sources: Vec<SourceRef> = if self.citations.is_empty() {
            self.search_results
                .into_iter()
                .map(|r| {
                    let source = SourceRef::new(r.url);
                    match r.title {
                        Some(title) => source.with_title(title),
                        None => source,
                    }
                })
                .collect()
        } else {
            let titles = self.search_results;
            self.citations
                .into_iter()
                .map(|url| {
                    let title = titles.iter().find(|r| r.url == url).and_then(|r| r.title.clone());
                    let source = SourceRef::new(url);
                    match title {
                        Some(title) => source.with_title(title),
                        None => source,
                    }
                })
                .collect()
        };

        Some(ToolOutput::text(answer).with_sources(sources))
    }
}
