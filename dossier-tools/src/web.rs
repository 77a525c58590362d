//! Web tools: search and page scrape.
//!
//! - `web_search`: DuckDuckGo instant answers, every hit returned as a source.
//! - `scrape_page`: fetch a URL and reduce it to readable text.

use crate::html;
use crate::http;
use async_trait::async_trait;
use dossier_core::config::{ScrapeConfig, WebSearchConfig};
use dossier_core::error::ToolError;
use dossier_core::research::consolidate::escape_citations;
use dossier_core::tools::ResearchTool;
use dossier_core::types::{SourceRef, ToolOutput};
use std::time::Duration;
use tracing::debug;

const WEB_SEARCH: &str = "web_search";
const SCRAPE_PAGE: &str = "scrape_page";

// ---------------------------------------------------------------------------
// WebSearchTool
// ---------------------------------------------------------------------------

/// One search hit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchHit {
    pub title: Option<String>,
    pub text: String,
    pub url: String,
}

/// Search the web using the DuckDuckGo instant answers API.
pub struct WebSearchTool {
    max_results: usize,
    timeout: Duration,
}

impl WebSearchTool {
    pub fn new(config: &WebSearchConfig) -> Self {
        Self {
            max_results: config.max_results.max(1),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }
}

impl Default for WebSearchTool {
    fn default() -> Self {
        Self::new(&WebSearchConfig::default())
    }
}

#[async_trait]
impl ResearchTool for WebSearchTool {
    fn name(&self) -> &str {
        WEB_SEARCH
    }

    fn description(&self) -> &str {
        "Search the web for information about the subject. Returns snippets with their URLs; \
         cite results by their [n] marker."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The search query"
                },
                "max_results": {
                    "type": "integer",
                    "description": "Maximum number of results to return",
                    "default": self.max_results
                }
            },
            "required": ["query"]
        })
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn execute(&self, args: serde_json::Value) -> Result<ToolOutput, ToolError> {
        let query = http::required_str(WEB_SEARCH, &args, "query")?;
        let max_results = args
            .get("max_results")
            .and_then(|v| v.as_u64())
            .map_or(self.max_results, |n| (n as usize).clamp(1, self.max_results));

        let client = http::client(WEB_SEARCH, self.timeout)?;
        let url = format!(
            "https://api.duckduckgo.com/?q={}&format=json&no_html=1&skip_disambig=1",
            urlencoding::encode(query)
        );

        let response = client
            .get(&url)
            .send()
            .await
            .map_err(|e| http::failed(WEB_SEARCH, format!("Search request failed: {e}")))?;
        let response = http::check_status(WEB_SEARCH, response).await?;
        let body: serde_json::Value = response.json().await.map_err(|e| {
            http::failed(WEB_SEARCH, format!("Failed to parse search response: {e}"))
        })?;

        let hits = parse_instant_answer(&body, max_results);
        debug!(query, hits = hits.len(), "Web search finished");
        Ok(render_hits(query, hits))
    }
}

/// Pull hits out of an instant-answer response: the abstract first, then
/// related topics (one level of nested topic groups), then direct results.
/// Hits without a URL are dropped since they cannot be cited.
pub fn parse_instant_answer(body: &serde_json::Value, max_results: usize) -> Vec<SearchHit> {
    let mut hits = Vec::new();

    let text_of = |v: &serde_json::Value, key: &str| {
        v.get(key)
            .and_then(|s| s.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    if let (Some(text), Some(url)) = (text_of(body, "AbstractText"), text_of(body, "AbstractURL")) {
        hits.push(SearchHit {
            title: text_of(body, "Heading").or_else(|| text_of(body, "AbstractSource")),
            text,
            url,
        });
    }

    let mut topics: Vec<&serde_json::Value> = Vec::new();
    for key in ["RelatedTopics", "Results"] {
        for entry in body.get(key).and_then(|v| v.as_array()).into_iter().flatten() {
            match entry.get("Topics").and_then(|v| v.as_array()) {
                Some(nested) => topics.extend(nested),
                None => topics.push(entry),
            }
        }
    }

    for topic in topics {
        if hits.len() >= max_results {
            break;
        }
        let (Some(text), Some(url)) = (text_of(topic, "Text"), text_of(topic, "FirstURL")) else {
            continue;
        };
        if hits.iter().any(|h| h.url == url) {
            continue;
        }
        let title = text.split(" - ").next().map(str::trim).map(str::to_string);
        hits.push(SearchHit { title, text, url });
    }

    hits.truncate(max_results);
    hits
}

fn render_hits(query: &str, hits: Vec<SearchHit>) -> ToolOutput {
    if hits.is_empty() {
        return ToolOutput::text(format!(
            "No results found for \"{query}\". Try a broader query or scrape a specific page."
        ));
    }

    let lines: Vec<String> = hits
        .iter()
        .enumerate()
        .map(|(i, hit)| format!("[{}] {}\n  URL: {}", i + 1, hit.text, hit.url))
        .collect();
    let sources = hits.into_iter().map(|hit| {
        let source = SourceRef::new(hit.url);
        match hit.title {
            Some(title) => source.with_title(title),
            None => source,
        }
    });

    ToolOutput::text(format!(
        "Search results for \"{query}\":\n\n{}",
        lines.join("\n\n")
    ))
    .with_sources(sources)
}

// ---------------------------------------------------------------------------
// ScrapePageTool
// ---------------------------------------------------------------------------

/// Fetch a page and return its readable text. The page is its own source.
pub struct ScrapePageTool {
    max_chars: usize,
    timeout: Duration,
}

impl ScrapePageTool {
    pub fn new(config: &ScrapeConfig) -> Self {
        Self {
            max_chars: config.max_chars.max(1),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }
}

impl Default for ScrapePageTool {
    fn default() -> Self {
        Self::new(&ScrapeConfig::default())
    }
}

#[async_trait]
impl ResearchTool for ScrapePageTool {
    fn name(&self) -> &str {
        SCRAPE_PAGE
    }

    fn description(&self) -> &str {
        "Fetch a web page and extract its readable text. Use this to read a specific page \
         found through search."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "url": {
                    "type": "string",
                    "description": "The http(s) URL to fetch"
                }
            },
            "required": ["url"]
        })
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn execute(&self, args: serde_json::Value) -> Result<ToolOutput, ToolError> {
        let raw = http::required_str(SCRAPE_PAGE, &args, "url")?;
        let url = parse_http_url(raw)?;

        let client = http::client(SCRAPE_PAGE, self.timeout)?;
        let response = client
            .get(url.as_str())
            .send()
            .await
            .map_err(|e| http::failed(SCRAPE_PAGE, format!("Fetch failed: {e}")))?;
        let response = http::check_status(SCRAPE_PAGE, response).await?;

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        let body = response.text().await.map_err(|e| {
            http::failed(SCRAPE_PAGE, format!("Failed to read response body: {e}"))
        })?;

        Ok(render_page(url.as_str(), &content_type, &body, self.max_chars))
    }
}

fn parse_http_url(raw: &str) -> Result<url::Url, ToolError> {
    let invalid = |reason: String| ToolError::InvalidArguments {
        name: SCRAPE_PAGE.to_string(),
        reason,
    };
    let url = url::Url::parse(raw).map_err(|e| invalid(format!("Invalid URL '{raw}': {e}")))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        scheme => Err(invalid(format!("Unsupported URL scheme: {scheme}"))),
    }
}

/// Turn a fetched body into tool output, truncated to `max_chars` characters.
pub fn render_page(url: &str, content_type: &str, body: &str, max_chars: usize) -> ToolOutput {
    let is_html = content_type.contains("text/html")
        || content_type.contains("application/xhtml")
        || (content_type.is_empty() && body.trim_start().starts_with('<'));
    let (text, title) = if is_html {
        (html::extract_text(body), html::page_title(body))
    } else {
        (body.trim().to_string(), None)
    };

    let (kept, truncated) = html::truncate_chars(&text, max_chars);
    // Footnote numbers on the page are not references into our source list.
    let kept = escape_citations(kept);
    let mut content = format!("Content from {url}:\n\n{kept}");
    if truncated {
        content.push_str(&format!("...\n\n[Truncated at {max_chars} characters.]"));
    }

    let source = SourceRef::new(url);
    let source = match title {
        Some(title) => source.with_title(title),
        None => source,
    };
    ToolOutput::text(content).with_source(source)
}
