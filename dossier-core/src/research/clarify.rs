//! Clarification gate: decides whether a query can be researched as written.
//!
//! A query that embeds a resolvable URL proceeds straight to the brief with
//! the URL replaced by the entity's name. Anything else is put to the intent
//! classifier, whose verdict either lets the query through or becomes the
//! clarifying question that ends the run.

use super::prompts;
use super::types::StageOutcome;
use crate::brain::Brain;
use crate::tools::EntityResolver;
use regex::Regex;
use std::sync::{Arc, LazyLock};
use tracing::{debug, info, warn};

const PROCEED_MARKER: &str = "need_clarification: false";

static EMBEDDED_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:https?://)?(?:www\.)?(?:[a-z0-9](?:[a-z0-9-]*[a-z0-9])?\.)+[a-z]{2,24}(?::\d+)?(?:/[^\s]*)?",
    )
    .expect("embedded url pattern is valid")
});

/// Top-level domains a bare `name.tld` must end in to count as a URL.
const COMMON_TLDS: &[&str] = &[
    "com", "org", "net", "io", "co", "ai", "dev", "app", "biz", "info", "edu", "gov", "tech",
    "us", "uk", "de", "fr", "nl", "ch", "se", "es", "it", "ca", "au", "in", "jp", "sg", "eu",
];

/// Technology names that look like bare domains.
const TECH_NAMES: &[&str] = &["asp.net", "ado.net", "vb.net"];

/// Locate the first URL-like span in `query` as a byte range.
///
/// Scheme, `www.` and path are all optional, but a bare host must end in a
/// common top-level domain so tokens like `node.js` are not taken for URLs.
/// Trailing sentence punctuation is not part of the URL.
pub fn find_url(query: &str) -> Option<(usize, usize)> {
    EMBEDDED_URL.find_iter(query).find_map(|m| {
        let trimmed = m.as_str().trim_end_matches(['.', ',', ';', ':', '!', '?', ')', '"', '\'']);
        (!trimmed.is_empty() && looks_like_url(trimmed))
            .then(|| (m.start(), m.start() + trimmed.len()))
    })
}

fn looks_like_url(candidate: &str) -> bool {
    let lower = candidate.to_ascii_lowercase();
    if ["http://", "https://", "www."].iter().any(|p| lower.starts_with(p)) {
        return true;
    }
    let host = lower.split(['/', ':']).next().unwrap_or_default();
    if TECH_NAMES.contains(&host) {
        return false;
    }
    host.rsplit('.')
        .next()
        .is_some_and(|tld| COMMON_TLDS.contains(&tld))
}

pub struct ClarificationGate {
    brain: Brain,
    resolver: Arc<dyn EntityResolver>,
}

impl ClarificationGate {
    pub fn new(brain: Brain, resolver: Arc<dyn EntityResolver>) -> Self {
        Self { brain, resolver }
    }

    /// Returns `Proceed(query)` with the query to research, or
    /// `Terminate(question)` when the user must clarify first.
    pub async fn clarify(&self, query: &str, clarification_enabled: bool) -> StageOutcome<String> {
        if !clarification_enabled {
            debug!("Clarification disabled, passing query through");
            return StageOutcome::Proceed(query.to_string());
        }

        if let Some((start, end)) = find_url(query) {
            let url = &query[start..end];
            match self.resolver.resolve(url).await {
                Some(name) if !name.trim().is_empty() => {
                    let rewritten = format!("{}{}{}", &query[..start], name.trim(), &query[end..]);
                    info!(url, entity = %name, "Resolved embedded URL to entity name");
                    return StageOutcome::Proceed(rewritten);
                }
                _ => debug!(url, "Embedded URL did not resolve, asking classifier"),
            }
        }

        match self
            .brain
            .complete_text(prompts::CLARIFY_SYSTEM, &prompts::clarify(query))
            .await
        {
            Ok(response) => {
                if response.to_ascii_lowercase().contains(PROCEED_MARKER) {
                    StageOutcome::Proceed(query.to_string())
                } else {
                    info!("Query needs clarification, ending run with a question");
                    StageOutcome::Terminate(response.trim().to_string())
                }
            }
            Err(e) => {
                warn!(error = %e, "Intent classifier failed, proceeding without clarification");
                StageOutcome::Proceed(query.to_string())
            }
        }
    }
}
