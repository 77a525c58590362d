//! Entity-name resolution from a URL found in the query.

use crate::html;
use crate::http;
use async_trait::async_trait;
use dossier_core::config::ResolverConfig;
use dossier_core::tools::EntityResolver;
use std::time::Duration;
use tracing::{debug, warn};

/// Resolves a URL to the name of the organization behind it by reading the
/// page's `og:site_name` or `<title>`.
pub struct PageTitleResolver {
    timeout: Duration,
}

impl PageTitleResolver {
    pub fn new(config: &ResolverConfig) -> Self {
        Self {
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }
}

impl Default for PageTitleResolver {
    fn default() -> Self {
        Self::new(&ResolverConfig::default())
    }
}

/// Add `https://` when the scheme is missing and validate the result.
pub fn normalize_url(raw: &str) -> Option<url::Url> {
    let raw = raw.trim();
    let candidate = if raw.contains("://") {
        raw.to_string()
    } else {
        format!("https://{raw}")
    };
    url::Url::parse(&candidate)
        .ok()
        .filter(|u| matches!(u.scheme(), "http" | "https") && u.host_str().is_some())
}

#[async_trait]
impl EntityResolver for PageTitleResolver {
    async fn resolve(&self, raw: &str) -> Option<String> {
        let url = normalize_url(raw)?;
        let client = match http::client("resolver", self.timeout) {
            Ok(client) => client,
            Err(e) => {
                warn!(error = %e, "Entity resolver unavailable");
                return None;
            }
        };

        let body = match client.get(url.as_str()).send().await {
            Ok(response) if response.status().is_success() => response.text().await.ok()?,
            Ok(response) => {
                debug!(url = %url, status = %response.status(), "Entity resolution got non-success status");
                return None;
            }
            Err(e) => {
                debug!(url = %url, error = %e, "Entity resolution request failed");
                return None;
            }
        };

        let name = html::entity_name(&body);
        debug!(url = %url, name = ?name, "Entity resolution finished");
        name
    }
}
