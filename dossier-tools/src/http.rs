//! Shared HTTP plumbing for the tools.

use dossier_core::error::ToolError;
use std::time::Duration;

const USER_AGENT: &str = concat!("Dossier/", env!("CARGO_PKG_VERSION"));

/// Build a client for one tool call.
pub(crate) fn client(tool: &str, timeout: Duration) -> Result<reqwest::Client, ToolError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .redirect(reqwest::redirect::Policy::limited(5))
        .build()
        .map_err(|e| failed(tool, format!("Failed to create HTTP client: {e}")))
}

pub(crate) fn failed(tool: &str, message: impl Into<String>) -> ToolError {
    ToolError::ExecutionFailed {
        name: tool.to_string(),
        message: message.into(),
    }
}

/// Read a required string argument.
pub(crate) fn required_str<'a>(
    tool: &str,
    args: &'a serde_json::Value,
    key: &str,
) -> Result<&'a str, ToolError> {
    args.get(key)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ToolError::InvalidArguments {
            name: tool.to_string(),
            reason: format!("Missing required parameter: {key}"),
        })
}

/// Read an API key from the named environment variable.
pub(crate) fn api_key_from_env(var: &str) -> Option<String> {
    std::env::var(var).ok().filter(|k| !k.trim().is_empty())
}

/// Map a non-success response to a tool failure, keeping a short body excerpt.
pub(crate) async fn check_status(
    tool: &str,
    response: reqwest::Response,
) -> Result<reqwest::Response, ToolError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let excerpt: String = body.chars().take(200).collect();
    Err(failed(tool, format!("HTTP {status}: {}", excerpt.trim())))
}
