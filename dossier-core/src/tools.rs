//! Research tool contracts: the capabilities research tasks may call.
//!
//! Tools are registered once per run and exposed to the research task
//! executor. Concrete implementations (web search, page scrape, deep
//! research, internal search) live in the `dossier-tools` crate; this module
//! only defines what the pipeline expects from them.

use crate::error::ToolError;
use crate::types::{ToolDefinition, ToolOutput};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Trait that every research tool implements.
///
/// `Ok(output)` is a successful call; `Err(error)` is a failed call whose
/// reason is reported back to the model as `"<tool> failed: <reason>"`.
#[async_trait]
pub trait ResearchTool: Send + Sync {
    /// The unique name of this tool.
    fn name(&self) -> &str;

    /// Human-readable description of what this tool does.
    fn description(&self) -> &str;

    /// JSON Schema for the tool's parameters.
    fn parameters_schema(&self) -> serde_json::Value;

    /// Execute the tool with the given arguments.
    async fn execute(&self, args: serde_json::Value) -> Result<ToolOutput, ToolError>;

    /// Maximum execution time before timeout.
    fn timeout(&self) -> Duration {
        Duration::from_secs(30)
    }
}

/// Resolves a URL to the name of the entity behind it.
#[async_trait]
pub trait EntityResolver: Send + Sync {
    /// Returns `None` when no name can be derived.
    async fn resolve(&self, url: &str) -> Option<String>;
}

/// A resolver that never resolves anything.
pub struct NoopResolver;

#[async_trait]
impl EntityResolver for NoopResolver {
    async fn resolve(&self, _url: &str) -> Option<String> {
        None
    }
}

/// The tool registry holds all registered tools and handles execution.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn ResearchTool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. Returns error if a tool with the same name is already registered.
    pub fn register(&mut self, tool: Arc<dyn ResearchTool>) -> Result<(), ToolError> {
        let name = tool.name().to_string();
        if self.tools.contains_key(&name) {
            return Err(ToolError::AlreadyRegistered { name });
        }
        debug!(tool = %name, "Registering tool");
        self.tools.insert(name, tool);
        Ok(())
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn ResearchTool>> {
        self.tools.get(name).cloned()
    }

    /// List all registered tool definitions (for sending to the LLM), sorted by name.
    pub fn list_definitions(&self) -> Vec<ToolDefinition> {
        self.tools
            .values()
            .map(|tool| ToolDefinition {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                parameters: tool.parameters_schema(),
            })
            .collect()
    }

    /// List all registered tool names, sorted.
    pub fn list_names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Execute a tool by name with the given arguments, applying its timeout.
    pub async fn execute(
        &self,
        name: &str,
        args: serde_json::Value,
    ) -> Result<ToolOutput, ToolError> {
        let tool = self.tools.get(name).ok_or_else(|| ToolError::NotFound {
            name: name.to_string(),
        })?;

        let timeout = tool.timeout();
        info!(tool = %name, timeout_secs = timeout.as_secs(), "Executing tool");

        match tokio::time::timeout(timeout, tool.execute(args)).await {
            Ok(result) => result,
            Err(_) => Err(ToolError::Timeout {
                name: name.to_string(),
                timeout_secs: timeout.as_secs(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SourceRef;

    struct EchoTool;

    #[async_trait]
    impl ResearchTool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }

        fn description(&self) -> &str {
            "Echoes the query back"
        }

        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({
                "type": "object",
                "properties": {
                    "query": { "type": "string" }
                },
                "required": ["query"]
            })
        }

        async fn execute(&self, args: serde_json::Value) -> Result<ToolOutput, ToolError> {
            let query = args["query"]
                .as_str()
                .ok_or_else(|| ToolError::InvalidArguments {
                    name: "echo".to_string(),
                    reason: "missing 'query' parameter".to_string(),
                })?;
            Ok(ToolOutput::text(format!("Echo: {query}"))
                .with_source(SourceRef::new("https://echo.example")))
        }
    }

    struct SlowTool;

    #[async_trait]
    impl ResearchTool for SlowTool {
        fn name(&self) -> &str {
            "slow"
        }

        fn description(&self) -> &str {
            "A tool that takes forever"
        }

        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({"type": "object"})
        }

        async fn execute(&self, _args: serde_json::Value) -> Result<ToolOutput, ToolError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(ToolOutput::text("done"))
        }

        fn timeout(&self) -> Duration {
            Duration::from_millis(50)
        }
    }

    #[test]
    fn test_register_and_list() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(SlowTool)).unwrap();
        registry.register(Arc::new(EchoTool)).unwrap();
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.list_names(), vec!["echo", "slow"]);
        assert_eq!(registry.list_definitions()[0].name, "echo");
    }

    #[test]
    fn test_register_duplicate() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool)).unwrap();
        let err = registry.register(Arc::new(EchoTool)).unwrap_err();
        assert!(matches!(err, ToolError::AlreadyRegistered { .. }));
    }

    #[tokio::test]
    async fn test_execute_tool() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool)).unwrap();
        let output = registry
            .execute("echo", serde_json::json!({"query": "acme"}))
            .await
            .unwrap();
        assert_eq!(output.content, "Echo: acme");
        assert_eq!(output.sources.len(), 1);
    }

    #[tokio::test]
    async fn test_execute_unknown_tool() {
        let registry = ToolRegistry::new();
        let err = registry
            .execute("missing", serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_execute_timeout() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(SlowTool)).unwrap();
        let err = registry
            .execute("slow", serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_noop_resolver() {
        assert_eq!(NoopResolver.resolve("https://acme.com").await, None);
    }
}
