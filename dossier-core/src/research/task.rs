//! Research task executor — the tool-use loop behind one question group.
//!
//! The model is handed the research tools and calls them until it answers
//! without a tool call or the iteration cap is reached. Tool outputs are kept
//! verbatim in the finding, each under its own heading, with local `[n]`
//! markers pointing into the finding's trailing `### Sources` block.

use super::consolidate::{CITATION, Citation, escape_marker, rewrite_marker};
use super::prompts;
use super::supervisor::ResearchUnit;
use super::types::ResearchTaskResult;
use crate::brain::Brain;
use crate::tools::ToolRegistry;
use crate::types::{Message, SourceRef, SubjectType, ToolOutput};
use async_trait::async_trait;
use regex::Captures;
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Per-task source numbering, by first appearance.
#[derive(Debug, Default)]
struct LocalSources {
    entries: Vec<SourceRef>,
    index: HashMap<String, usize>,
}

impl LocalSources {
    fn number(&mut self, source: &SourceRef) -> usize {
        if let Some(&n) = self.index.get(&source.url) {
            return n;
        }
        self.entries.push(source.clone());
        let n = self.entries.len();
        self.index.insert(source.url.clone(), n);
        n
    }

    fn render(&self) -> String {
        let mut block = String::from("### Sources\n");
        for (i, source) in self.entries.iter().enumerate() {
            match &source.title {
                Some(title) => block.push_str(&format!("{}. {} - {}\n", i + 1, source.url, title)),
                None => block.push_str(&format!("{}. {}\n", i + 1, source.url)),
            }
        }
        block
    }
}

pub struct ResearchTaskExecutor {
    brain: Brain,
    tools: ToolRegistry,
    max_tool_iterations: usize,
}

impl ResearchTaskExecutor {
    pub fn new(brain: Brain, tools: ToolRegistry, max_tool_iterations: usize) -> Self {
        Self {
            brain,
            tools,
            max_tool_iterations: max_tool_iterations.max(1),
        }
    }

    /// Research one question group. Never fails: a task-level error becomes
    /// a `Research failed:` note.
    pub async fn execute(&self, question_group: &str, subject_type: SubjectType) -> ResearchTaskResult {
        let definitions = self.tools.list_definitions();
        let mut messages = vec![
            Message::system(prompts::RESEARCHER_SYSTEM),
            Message::user(prompts::researcher(
                question_group,
                subject_type,
                &self.tools.list_names(),
            )),
        ];

        let mut sections = Vec::new();
        let mut raw_notes = Vec::new();
        let mut sources = LocalSources::default();
        let mut summary = None;

        for iteration in 0..self.max_tool_iterations {
            let response = match self.brain.think(&messages, Some(definitions.clone())).await {
                Ok(response) => response,
                Err(e) => {
                    warn!(group = %topic_title(question_group), error = %e, "Research task aborted");
                    return ResearchTaskResult::failed(question_group, e);
                }
            };

            let calls: Vec<(String, String, serde_json::Value)> = response
                .message
                .content
                .tool_calls()
                .into_iter()
                .map(|c| (c.id.to_string(), c.name.to_string(), c.arguments.clone()))
                .collect();
            if calls.is_empty() {
                let text = response.message.content.joined_text();
                if !text.trim().is_empty() {
                    summary = Some(text.trim().to_string());
                }
                debug!(iteration, "Research task finished tool use");
                break;
            }
            messages.push(response.message);

            for (call_id, name, arguments) in calls {
                let target = describe_arguments(&arguments);
                match self.tools.execute(&name, arguments).await {
                    Ok(output) => {
                        let (section, tool_message) = record_output(&name, &target, &output, &mut sources);
                        raw_notes.push(output.content);
                        sections.push(section);
                        messages.push(Message::tool_result(call_id, tool_message, false));
                    }
                    Err(e) => {
                        let note = format!("{name} failed: {}", e.reason());
                        info!(tool = %name, reason = %e.reason(), "Tool call failed");
                        raw_notes.push(note.clone());
                        messages.push(Message::tool_result(call_id, note, true));
                    }
                }
            }
        }

        ResearchTaskResult {
            question_group: question_group.to_string(),
            compressed_finding: assemble_finding(question_group, &sections, summary.as_deref(), &sources),
            raw_notes,
        }
    }
}

#[async_trait]
impl ResearchUnit for ResearchTaskExecutor {
    async fn run_task(&self, question_group: &str, subject_type: SubjectType) -> ResearchTaskResult {
        self.execute(question_group, subject_type).await
    }
}

/// Number the output's sources locally and rewrite its own `[k]` markers to
/// match. Returns the finding section and the text sent back to the model.
///
/// A `[k]` with no `k`-th source in this output is not a reference into the
/// task's source list. Such numbers are dropped from a marker, and a marker
/// with none left is escaped so later passes leave it alone.
fn record_output(
    tool: &str,
    target: &str,
    output: &ToolOutput,
    sources: &mut LocalSources,
) -> (String, String) {
    let numbers: Vec<usize> = output.sources.iter().map(|s| sources.number(s)).collect();
    let content = CITATION
        .replace_all(&output.content, |caps: &Captures<'_>| {
            let marker = &caps[0];
            let rewritten = rewrite_marker(marker, |k| {
                match k.checked_sub(1).and_then(|i| numbers.get(i)) {
                    Some(&n) => Citation::Renumber(n),
                    None => Citation::Drop,
                }
            });
            match rewritten {
                None => marker.to_string(),
                Some(text) if text.is_empty() => escape_marker(marker),
                Some(text) => text,
            }
        })
        .into_owned();

    let mut section = format!("#### {tool}: {target}\n{}", content.trim());
    if !numbers.is_empty() {
        let mut unique: Vec<usize> = Vec::with_capacity(numbers.len());
        for n in &numbers {
            if !unique.contains(n) {
                unique.push(*n);
            }
        }
        let markers: String = unique.iter().map(|n| format!("[{n}]")).collect();
        section.push_str(&format!("\n\nSources: {markers}"));
    }

    let mut tool_message = content;
    for (source, n) in output.sources.iter().zip(&numbers) {
        tool_message.push_str(&format!("\n[{n}] {}", source.url));
    }
    (section, tool_message)
}

fn assemble_finding(
    question_group: &str,
    sections: &[String],
    summary: Option<&str>,
    sources: &LocalSources,
) -> String {
    let mut finding = format!("## Research topic: {}\n\n", topic_title(question_group));
    if sections.is_empty() && summary.is_none() {
        finding.push_str("No evidence was gathered for this topic.\n\n");
    }
    for section in sections {
        finding.push_str(section);
        finding.push_str("\n\n");
    }
    if let Some(summary) = summary {
        finding.push_str("#### Analyst notes\n");
        finding.push_str(summary);
        finding.push_str("\n\n");
    }
    finding.push_str(&sources.render());
    finding
}

/// First line of a group without markdown heading or bullet syntax.
fn topic_title(question_group: &str) -> &str {
    question_group
        .lines()
        .next()
        .unwrap_or_default()
        .trim_start_matches(['#', '-', '*', '+', ' '])
        .trim()
}

fn describe_arguments(arguments: &serde_json::Value) -> String {
    ["query", "url", "question"]
        .iter()
        .find_map(|key| arguments.get(key).and_then(|v| v.as_str()))
        .map(str::to_string)
        .unwrap_or_else(|| arguments.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brain::MockLlmProvider;
    use crate::error::{LlmError, ToolError};
    use crate::config::SourcePrunePolicy;
    use crate::research::consolidate::{SourceConsolidator, parse_note};
    use crate::tools::ResearchTool;
    use serde_json::json;
    use std::sync::Arc;

    struct CitingTool;

    #[async_trait]
    impl ResearchTool for CitingTool {
        fn name(&self) -> &str {
            "web_search"
        }
        fn description(&self) -> &str {
            "search"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            json!({"type": "object"})
        }
        async fn execute(&self, args: serde_json::Value) -> Result<ToolOutput, ToolError> {
            let query = args["query"].as_str().unwrap_or_default();
            Ok(ToolOutput::text(format!("Results for {query}: rockets [2], anvils [1]"))
                .with_source(SourceRef::new("https://anvils.example").with_title("Anvils"))
                .with_source(SourceRef::new("https://rockets.example")))
        }
    }

    struct BrokenTool;

    #[async_trait]
    impl ResearchTool for BrokenTool {
        fn name(&self) -> &str {
            "scrape_page"
        }
        fn description(&self) -> &str {
            "scrape"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            json!({"type": "object"})
        }
        async fn execute(&self, _args: serde_json::Value) -> Result<ToolOutput, ToolError> {
            Err(ToolError::ExecutionFailed {
                name: "scrape_page".into(),
                message: "HTTP 404".into(),
            })
        }
    }

    fn registry() -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(CitingTool)).unwrap();
        registry.register(Arc::new(BrokenTool)).unwrap();
        registry
    }

    #[tokio::test]
    async fn test_tool_loop_builds_cited_finding() {
        let provider = Arc::new(MockLlmProvider::new());
        provider.queue_response(MockLlmProvider::tool_call_response(
            "web_search",
            json!({"query": "acme"}),
        ));
        provider.queue_response(MockLlmProvider::tool_call_response(
            "scrape_page",
            json!({"url": "https://acme.example"}),
        ));
        provider.queue_response(MockLlmProvider::text_response("Acme makes rockets."));

        let executor = ResearchTaskExecutor::new(Brain::new(provider.clone()), registry(), 6);
        let result = executor.execute("## Products\n- What does Acme sell?", SubjectType::Company).await;

        assert!(!result.is_failure());
        assert!(result.compressed_finding.starts_with("## Research topic: Products"));
        assert!(
            result
                .compressed_finding
                .contains("Results for acme: rockets [2], anvils [1]")
        );
        assert!(result.compressed_finding.contains("Acme makes rockets."));
        assert_eq!(result.raw_notes.len(), 2);
        assert_eq!(result.raw_notes[1], "scrape_page failed: HTTP 404");

        let parsed = parse_note(&result.compressed_finding);
        assert_eq!(parsed.sources.len(), 2);
        assert_eq!(parsed.sources[0].url, "https://anvils.example");
        assert_eq!(parsed.sources[0].description.as_deref(), Some("Anvils"));
        assert_eq!(provider.call_count(), 3);
    }

    #[tokio::test]
    async fn test_failure_note_sent_back_to_model() {
        let provider = Arc::new(MockLlmProvider::new());
        provider.queue_response(MockLlmProvider::tool_call_response("teleport", json!({})));
        provider.queue_response(MockLlmProvider::text_response("done"));

        let executor = ResearchTaskExecutor::new(Brain::new(provider.clone()), registry(), 6);
        let result = executor.execute("Overview", SubjectType::Company).await;

        assert_eq!(result.raw_notes, vec!["teleport failed: unknown tool"]);
        let second = &provider.requests()[1];
        let last = second.messages.last().unwrap();
        assert!(matches!(
            &last.content,
            crate::types::Content::ToolResult { is_error: true, output, .. } if output == "teleport failed: unknown tool"
        ));
    }

    #[tokio::test]
    async fn test_iteration_cap() {
        let provider = Arc::new(MockLlmProvider::with_handler(|_| {
            Ok(MockLlmProvider::tool_call_response(
                "web_search",
                json!({"query": "again"}),
            ))
        }));
        let executor = ResearchTaskExecutor::new(Brain::new(provider.clone()), registry(), 3);
        let result = executor.execute("Overview", SubjectType::Company).await;
        assert_eq!(provider.call_count(), 3);
        // Repeated URLs keep their first local number.
        assert_eq!(parse_note(&result.compressed_finding).sources.len(), 2);
    }

    #[tokio::test]
    async fn test_llm_error_becomes_failure_note() {
        let provider = Arc::new(MockLlmProvider::with_handler(|_| {
            Err(LlmError::AuthFailed {
                provider: "mock".into(),
            })
        }));
        let executor = ResearchTaskExecutor::new(Brain::new(provider), registry(), 3);
        let result = executor.execute("Overview", SubjectType::Company).await;
        assert!(result.is_failure());
        assert!(result.raw_notes.is_empty());
        assert_eq!(result.question_group, "Overview");
    }

    #[test]
    fn test_record_output_renumbers_tool_markers() {
        let mut sources = LocalSources::default();
        sources.number(&SourceRef::new("https://first.example"));
        let output = ToolOutput::text("claim [1] and [2, 9]")
            .with_source(SourceRef::new("https://x.example"))
            .with_source(SourceRef::new("https://first.example"));
        let (section, _) = record_output("deep_research", "acme", &output, &mut sources);
        assert_eq!(section, "#### deep_research: acme\nclaim [2] and [1]\n\nSources: [2][1]");
    }

    #[test]
    fn test_record_output_escapes_markers_without_a_source() {
        let mut sources = LocalSources::default();
        let output = ToolOutput::text("founded 1990.[1] CEO Jane Roe.[2]")
            .with_source(SourceRef::new("https://wiki.example/Acme"));
        let (section, tool_message) = record_output("scrape_page", "acme", &output, &mut sources);
        assert_eq!(
            section,
            "#### scrape_page: acme\nfounded 1990.[1] CEO Jane Roe.\\[2\\]\n\nSources: [1]"
        );
        assert!(tool_message.starts_with("founded 1990.[1] CEO Jane Roe.\\[2\\]"));
    }

    struct FootnotedPage;

    #[async_trait]
    impl ResearchTool for FootnotedPage {
        fn name(&self) -> &str {
            "scrape_page"
        }
        fn description(&self) -> &str {
            "scrape"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            json!({"type": "object"})
        }
        async fn execute(&self, _args: serde_json::Value) -> Result<ToolOutput, ToolError> {
            Ok(
                ToolOutput::text("Acme was founded in 1990.[1] Its CEO is Jane Roe.[2]")
                    .with_source(SourceRef::new("https://wiki.example/Acme")),
            )
        }
    }

    #[tokio::test]
    async fn test_page_footnotes_never_cite_other_tools_sources() {
        let provider = Arc::new(MockLlmProvider::new());
        provider.queue_response(MockLlmProvider::tool_call_response(
            "web_search",
            json!({"query": "acme"}),
        ));
        provider.queue_response(MockLlmProvider::tool_call_response(
            "scrape_page",
            json!({"url": "https://wiki.example/Acme"}),
        ));
        provider.queue_response(MockLlmProvider::text_response("done"));

        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(CitingTool)).unwrap();
        registry.register(Arc::new(FootnotedPage)).unwrap();
        let executor = ResearchTaskExecutor::new(Brain::new(provider), registry, 6);
        let result = executor.execute("Overview", SubjectType::Company).await;

        let context = SourceConsolidator::new(40, SourcePrunePolicy::MostCited).consolidate(
            "",
            &[result.compressed_finding],
            SubjectType::Company,
        );
        let urls: Vec<&str> = context.sources.iter().map(|s| s.url.as_str()).collect();
        assert_eq!(
            urls,
            vec![
                "https://anvils.example",
                "https://rockets.example",
                "https://wiki.example/Acme"
            ]
        );
        let finding = &context.findings[0];
        assert!(finding.contains("Results for acme: rockets [2], anvils [1]"));
        assert!(finding.contains("Acme was founded in 1990.[3] Its CEO is Jane Roe.\\[2\\]"));
        assert!(!finding.contains("Jane Roe.[2]"));
    }
}
