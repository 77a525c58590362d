//! Integration tests for the research pipeline.
//!
//! These tests drive full runs end-to-end with a scripted MockLlmProvider and
//! in-memory tools, covering clarification, research fan-out, consolidation,
//! the relationship rule, and the revision bounds.

use async_trait::async_trait;
use dossier_core::brain::{Brain, MockLlmProvider};
use dossier_core::config::ResearchConfig;
use dossier_core::error::ToolError;
use dossier_core::research::prompts;
use dossier_core::research::{
    PipelineObserver, ReportStatus, ResearchPipeline, ResearchTaskResult, ResearchUnit,
    RunOutcome, RunRequest, RunStage,
};
use dossier_core::tools::{EntityResolver, ResearchTool, ToolRegistry};
use dossier_core::types::{CompletionRequest, CompletionResponse, Role, SourceRef, SubjectType, ToolOutput};
use dossier_core::LlmError;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

const BRIEF: &str = "# Brief\n\n## Overview\n- What does Acme do?\n\n## Relationships\n- Have we worked with Acme?";

struct StaticResolver(Option<&'static str>);

#[async_trait]
impl EntityResolver for StaticResolver {
    async fn resolve(&self, _url: &str) -> Option<String> {
        self.0.map(str::to_string)
    }
}

struct InternalSearch;

#[async_trait]
impl ResearchTool for InternalSearch {
    fn name(&self) -> &str {
        "internal_search"
    }
    fn description(&self) -> &str {
        "Search internal records"
    }
    fn parameters_schema(&self) -> serde_json::Value {
        json!({"type": "object", "properties": {"query": {"type": "string"}}})
    }
    async fn execute(&self, _args: serde_json::Value) -> Result<ToolOutput, ToolError> {
        Ok(ToolOutput::text("CRM has no record of Acme Corp [1].\nRelationship status: No prior engagement")
            .with_source(SourceRef::new("https://crm.internal/acme").with_title("CRM")))
    }
}

struct WebSearch;

#[async_trait]
impl ResearchTool for WebSearch {
    fn name(&self) -> &str {
        "web_search"
    }
    fn description(&self) -> &str {
        "Search the web"
    }
    fn parameters_schema(&self) -> serde_json::Value {
        json!({"type": "object", "properties": {"query": {"type": "string"}}})
    }
    async fn execute(&self, _args: serde_json::Value) -> Result<ToolOutput, ToolError> {
        Ok(ToolOutput::text(
            "Acme Corp builds rockets [1]. Case study: our work with Acme Ltd (a different firm) [2].",
        )
        .with_source(SourceRef::new("https://acme.example").with_title("Acme home"))
        .with_source(SourceRef::new("https://casestudies.example/acme-ltd")))
    }
}

fn registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(InternalSearch)).unwrap();
    registry.register(Arc::new(WebSearch)).unwrap();
    registry
}

fn text(s: &str) -> Result<CompletionResponse, LlmError> {
    Ok(MockLlmProvider::text_response(s))
}

/// Researcher turns: internal search, then web search, then a summary.
fn research_turn(request: &CompletionRequest) -> Result<CompletionResponse, LlmError> {
    let tool_results = request
        .messages
        .iter()
        .filter(|m| m.role == Role::Tool)
        .count();
    match tool_results {
        0 => Ok(MockLlmProvider::tool_call_response(
            "internal_search",
            json!({"query": "Acme"}),
        )),
        1 => Ok(MockLlmProvider::tool_call_response(
            "web_search",
            json!({"query": "Acme Corp"}),
        )),
        _ => text("Coverage complete."),
    }
}

fn is_brief_evaluation(request: &CompletionRequest) -> bool {
    request.system_text() == Some(prompts::EVALUATOR_SYSTEM)
        && request
            .last_user_text()
            .is_some_and(|t| t.contains("Does this brief"))
}

#[derive(Default)]
struct RecordingObserver {
    stages: Mutex<Vec<RunStage>>,
    tasks: Mutex<Vec<String>>,
    revisions: Mutex<Vec<usize>>,
}

impl PipelineObserver for RecordingObserver {
    fn on_stage(&self, stage: RunStage) {
        self.stages.lock().unwrap().push(stage);
    }
    fn on_task_complete(&self, question_group: &str, _failed: bool) {
        self.tasks.lock().unwrap().push(question_group.to_string());
    }
    fn on_revision(&self, revision: usize, _max: usize, _feedback: &str) {
        self.revisions.lock().unwrap().push(revision);
    }
}

#[tokio::test]
async fn test_full_run_enforces_no_prior_engagement() {
    let synthesis_calls = Arc::new(AtomicUsize::new(0));
    let calls = synthesis_calls.clone();
    let provider = Arc::new(MockLlmProvider::with_handler(move |request| {
        match request.system_text() {
            Some(prompts::CLARIFY_SYSTEM) => text("need_clarification: false"),
            Some(prompts::BRIEF_SYSTEM) => text(BRIEF),
            Some(prompts::RESEARCHER_SYSTEM) => research_turn(request),
            Some(prompts::SYNTHESIS_SYSTEM) => {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    text("# Acme Corp\n## Relationships\nAcme is an existing client [3].")
                } else {
                    text("# Acme Corp\nAcme builds rockets [2].\n## Relationships\nNothing on record.\n\n## Sources\n[1] bogus")
                }
            }
            Some(prompts::EVALUATOR_SYSTEM) => text(r#"{"passes": true}"#),
            _ => text("unexpected"),
        }
    }));
    let observer = Arc::new(RecordingObserver::default());
    let pipeline = ResearchPipeline::new(
        Brain::new(provider.clone()),
        registry(),
        ResearchConfig::default(),
    )
    .with_observer(observer.clone());

    let (outcome, summary) = pipeline
        .run_with_summary(RunRequest::new("Acme Corp", SubjectType::Company))
        .await;

    let report = outcome.report().expect("run should produce a report");
    assert_eq!(report.status, ReportStatus::Accepted);
    assert_eq!(report.revision_count, 1);
    assert!(!report.content.contains("existing client"));
    assert!(!report.content.contains("bogus"));
    assert!(report.content.ends_with(
        "## Sources\n\n[1] https://crm.internal/acme - CRM\n[2] https://acme.example - Acme home\n[3] https://casestudies.example/acme-ltd\n"
    ));
    assert_eq!(report.sources.len(), 3);

    // The relationship directive reached the synthesis prompt.
    let synthesis_prompt = provider
        .requests()
        .into_iter()
        .find(|r| r.system_text() == Some(prompts::SYNTHESIS_SYSTEM))
        .and_then(|r| r.last_user_text().map(str::to_string))
        .unwrap();
    assert!(synthesis_prompt.contains("NO prior engagement"));
    assert!(synthesis_prompt.contains("Total sources available: 3"));

    assert_eq!(summary.question_groups, 2);
    assert_eq!(summary.completed_groups, 2);
    assert_eq!(summary.sources, 3);
    assert_eq!(summary.report_revisions, 1);
    assert_eq!(observer.tasks.lock().unwrap().len(), 2);
    assert_eq!(*observer.revisions.lock().unwrap(), vec![1]);
    assert_eq!(
        *observer.stages.lock().unwrap(),
        vec![
            RunStage::Clarifying,
            RunStage::CompilingBrief,
            RunStage::Planning,
            RunStage::Researching,
            RunStage::Consolidating,
            RunStage::Synthesizing,
            RunStage::Complete,
        ]
    );
}

#[tokio::test]
async fn test_resolved_url_skips_classifier() {
    let provider = Arc::new(MockLlmProvider::with_handler(|request| {
        match request.system_text() {
            Some(prompts::CLARIFY_SYSTEM) => text("Which Acme do you mean?"),
            Some(prompts::BRIEF_SYSTEM) => text(BRIEF),
            Some(prompts::EVALUATOR_SYSTEM) => text(r#"{"passes": true}"#),
            _ => text("# Acme\nDone."),
        }
    }));
    let pipeline = ResearchPipeline::new(
        Brain::new(provider.clone()),
        ToolRegistry::new(),
        ResearchConfig::default(),
    )
    .with_resolver(Arc::new(StaticResolver(Some("Acme"))));

    let outcome = pipeline
        .run(RunRequest::new("profile www.acme.com", SubjectType::Company))
        .await;

    assert!(matches!(outcome, RunOutcome::Report { .. }));
    let requests = provider.requests();
    assert!(
        requests
            .iter()
            .all(|r| r.system_text() != Some(prompts::CLARIFY_SYSTEM))
    );
    let brief_prompt = requests
        .iter()
        .find(|r| r.system_text() == Some(prompts::BRIEF_SYSTEM))
        .and_then(|r| r.last_user_text())
        .unwrap();
    assert!(brief_prompt.contains("profile Acme"));
    assert!(!brief_prompt.contains("www.acme.com"));
}

#[tokio::test]
async fn test_clarifying_question_ends_run() {
    let provider = Arc::new(MockLlmProvider::with_handler(|request| {
        match request.system_text() {
            Some(prompts::CLARIFY_SYSTEM) => text("Do you mean Acme Corp or Acme Ltd?"),
            _ => text("should not be called"),
        }
    }));
    let pipeline = ResearchPipeline::new(
        Brain::new(provider.clone()),
        registry(),
        ResearchConfig::default(),
    )
    .with_resolver(Arc::new(StaticResolver(None)));

    let (outcome, summary) = pipeline
        .run_with_summary(RunRequest::new("profile acme.com", SubjectType::Company))
        .await;

    assert_eq!(
        outcome,
        RunOutcome::Clarification {
            question: "Do you mean Acme Corp or Acme Ltd?".into()
        }
    );
    assert_eq!(provider.call_count(), 1);
    assert_eq!(summary.final_stage, Some(RunStage::AwaitingClarification));
}

struct CountingUnit {
    calls: AtomicUsize,
}

#[async_trait]
impl ResearchUnit for CountingUnit {
    async fn run_task(&self, question_group: &str, _subject: SubjectType) -> ResearchTaskResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        ResearchTaskResult {
            question_group: question_group.to_string(),
            compressed_finding: format!("{question_group} [1]\n### Sources\n1. https://shared.example"),
            raw_notes: Vec::new(),
        }
    }
}

#[tokio::test]
async fn test_single_round_researches_every_group() {
    let provider = Arc::new(MockLlmProvider::with_handler(|request| {
        match request.system_text() {
            Some(prompts::BRIEF_SYSTEM) => text("## A\n- a?\n\n## B\n- b?\n\n## C\n- c?"),
            Some(prompts::EVALUATOR_SYSTEM) => text(r#"{"passes": true}"#),
            _ => text("# Report"),
        }
    }));
    let unit = Arc::new(CountingUnit {
        calls: AtomicUsize::new(0),
    });
    let config = ResearchConfig {
        clarification_enabled: false,
        max_researcher_iterations: 1,
        max_concurrent_research_units: 2,
        ..ResearchConfig::default()
    };
    let pipeline = ResearchPipeline::new(Brain::new(provider), ToolRegistry::new(), config)
        .with_research_unit(unit.clone());

    let (outcome, summary) = pipeline
        .run_with_summary(RunRequest::new("Acme", SubjectType::Company))
        .await;

    assert!(outcome.report().is_some());
    assert_eq!(summary.question_groups, 3);
    assert_eq!(summary.research_iterations, 1);
    assert_eq!(summary.completed_groups, 3);
    assert_eq!(unit.calls.load(Ordering::SeqCst), 3);
    // Every finding cites the same URL.
    assert_eq!(summary.sources, 1);
}

#[tokio::test]
async fn test_brief_validation_bound_is_flagged() {
    let provider = Arc::new(MockLlmProvider::with_handler(|request| {
        if is_brief_evaluation(request) {
            return text(r#"{"passes": false, "revision_prompt": "be more specific"}"#);
        }
        match request.system_text() {
            Some(prompts::BRIEF_SYSTEM) => text(BRIEF),
            Some(prompts::EVALUATOR_SYSTEM) => text(r#"{"passes": true}"#),
            _ => text("# Report"),
        }
    }));
    let config = ResearchConfig {
        clarification_enabled: false,
        brief_validation: true,
        brief_max_revisions: 1,
        ..ResearchConfig::default()
    };
    let pipeline = ResearchPipeline::new(Brain::new(provider.clone()), ToolRegistry::new(), config);

    let (outcome, summary) = pipeline
        .run_with_summary(RunRequest::new("Acme", SubjectType::Company))
        .await;

    let report = outcome.report().unwrap();
    assert!(report.brief_max_revisions_exceeded);
    assert!(!report.max_revisions_exceeded);
    assert_eq!(summary.brief_revisions, 1);
    let brief_calls = provider
        .requests()
        .iter()
        .filter(|r| r.system_text() == Some(prompts::BRIEF_SYSTEM))
        .count();
    assert_eq!(brief_calls, 2);
}

#[tokio::test]
async fn test_report_revision_bound_returns_best_effort() {
    let provider = Arc::new(MockLlmProvider::with_handler(|request| {
        match request.system_text() {
            Some(prompts::BRIEF_SYSTEM) => text(BRIEF),
            Some(prompts::EVALUATOR_SYSTEM) => {
                text(r#"{"passes": false, "revision_prompt": "needs more detail"}"#)
            }
            _ => text("# Report\nBest effort."),
        }
    }));
    let config = ResearchConfig {
        clarification_enabled: false,
        max_report_revisions: 1,
        ..ResearchConfig::default()
    };
    let pipeline = ResearchPipeline::new(Brain::new(provider), ToolRegistry::new(), config);

    let outcome = pipeline
        .run(RunRequest::new("Acme", SubjectType::Company).with_focus_area("funding"))
        .await;

    let report = outcome.report().unwrap();
    assert_eq!(report.status, ReportStatus::Exhausted);
    assert!(report.max_revisions_exceeded);
    assert_eq!(report.revision_count, 1);
    assert!(outcome.text().starts_with("# Report\nBest effort."));
}

#[tokio::test]
async fn test_brief_failure_surfaces_error_text() {
    let provider = Arc::new(MockLlmProvider::with_handler(|request| {
        match request.system_text() {
            Some(prompts::BRIEF_SYSTEM) => Err(LlmError::AuthFailed {
                provider: "openai".into(),
            }),
            _ => text("need_clarification: false"),
        }
    }));
    let pipeline = ResearchPipeline::new(
        Brain::new(provider),
        ToolRegistry::new(),
        ResearchConfig::default(),
    );

    let outcome = pipeline
        .run(RunRequest::new("Acme", SubjectType::Company))
        .await;

    assert_eq!(
        outcome.text(),
        "Brief compilation failed: Authentication failed for provider openai"
    );
}
