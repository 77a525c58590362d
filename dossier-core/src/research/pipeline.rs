//! The research pipeline: one run from query to report.
//!
//! Stages run in a fixed order: clarify, compile brief, plan, research,
//! consolidate, synthesize. Each stage hands back a [`StageOutcome`]; only
//! `Proceed` moves the run forward.

use super::brief::{BriefCompiler, CompiledBrief};
use super::clarify::ClarificationGate;
use super::consolidate::SourceConsolidator;
use super::planner::QuestionGroupPlanner;
use super::quality::QualityGate;
use super::session::{NoopObserver, PipelineObserver, RunSession, RunStage, RunSummary};
use super::supervisor::{ResearchSupervisor, ResearchUnit};
use super::synthesis::{ReportSynthesizer, SynthesisInput};
use super::task::ResearchTaskExecutor;
use super::types::{RunOutcome, RunRequest, StageOutcome};
use crate::brain::Brain;
use crate::config::ResearchConfig;
use crate::error::ResearchError;
use crate::tools::{EntityResolver, NoopResolver, ToolRegistry};
use chrono::Utc;
use std::sync::Arc;
use tracing::{error, info};

pub struct ResearchPipeline {
    brain: Brain,
    tools: ToolRegistry,
    resolver: Arc<dyn EntityResolver>,
    config: ResearchConfig,
    observer: Arc<dyn PipelineObserver>,
    research_unit: Option<Arc<dyn ResearchUnit>>,
}

impl ResearchPipeline {
    pub fn new(brain: Brain, tools: ToolRegistry, config: ResearchConfig) -> Self {
        Self {
            brain,
            tools,
            resolver: Arc::new(NoopResolver),
            config,
            observer: Arc::new(NoopObserver),
            research_unit: None,
        }
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn EntityResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn PipelineObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Research question groups with `unit` instead of the tool-loop executor.
    pub fn with_research_unit(mut self, unit: Arc<dyn ResearchUnit>) -> Self {
        self.research_unit = Some(unit);
        self
    }

    pub fn config(&self) -> &ResearchConfig {
        &self.config
    }

    /// Run the pipeline once.
    pub async fn run(&self, request: RunRequest) -> RunOutcome {
        self.run_with_summary(request).await.0
    }

    /// Run the pipeline once and report what it did.
    pub async fn run_with_summary(&self, request: RunRequest) -> (RunOutcome, RunSummary) {
        let mut session = RunSession::new(&request.query, request.subject_type);
        let mut summary = RunSummary::default();
        info!(run_id = %session.id, subject_type = %request.subject_type, "Starting research run");

        let outcome = self.execute(&request, &mut session, &mut summary).await;
        match &outcome {
            RunOutcome::Report { .. } => self.enter(&mut session, RunStage::Complete),
            RunOutcome::Clarification { .. } => {
                self.enter(&mut session, RunStage::AwaitingClarification)
            }
            RunOutcome::Failed { message } => {
                session.fail(message.clone());
                self.observer.on_stage(RunStage::Failed);
            }
        }

        let summary = RunSummary {
            question_groups: summary.question_groups,
            completed_groups: summary.completed_groups,
            failed_tasks: summary.failed_tasks,
            research_iterations: summary.research_iterations,
            sources: summary.sources,
            pruned_sources: summary.pruned_sources,
            brief_revisions: summary.brief_revisions,
            report_revisions: summary.report_revisions,
            ..RunSummary::from_session(&session, self.brain.total_usage())
        };
        info!(
            run_id = %session.id,
            stage = %session.stage,
            elapsed_ms = summary.elapsed_ms,
            tokens = summary.usage.total(),
            "Research run finished"
        );
        (outcome, summary)
    }

    async fn execute(
        &self,
        request: &RunRequest,
        session: &mut RunSession,
        summary: &mut RunSummary,
    ) -> RunOutcome {
        let cfg = &self.config;
        let subject_type = request.subject_type;
        let current_date = Utc::now().format("%B %-d, %Y").to_string();

        self.observer.on_stage(RunStage::Clarifying);
        let gate = ClarificationGate::new(self.brain.clone(), Arc::clone(&self.resolver));
        let query = match gate.clarify(&request.query, cfg.clarification_enabled).await {
            StageOutcome::Proceed(query) => query,
            StageOutcome::Terminate(question) => return RunOutcome::Clarification { question },
            StageOutcome::Fatal(e) => return fatal(RunStage::Clarifying, e),
        };

        self.enter(session, RunStage::CompilingBrief);
        let mut compiler = BriefCompiler::new(self.brain.clone());
        if cfg.brief_validation {
            compiler = compiler.with_validation(
                QualityGate::new(self.brain.clone()),
                cfg.brief_max_revisions,
            );
        }
        let brief: CompiledBrief = match compiler.compile(&query, subject_type, &current_date).await {
            StageOutcome::Proceed(brief) => brief,
            StageOutcome::Terminate(question) => return RunOutcome::Clarification { question },
            StageOutcome::Fatal(e) => return fatal(RunStage::CompilingBrief, e),
        };
        summary.brief_revisions = brief.revision_count;

        self.enter(session, RunStage::Planning);
        let groups = QuestionGroupPlanner::new(cfg.max_question_groups, cfg.group_merge_policy)
            .plan(&brief.text);
        summary.question_groups = groups.len();

        self.enter(session, RunStage::Researching);
        let unit: Arc<dyn ResearchUnit> = match &self.research_unit {
            Some(unit) => Arc::clone(unit),
            None => Arc::new(ResearchTaskExecutor::new(
                self.brain.clone(),
                self.tools.clone(),
                cfg.tool_call_iterations,
            )),
        };
        let state = ResearchSupervisor::new(
            unit,
            cfg.max_researcher_iterations,
            cfg.max_concurrent_research_units,
        )
        .with_observer(Arc::clone(&self.observer))
        .supervise(&groups, subject_type)
        .await;
        summary.research_iterations = state.research_iterations;
        summary.completed_groups = state.completed_groups.len();
        summary.failed_tasks = state
            .notes
            .iter()
            .filter(|n| n.starts_with("Research failed:"))
            .count();

        self.enter(session, RunStage::Consolidating);
        let context = SourceConsolidator::new(cfg.max_sources, cfg.source_prune_policy)
            .consolidate(&brief.text, &state.notes, subject_type);
        summary.sources = context.sources.len();
        summary.pruned_sources = context.pruned;

        self.enter(session, RunStage::Synthesizing);
        let input = SynthesisInput {
            brief: &brief.text,
            subject_type,
            focus_area: request.focus_area.as_deref(),
            current_date: &current_date,
        };
        let synthesizer = ReportSynthesizer::new(
            self.brain.clone(),
            QualityGate::new(self.brain.clone()),
            cfg.max_report_revisions,
        )
        .with_observer(Arc::clone(&self.observer));
        let mut report = synthesizer.run(&input, &context).await;
        report.brief_max_revisions_exceeded = brief.max_revisions_exceeded;
        summary.report_revisions = report.revision_count;
        RunOutcome::Report { report }
    }

    fn enter(&self, session: &mut RunSession, stage: RunStage) {
        session.transition(stage);
        info!(run_id = %session.id, stage = %stage, "Entering stage");
        self.observer.on_stage(stage);
    }
}

fn fatal(stage: RunStage, e: ResearchError) -> RunOutcome {
    error!(stage = %stage, error = %e, "Research run failed");
    RunOutcome::Failed {
        message: e.to_string(),
    }
}
