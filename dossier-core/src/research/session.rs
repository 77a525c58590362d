//! Run session: stage tracking, timings and progress callbacks for one run.

use crate::types::{SubjectType, TokenUsage};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Current stage of a pipeline run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunStage {
    /// Deciding whether the query needs a follow-up question.
    Clarifying,
    /// Writing (and optionally validating) the research brief.
    CompilingBrief,
    /// Splitting the brief into question groups.
    Planning,
    /// Supervisor fan-out over the question groups.
    Researching,
    /// Merging and renumbering sources.
    Consolidating,
    /// Writing the report and running the quality loop.
    Synthesizing,
    /// A report was produced.
    Complete,
    /// The run ended with a clarifying question.
    AwaitingClarification,
    /// The run failed.
    Failed,
}

impl RunStage {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunStage::Complete | RunStage::AwaitingClarification | RunStage::Failed
        )
    }

    pub fn label(&self) -> &'static str {
        match self {
            RunStage::Clarifying => "clarifying",
            RunStage::CompilingBrief => "compiling brief",
            RunStage::Planning => "planning",
            RunStage::Researching => "researching",
            RunStage::Consolidating => "consolidating sources",
            RunStage::Synthesizing => "synthesizing report",
            RunStage::Complete => "complete",
            RunStage::AwaitingClarification => "awaiting clarification",
            RunStage::Failed => "failed",
        }
    }
}

impl std::fmt::Display for RunStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Wall-clock time spent in one stage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StageTiming {
    pub stage: RunStage,
    pub duration_ms: i64,
}

/// Tracks where a run is and how long each stage took.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSession {
    pub id: Uuid,
    pub query: String,
    pub subject_type: SubjectType,
    pub stage: RunStage,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub timings: Vec<StageTiming>,
    pub error: Option<String>,
}

impl RunSession {
    pub fn new(query: impl Into<String>, subject_type: SubjectType) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            query: query.into(),
            subject_type,
            stage: RunStage::Clarifying,
            created_at: now,
            updated_at: now,
            timings: Vec::new(),
            error: None,
        }
    }

    /// Move to `new_stage`, recording the time spent in the current one.
    /// Terminal stages are final.
    pub fn transition(&mut self, new_stage: RunStage) {
        if self.stage.is_terminal() {
            return;
        }
        let now = Utc::now();
        self.timings.push(StageTiming {
            stage: self.stage,
            duration_ms: (now - self.updated_at).num_milliseconds(),
        });
        self.stage = new_stage;
        self.updated_at = now;
    }

    /// Mark the run as failed.
    pub fn fail(&mut self, error: impl Into<String>) {
        self.error = Some(error.into());
        self.transition(RunStage::Failed);
    }

    pub fn is_active(&self) -> bool {
        !self.stage.is_terminal()
    }

    /// Rough progress through the pipeline (0.0-1.0).
    pub fn progress(&self) -> f64 {
        match self.stage {
            RunStage::Clarifying => 0.05,
            RunStage::CompilingBrief => 0.1,
            RunStage::Planning => 0.2,
            RunStage::Researching => 0.3,
            RunStage::Consolidating => 0.7,
            RunStage::Synthesizing => 0.8,
            RunStage::Complete | RunStage::AwaitingClarification | RunStage::Failed => 1.0,
        }
    }

    /// Total wall-clock time of the run so far, in milliseconds.
    pub fn elapsed_ms(&self) -> i64 {
        (self.updated_at - self.created_at).num_milliseconds()
    }
}

/// Counters and timings reported at the end of a run.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RunSummary {
    pub run_id: Option<Uuid>,
    pub final_stage: Option<RunStage>,
    pub timings: Vec<StageTiming>,
    pub elapsed_ms: i64,
    pub usage: TokenUsage,
    pub question_groups: usize,
    pub completed_groups: usize,
    pub failed_tasks: usize,
    pub research_iterations: usize,
    pub sources: usize,
    pub pruned_sources: usize,
    pub brief_revisions: usize,
    pub report_revisions: usize,
}

impl RunSummary {
    /// Seed a summary with the session's identity and timings.
    pub fn from_session(session: &RunSession, usage: TokenUsage) -> Self {
        Self {
            run_id: Some(session.id),
            final_stage: Some(session.stage),
            timings: session.timings.clone(),
            elapsed_ms: session.elapsed_ms(),
            usage,
            ..Self::default()
        }
    }
}

/// Callback trait for progress updates while a run executes.
pub trait PipelineObserver: Send + Sync {
    /// Called when the run enters a new stage.
    fn on_stage(&self, _stage: RunStage) {}
    /// Called as each research task finishes.
    fn on_task_complete(&self, _question_group: &str, _failed: bool) {}
    /// Called before a rejected report is resynthesized.
    fn on_revision(&self, _revision: usize, _max_revisions: usize, _feedback: &str) {}
}

/// Observer that ignores everything.
pub struct NoopObserver;

impl PipelineObserver for NoopObserver {}
