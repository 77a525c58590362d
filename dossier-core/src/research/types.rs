//! Data model shared by the research stages.

use crate::error::ResearchError;
use crate::types::SubjectType;
use serde::{Deserialize, Serialize};

/// One independently researchable sub-topic derived from the brief.
pub type QuestionGroup = String;

/// Output of one research task run for one question group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchTaskResult {
    pub question_group: QuestionGroup,
    /// Finding text with local `[n]` citations and a trailing `### Sources` block.
    pub compressed_finding: String,
    /// Verbatim tool outputs gathered while researching.
    pub raw_notes: Vec<String>,
}

impl ResearchTaskResult {
    /// The placeholder result of a task that could not run to completion.
    pub fn failed(question_group: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self {
            question_group: question_group.into(),
            compressed_finding: format!("Research failed: {reason}"),
            raw_notes: Vec::new(),
        }
    }

    pub fn is_failure(&self) -> bool {
        self.compressed_finding.starts_with("Research failed:")
    }
}

/// Evaluator verdict on a brief or a report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityVerdict {
    pub passes: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision_prompt: Option<String>,
}

impl QualityVerdict {
    pub fn pass() -> Self {
        Self {
            passes: true,
            revision_prompt: None,
        }
    }

    pub fn fail(revision_prompt: impl Into<String>) -> Self {
        Self {
            passes: false,
            revision_prompt: Some(revision_prompt.into()),
        }
    }
}

/// One entry of the run-wide, deduplicated source list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsolidatedSource {
    pub id: usize,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl std::fmt::Display for ConsolidatedSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.description {
            Some(description) => write!(f, "{}. {} - {}", self.id, self.url, description),
            None => write!(f, "{}. {}", self.id, self.url),
        }
    }
}

/// How the quality loop over the report ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    /// The quality gate accepted the report.
    Accepted,
    /// The revision bound was hit; the last attempt is returned as best effort.
    Exhausted,
}

/// The synthesized research report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub content: String,
    pub status: ReportStatus,
    pub revision_count: usize,
    pub max_revisions_exceeded: bool,
    pub brief_max_revisions_exceeded: bool,
    pub sources: Vec<ConsolidatedSource>,
}

/// What one run hands back to its caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RunOutcome {
    /// Research completed and produced a report.
    Report { report: Report },
    /// The query was ambiguous; the run stopped with a follow-up question.
    Clarification { question: String },
    /// A fatal stage failure; the message is the user-visible text.
    Failed { message: String },
}

impl RunOutcome {
    /// The user-visible text of this outcome.
    pub fn text(&self) -> &str {
        match self {
            RunOutcome::Report { report } => &report.content,
            RunOutcome::Clarification { question } => question,
            RunOutcome::Failed { message } => message,
        }
    }

    pub fn report(&self) -> Option<&Report> {
        match self {
            RunOutcome::Report { report } => Some(report),
            _ => None,
        }
    }
}

/// Outcome of a single pipeline stage.
#[derive(Debug)]
pub enum StageOutcome<T> {
    /// Continue to the next stage with this value.
    Proceed(T),
    /// End the run successfully with this text (e.g. a clarifying question).
    Terminate(String),
    /// End the run with an error.
    Fatal(ResearchError),
}

/// Everything a run needs from its caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRequest {
    pub query: String,
    pub subject_type: SubjectType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub focus_area: Option<String>,
}

impl RunRequest {
    pub fn new(query: impl Into<String>, subject_type: SubjectType) -> Self {
        Self {
            query: query.into(),
            subject_type,
            focus_area: None,
        }
    }

    pub fn with_focus_area(mut self, focus_area: impl Into<String>) -> Self {
        let focus_area = focus_area.into();
        if !focus_area.trim().is_empty() {
            self.focus_area = Some(focus_area);
        }
        self
    }
}
