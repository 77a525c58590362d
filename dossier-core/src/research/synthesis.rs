//! Report synthesis: writes the report from consolidated findings and runs
//! the quality revision loop.
//!
//! Every draft gets the generated `## Sources` section in place of whatever
//! the model wrote, so the numbering always matches the consolidated list.

use super::consolidate::ConsolidatedContext;
use super::prompts;
use super::quality::QualityGate;
use super::relationship::RelationshipStatus;
use super::session::PipelineObserver;
use super::types::{Report, ReportStatus};
use crate::brain::Brain;
use crate::error::ResearchError;
use crate::types::SubjectType;
use regex::Regex;
use std::sync::{Arc, LazyLock};
use tracing::{error, info, warn};

static SOURCES_HEADING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)^#{1,3}\s*(?:sources|references)\s*:?\s*$").expect("sources heading pattern is valid")
});

static NEXT_SECTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^#{1,2}\s+\S").expect("section heading pattern is valid"));

/// Everything synthesis needs besides the consolidated context.
#[derive(Debug, Clone, Copy)]
pub struct SynthesisInput<'a> {
    pub brief: &'a str,
    pub subject_type: SubjectType,
    pub focus_area: Option<&'a str>,
    pub current_date: &'a str,
}

pub struct ReportSynthesizer {
    brain: Brain,
    gate: QualityGate,
    max_revisions: usize,
    observer: Option<Arc<dyn PipelineObserver>>,
}

impl ReportSynthesizer {
    pub fn new(brain: Brain, gate: QualityGate, max_revisions: usize) -> Self {
        Self {
            brain,
            gate,
            max_revisions,
            observer: None,
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn PipelineObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// One synthesis attempt, with the generated sources section applied.
    pub async fn synthesize(
        &self,
        input: &SynthesisInput<'_>,
        context: &ConsolidatedContext,
        relationship: &RelationshipStatus,
        revision: Option<(&str, &str)>,
    ) -> Result<String, ResearchError> {
        let prompt = prompts::synthesis(
            input.brief,
            input.subject_type,
            input.focus_area,
            &context.text,
            input.current_date,
            &relationship.directive(),
            revision,
        );
        let draft = self
            .brain
            .complete_text(prompts::SYNTHESIS_SYSTEM, &prompt)
            .await
            .map_err(|source| ResearchError::Synthesis { source })?;
        Ok(replace_sources_section(&draft, &sources_section(context)))
    }

    /// Synthesize, then revise on quality feedback until accepted or out of
    /// revisions.
    ///
    /// Never fails: if even the first draft cannot be written, the report is
    /// the consolidated findings themselves, marked `Exhausted`.
    pub async fn run(&self, input: &SynthesisInput<'_>, context: &ConsolidatedContext) -> Report {
        let relationship = RelationshipStatus::detect(&context.findings);
        info!(relationship = ?relationship, "Synthesizing report");

        let mut draft = match self.synthesize(input, context, &relationship, None).await {
            Ok(draft) => draft,
            Err(e) => {
                error!(error = %e, "Synthesis failed, returning consolidated findings");
                return Report {
                    content: fallback_report(context, &e),
                    status: ReportStatus::Exhausted,
                    revision_count: 0,
                    max_revisions_exceeded: false,
                    brief_max_revisions_exceeded: false,
                    sources: context.sources.clone(),
                };
            }
        };
        let mut revision_count = 0;

        let (status, max_revisions_exceeded) = loop {
            let verdict = self
                .gate
                .evaluate_report(input.brief, &draft, &relationship)
                .await;
            if verdict.passes {
                info!(revision_count, "Report accepted by quality gate");
                break (ReportStatus::Accepted, false);
            }
            if revision_count >= self.max_revisions {
                warn!(
                    revision_count,
                    max_revisions = self.max_revisions,
                    "Report revision bound reached, returning best effort"
                );
                break (ReportStatus::Exhausted, true);
            }

            revision_count += 1;
            let feedback = verdict
                .revision_prompt
                .unwrap_or_else(|| "Improve accuracy and citation coverage.".to_string());
            info!(revision = revision_count, "Revising report");
            if let Some(observer) = &self.observer {
                observer.on_revision(revision_count, self.max_revisions, &feedback);
            }

            match self
                .synthesize(input, context, &relationship, Some((&draft, &feedback)))
                .await
            {
                Ok(revised) => draft = revised,
                Err(e) => {
                    warn!(revision = revision_count, error = %e, "Revision failed, keeping previous draft");
                    break (ReportStatus::Exhausted, false);
                }
            }
        };

        Report {
            content: draft,
            status,
            revision_count,
            max_revisions_exceeded,
            brief_max_revisions_exceeded: false,
            sources: context.sources.clone(),
        }
    }
}

/// The findings as a report, for when no draft could be written.
fn fallback_report(context: &ConsolidatedContext, error: &ResearchError) -> String {
    let mut report = format!(
        "# Research Findings\n\n> The report could not be written ({error}). \
         The consolidated research findings follow unedited.\n"
    );
    for (i, finding) in context.findings.iter().enumerate() {
        report.push_str(&format!("\n## Findings Section {}\n\n{}\n", i + 1, finding.trim()));
    }
    replace_sources_section(&report, &sources_section(context))
}

fn sources_section(context: &ConsolidatedContext) -> String {
    if context.sources.is_empty() {
        "## Sources\n\nNo sources were collected during research.\n".to_string()
    } else {
        context.sources_section()
    }
}

/// Replace the report's last sources/references section with `section`,
/// keeping any sections the model wrote after it. The generated section
/// always ends the report.
pub fn replace_sources_section(report: &str, section: &str) -> String {
    let mut body = match SOURCES_HEADING.find_iter(report).last() {
        Some(heading) => {
            let after = &report[heading.end()..];
            let tail = NEXT_SECTION
                .find(after)
                .map(|next| after[next.start()..].trim())
                .unwrap_or_default();
            let mut body = report[..heading.start()].trim_end().to_string();
            if !tail.is_empty() {
                body.push_str("\n\n");
                body.push_str(tail);
            }
            body
        }
        None => report.trim_end().to_string(),
    };
    body.push_str("\n\n");
    body.push_str(section.trim_end());
    body.push('\n');
    body
}
