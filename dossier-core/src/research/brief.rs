//! Brief compiler: turns the query into the research brief that seeds planning.

use super::prompts;
use super::quality::QualityGate;
use super::types::StageOutcome;
use crate::brain::Brain;
use crate::error::ResearchError;
use crate::types::SubjectType;
use tracing::{info, warn};

/// The brief a run researches from, with its validation history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledBrief {
    pub text: String,
    pub revision_count: usize,
    /// Validation kept rejecting the brief; `text` is the last attempt.
    pub max_revisions_exceeded: bool,
}

pub struct BriefCompiler {
    brain: Brain,
    validator: Option<QualityGate>,
    max_revisions: usize,
}

impl BriefCompiler {
    pub fn new(brain: Brain) -> Self {
        Self {
            brain,
            validator: None,
            max_revisions: 0,
        }
    }

    /// Validate each brief with `gate`, recompiling at most `max_revisions` times.
    pub fn with_validation(mut self, gate: QualityGate, max_revisions: usize) -> Self {
        self.validator = Some(gate);
        self.max_revisions = max_revisions;
        self
    }

    /// One compilation. Completion errors are not absorbed.
    pub async fn compile_brief(
        &self,
        query: &str,
        subject_type: SubjectType,
        current_date: &str,
        feedback: Option<&str>,
    ) -> Result<String, ResearchError> {
        let prompt = prompts::brief(query, subject_type, current_date, feedback);
        self.brain
            .complete_text(prompts::BRIEF_SYSTEM, &prompt)
            .await
            .map(|text| text.trim().to_string())
            .map_err(|source| ResearchError::BriefCompilation { source })
    }

    /// Compile the brief and run the validation loop when one is configured.
    pub async fn compile(
        &self,
        query: &str,
        subject_type: SubjectType,
        current_date: &str,
    ) -> StageOutcome<CompiledBrief> {
        let mut text = match self.compile_brief(query, subject_type, current_date, None).await {
            Ok(text) => text,
            Err(e) => return StageOutcome::Fatal(e),
        };

        let Some(validator) = &self.validator else {
            return StageOutcome::Proceed(CompiledBrief {
                text,
                revision_count: 0,
                max_revisions_exceeded: false,
            });
        };

        let mut revision_count = 0;
        loop {
            let verdict = validator.evaluate_brief(query, subject_type, &text).await;
            if verdict.passes {
                info!(revision_count, "Research brief accepted");
                return StageOutcome::Proceed(CompiledBrief {
                    text,
                    revision_count,
                    max_revisions_exceeded: false,
                });
            }
            if revision_count >= self.max_revisions {
                warn!(
                    revision_count,
                    max_revisions = self.max_revisions,
                    "Brief revision bound reached, continuing with last brief"
                );
                return StageOutcome::Proceed(CompiledBrief {
                    text,
                    revision_count,
                    max_revisions_exceeded: true,
                });
            }

            revision_count += 1;
            info!(revision = revision_count, "Recompiling rejected research brief");
            text = match self
                .compile_brief(
                    query,
                    subject_type,
                    current_date,
                    verdict.revision_prompt.as_deref(),
                )
                .await
            {
                Ok(text) => text,
                Err(e) => return StageOutcome::Fatal(e),
            };
        }
    }
}
