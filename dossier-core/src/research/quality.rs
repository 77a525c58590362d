//! Quality gate: model-backed evaluator for briefs and reports.
//!
//! Evaluation never fails a run: an evaluator outage or an unreadable
//! verdict is treated as a pass so the best available text goes out.

use super::prompts;
use super::relationship::RelationshipStatus;
use super::types::QualityVerdict;
use crate::brain::Brain;
use crate::types::SubjectType;
use serde::Deserialize;
use tracing::{debug, warn};

#[derive(Deserialize)]
struct RawVerdict {
    passes: bool,
    #[serde(default)]
    revision_prompt: Option<String>,
}

/// Evaluates briefs and reports with a completion model.
#[derive(Clone)]
pub struct QualityGate {
    brain: Brain,
}

impl QualityGate {
    pub fn new(brain: Brain) -> Self {
        Self { brain }
    }

    /// Judge whether a research brief is fit to seed research.
    pub async fn evaluate_brief(
        &self,
        query: &str,
        subject_type: SubjectType,
        brief: &str,
    ) -> QualityVerdict {
        let prompt = prompts::brief_evaluation(query, subject_type, brief);
        self.evaluate("brief", &prompt).await
    }

    /// Judge a synthesized report. The relationship rule is checked first and
    /// deterministically; the model is only asked when it holds.
    pub async fn evaluate_report(
        &self,
        brief: &str,
        report: &str,
        relationship: &RelationshipStatus,
    ) -> QualityVerdict {
        if let Some(verdict) = relationship.check(report) {
            debug!("Report rejected by relationship pre-check");
            return verdict;
        }
        let prompt = prompts::report_evaluation(brief, report);
        self.evaluate("report", &prompt).await
    }

    async fn evaluate(&self, target: &str, prompt: &str) -> QualityVerdict {
        match self.brain.complete_text(prompts::EVALUATOR_SYSTEM, prompt).await {
            Ok(text) => parse_verdict(&text).unwrap_or_else(|| {
                warn!(target_kind = target, "Unreadable evaluator verdict, accepting");
                QualityVerdict::pass()
            }),
            Err(e) => {
                warn!(target_kind = target, error = %e, "Evaluator call failed, accepting");
                QualityVerdict::pass()
            }
        }
    }
}

/// Parse an evaluator response into a verdict.
///
/// Accepts a JSON object anywhere in the text (fenced or not), falling back
/// to a plain `PASS` / `passes: true` answer. A failing verdict without
/// feedback gets a generic revision prompt.
pub fn parse_verdict(text: &str) -> Option<QualityVerdict> {
    if let Some(raw) = extract_json_object(text)
        .and_then(|json| serde_json::from_str::<RawVerdict>(json).ok())
    {
        return Some(if raw.passes {
            QualityVerdict::pass()
        } else {
            let prompt = raw
                .revision_prompt
                .filter(|p| !p.trim().is_empty())
                .unwrap_or_else(|| "Address the evaluator's concerns and improve accuracy.".to_string());
            QualityVerdict::fail(prompt)
        });
    }

    let lower = text.trim().to_ascii_lowercase();
    if lower == "pass" || lower.starts_with("pass\n") || lower.contains("passes: true") {
        return Some(QualityVerdict::pass());
    }
    if lower.contains("passes: false") || lower.starts_with("fail") {
        return Some(QualityVerdict::fail(text.trim()));
    }
    None
}

/// The first balanced `{ ... }` span in `text`.
fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}
