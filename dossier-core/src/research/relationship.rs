//! Relationship-trust rule: the internal search marker the report must honor.
//!
//! Internal search is the only authority on whether the subject has worked
//! with us before. Its findings carry a literal `Relationship status:` line;
//! this module detects it, turns it into a synthesis directive, and checks a
//! finished report against it before any evaluator model is consulted.

use super::types::QualityVerdict;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

static STATUS_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)^.*relationship status:\s*(existing client|past engagement|no prior engagement)\b.*$")
        .expect("relationship status pattern is valid")
});

static RELATIONSHIP_CLAIM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(existing client|current client|past client|former client|existing relationship|prior engagement with us|previously (?:worked|engaged) with us|our client)\b",
    )
    .expect("relationship claim pattern is valid")
});

static NEGATED_CLAIM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(no|not an?|never|without)\s+(?:\w+\s+){0,2}(existing|current|past|former|prior|our)\b")
        .expect("negated claim pattern is valid")
});

/// What internal search said about the relationship with the subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RelationshipStatus {
    /// An existing or past engagement; `evidence` is the marker line verbatim.
    ExistingClient { evidence: String },
    /// Internal search confirmed there is no prior engagement.
    NoPriorEngagement,
    /// No marker in any finding.
    Unknown,
}

impl RelationshipStatus {
    /// Scan findings for the marker. Positive evidence wins over a negative
    /// marker from another finding.
    pub fn detect<S: AsRef<str>>(findings: &[S]) -> Self {
        let mut status = RelationshipStatus::Unknown;
        for finding in findings {
            for caps in STATUS_LINE.captures_iter(finding.as_ref()) {
                let kind = caps[1].to_ascii_lowercase();
                if kind == "no prior engagement" {
                    if status == RelationshipStatus::Unknown {
                        status = RelationshipStatus::NoPriorEngagement;
                    }
                } else {
                    return RelationshipStatus::ExistingClient {
                        evidence: caps[0].trim().to_string(),
                    };
                }
            }
        }
        status
    }

    /// The instruction block injected into the synthesis prompt.
    pub fn directive(&self) -> String {
        match self {
            RelationshipStatus::ExistingClient { evidence } => format!(
                "RELATIONSHIP RULE (non-negotiable): Internal records confirm an existing relationship. \
                 The relationships section MUST state that the subject is an existing client and MUST \
                 quote this evidence verbatim:\n> {evidence}"
            ),
            RelationshipStatus::NoPriorEngagement => {
                "RELATIONSHIP RULE (non-negotiable): Internal records show NO prior engagement. \
                 Do NOT state or imply an existing relationship, even if retrieved case studies or \
                 press mentions look similar; they concern other entities."
                    .to_string()
            }
            RelationshipStatus::Unknown => {
                "RELATIONSHIP RULE: Internal records carry no relationship status for this subject. \
                 Do not speculate about whether a relationship exists."
                    .to_string()
            }
        }
    }

    /// Deterministic check of a report against this status.
    ///
    /// Returns `None` when the report complies.
    pub fn check(&self, report: &str) -> Option<QualityVerdict> {
        match self {
            RelationshipStatus::ExistingClient { evidence } => {
                let quote = evidence_body(evidence);
                if report.contains(quote) {
                    None
                } else {
                    Some(QualityVerdict::fail(format!(
                        "The relationships section must assert the existing client relationship and \
                         quote the internal evidence verbatim: \"{evidence}\""
                    )))
                }
            }
            RelationshipStatus::NoPriorEngagement => {
                let asserts = report.lines().any(|line| {
                    RELATIONSHIP_CLAIM.is_match(line) && !NEGATED_CLAIM.is_match(line)
                });
                asserts.then(|| {
                    QualityVerdict::fail(
                        "Internal records show no prior engagement. Remove every statement that \
                         asserts or implies an existing or past relationship with the subject.",
                    )
                })
            }
            RelationshipStatus::Unknown => None,
        }
    }
}

/// The marker line without list bullets or emphasis, for verbatim matching.
fn evidence_body(evidence: &str) -> &str {
    evidence
        .trim()
        .trim_start_matches(['-', '*', '>', ' '])
        .trim_matches('*')
        .trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_existing_client() {
        let findings = vec![
            "Acme builds rockets.".to_string(),
            "Internal search\nRelationship status: Existing client (2019 data platform project)\nmore".to_string(),
        ];
        assert_eq!(
            RelationshipStatus::detect(&findings),
            RelationshipStatus::ExistingClient {
                evidence: "Relationship status: Existing client (2019 data platform project)".into()
            }
        );
    }

    #[test]
    fn test_detect_past_engagement_counts_as_existing() {
        let status = RelationshipStatus::detect(&["relationship status: past engagement"]);
        assert!(matches!(status, RelationshipStatus::ExistingClient { .. }));
    }

    #[test]
    fn test_detect_no_prior_engagement() {
        let status = RelationshipStatus::detect(&["Relationship status: No prior engagement"]);
        assert_eq!(status, RelationshipStatus::NoPriorEngagement);
    }

    #[test]
    fn test_existing_wins_over_negative() {
        let status = RelationshipStatus::detect(&[
            "Relationship status: No prior engagement",
            "Relationship status: Existing client",
        ]);
        assert!(matches!(status, RelationshipStatus::ExistingClient { .. }));
    }

    #[test]
    fn test_detect_unknown() {
        assert_eq!(
            RelationshipStatus::detect(&["nothing about relationships"]),
            RelationshipStatus::Unknown
        );
    }

    #[test]
    fn test_no_prior_engagement_rejects_claim() {
        let status = RelationshipStatus::NoPriorEngagement;
        let report = "## Relationships\nAcme is an existing client of ours [3].";
        let verdict = status.check(report).unwrap();
        assert!(!verdict.passes);
    }

    #[test]
    fn test_no_prior_engagement_allows_negation() {
        let status = RelationshipStatus::NoPriorEngagement;
        let report = "## Relationships\nThere is no existing relationship with Acme.";
        assert!(status.check(report).is_none());
    }

    #[test]
    fn test_existing_client_requires_verbatim_quote() {
        let status = RelationshipStatus::ExistingClient {
            evidence: "- Relationship status: Existing client".into(),
        };
        assert!(status.check("Acme may have worked with us.").is_some());
        assert!(
            status
                .check("> Relationship status: Existing client\nAcme is a client.")
                .is_none()
        );
    }

    #[test]
    fn test_directive_mentions_evidence() {
        let status = RelationshipStatus::ExistingClient {
            evidence: "Relationship status: Existing client".into(),
        };
        assert!(status.directive().contains("> Relationship status: Existing client"));
        assert!(RelationshipStatus::NoPriorEngagement.directive().contains("Do NOT"));
    }
}
