//! Research pipeline — from a short query to a cited long-form report.
//!
//! Stages, in order:
//! 1. **Clarify** — resolve embedded URLs or ask a follow-up question
//! 2. **Brief** — compile (and optionally validate) the research brief
//! 3. **Plan** — split the brief into at most N question groups
//! 4. **Research** — bounded parallel tool-use tasks, one per group
//! 5. **Consolidate** — dedupe and renumber every finding's sources
//! 6. **Synthesize** — write the report, revising on quality feedback

pub mod brief;
pub mod clarify;
pub mod consolidate;
pub mod pipeline;
pub mod planner;
pub mod prompts;
pub mod quality;
pub mod relationship;
pub mod session;
pub mod supervisor;
pub mod synthesis;
pub mod task;
pub mod types;

pub use consolidate::{ConsolidatedContext, SourceConsolidator, consolidate};
pub use pipeline::ResearchPipeline;
pub use relationship::RelationshipStatus;
pub use session::{NoopObserver, PipelineObserver, RunSession, RunStage, RunSummary};
pub use supervisor::{ResearchSupervisor, ResearchUnit, SupervisorState};
pub use types::{
    ConsolidatedSource, QualityVerdict, QuestionGroup, Report, ReportStatus, ResearchTaskResult,
    RunOutcome, RunRequest, StageOutcome,
};
