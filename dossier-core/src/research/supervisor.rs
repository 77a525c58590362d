//! Research supervisor: bounded fan-out over the planned question groups.
//!
//! Each round dispatches every outstanding group to research units, at most
//! `max_concurrency` at a time, and waits for the whole round before deciding whether to go again. Results
//! are folded into the accumulator in the order they complete; that order is
//! what source consolidation numbers by.

use super::session::PipelineObserver;
use super::types::{QuestionGroup, ResearchTaskResult};
use crate::types::SubjectType;
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Something that can research one question group.
#[async_trait]
pub trait ResearchUnit: Send + Sync {
    /// Always produces a result; failures come back as a failure note.
    async fn run_task(&self, question_group: &str, subject_type: SubjectType) -> ResearchTaskResult;
}

/// Accumulated supervisor state for one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SupervisorState {
    pub research_iterations: usize,
    pub completed_groups: Vec<QuestionGroup>,
    /// Findings in merge order.
    pub notes: Vec<String>,
    pub raw_notes: Vec<String>,
}

impl SupervisorState {
    /// Planned groups not yet completed, in plan order.
    pub fn remaining<'a>(&self, groups: &'a [QuestionGroup]) -> Vec<&'a QuestionGroup> {
        groups
            .iter()
            .filter(|g| !self.completed_groups.contains(*g))
            .collect()
    }

    /// Fold one finished task into the state. Completing a group twice
    /// records it once.
    pub fn merge(&mut self, group: &str, result: ResearchTaskResult) {
        self.notes.push(result.compressed_finding);
        self.raw_notes.extend(result.raw_notes);
        if !self.completed_groups.iter().any(|g| g == group) {
            self.completed_groups.push(group.to_string());
        }
    }
}

pub struct ResearchSupervisor {
    unit: Arc<dyn ResearchUnit>,
    max_iterations: usize,
    max_concurrency: usize,
    observer: Option<Arc<dyn PipelineObserver>>,
}

impl ResearchSupervisor {
    pub fn new(unit: Arc<dyn ResearchUnit>, max_iterations: usize, max_concurrency: usize) -> Self {
        Self {
            unit,
            max_iterations: max_iterations.max(1),
            max_concurrency: max_concurrency.max(1),
            observer: None,
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn PipelineObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Research `groups` until all are complete or the iteration bound is hit.
    pub async fn supervise(
        &self,
        groups: &[QuestionGroup],
        subject_type: SubjectType,
    ) -> SupervisorState {
        let mut state = SupervisorState::default();

        loop {
            let remaining = state.remaining(groups);
            if remaining.is_empty() {
                debug!(iterations = state.research_iterations, "All question groups complete");
                break;
            }

            // Every outstanding group is dispatched; `max_concurrency` only
            // bounds how many run at once.
            let batch: Vec<QuestionGroup> = remaining.into_iter().cloned().collect();
            info!(
                iteration = state.research_iterations + 1,
                dispatched = batch.len(),
                workers = self.max_concurrency,
                "Dispatching research round"
            );

            let mut completions = stream::iter(batch)
                .map(|group| {
                    let unit = Arc::clone(&self.unit);
                    async move {
                        let result = unit.run_task(&group, subject_type).await;
                        (group, result)
                    }
                })
                .buffer_unordered(self.max_concurrency);

            while let Some((group, result)) = completions.next().await {
                if result.is_failure() {
                    warn!(group = %group, "Research task failed");
                }
                if let Some(observer) = &self.observer {
                    observer.on_task_complete(&group, result.is_failure());
                }
                state.merge(&group, result);
            }

            let exhausted = state.research_iterations + 1 >= self.max_iterations;
            state.research_iterations += 1;
            if exhausted {
                let outstanding = state.remaining(groups).len();
                if outstanding > 0 {
                    warn!(
                        iterations = state.research_iterations,
                        outstanding, "Research iteration bound reached with groups outstanding"
                    );
                }
                break;
            }
        }

        state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Later groups (alphabetically) sleep less and so finish first.
    struct StaggeredUnit {
        calls: Mutex<Vec<String>>,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl ResearchUnit for StaggeredUnit {
        async fn run_task(&self, group: &str, _subject: SubjectType) -> ResearchTaskResult {
            self.calls.lock().unwrap().push(group.to_string());
            let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(running, Ordering::SeqCst);
            let delay = 200 - 10 * u64::from(group.as_bytes()[0] - b'a');
            tokio::time::sleep(Duration::from_millis(delay)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            ResearchTaskResult {
                question_group: group.to_string(),
                compressed_finding: format!("finding for {group}"),
                raw_notes: vec![format!("raw {group}")],
            }
        }
    }

    fn groups(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn unit() -> Arc<StaggeredUnit> {
        Arc::new(StaggeredUnit {
            calls: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_round_completes_all() {
        let unit = unit();
        let supervisor = ResearchSupervisor::new(unit.clone(), 3, 5);
        let state = supervisor
            .supervise(&groups(&["a", "b", "c"]), SubjectType::Company)
            .await;

        assert_eq!(state.research_iterations, 1);
        assert_eq!(state.completed_groups.len(), 3);
        // Merged in completion order: the last dispatched finishes first.
        assert_eq!(
            state.notes,
            vec!["finding for c", "finding for b", "finding for a"]
        );
        assert_eq!(state.raw_notes.len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_round_dispatches_every_group() {
        let unit = unit();
        let supervisor = ResearchSupervisor::new(unit.clone(), 1, 2);
        let all = groups(&["a", "b", "c"]);
        let state = supervisor.supervise(&all, SubjectType::Company).await;

        assert_eq!(state.research_iterations, 1);
        assert_eq!(state.completed_groups.len(), 3);
        assert!(state.remaining(&all).is_empty());
        assert_eq!(unit.calls.lock().unwrap().len(), 3);
        assert!(unit.peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_worker_count_bounds_concurrency_not_dispatch() {
        let unit = unit();
        let supervisor = ResearchSupervisor::new(unit.clone(), 1, 5);
        let all = groups(&["a", "b", "c", "d", "e", "f", "g", "h", "i", "j", "k", "l"]);
        let state = supervisor.supervise(&all, SubjectType::Company).await;

        assert_eq!(state.research_iterations, 1);
        assert_eq!(state.completed_groups.len(), 12);
        assert_eq!(state.notes.len(), 12);
        assert_eq!(unit.peak.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn test_no_groups_runs_nothing() {
        let supervisor = ResearchSupervisor::new(unit(), 3, 5);
        let state = supervisor.supervise(&[], SubjectType::Company).await;
        assert_eq!(state, SupervisorState::default());
    }

    #[test]
    fn test_merge_is_idempotent_on_completion() {
        let mut state = SupervisorState::default();
        state.merge("a", ResearchTaskResult::failed("a", "x"));
        state.merge("a", ResearchTaskResult::failed("a", "y"));
        assert_eq!(state.completed_groups, vec!["a"]);
        assert_eq!(state.notes.len(), 2);
    }
}
