//! Question-group planner: splits a research brief into independently
//! researchable topics.
//!
//! Planning is a deterministic parse of the brief's markdown: sections become
//! groups, or top-level list items when the brief has no headings, or the
//! whole brief when it has neither. Groups over the cap are merged, never
//! dropped.

use super::types::QuestionGroup;
use crate::config::GroupMergePolicy;
use regex::Regex;
use std::sync::LazyLock;
use tracing::debug;

static HEADING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^ {0,3}(#{1,6})\s+\S").expect("heading pattern is valid"));

static LIST_ITEM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:[-*+]|\d+[.)])\s+\S").expect("list item pattern is valid"));

const FALLBACK_GROUP: &str = "General overview of the subject";

#[derive(Debug, Clone)]
pub struct QuestionGroupPlanner {
    max_groups: usize,
    merge_policy: GroupMergePolicy,
}

impl QuestionGroupPlanner {
    pub fn new(max_groups: usize, merge_policy: GroupMergePolicy) -> Self {
        Self {
            max_groups: max_groups.max(1),
            merge_policy,
        }
    }

    /// Ordered, non-empty question groups for `brief`, at most `max_groups`.
    pub fn plan(&self, brief: &str) -> Vec<QuestionGroup> {
        let mut groups = split_sections(brief);
        if groups.is_empty() {
            groups = split_list_items(brief);
        }
        if groups.is_empty() {
            let whole = brief.trim();
            groups.push(if whole.is_empty() {
                FALLBACK_GROUP.to_string()
            } else {
                whole.to_string()
            });
        }

        let parsed = groups.len();
        let groups = match self.merge_policy {
            GroupMergePolicy::MergeSmallest => merge_smallest(groups, self.max_groups),
            GroupMergePolicy::FoldTail => fold_tail(groups, self.max_groups),
        };
        debug!(parsed, planned = groups.len(), "Planned question groups");
        groups
    }
}

/// Split at the section heading level: the shallowest level used more than
/// once, or the only heading there is. Text before the first section is
/// brief preamble and is not a topic.
fn split_sections(brief: &str) -> Vec<String> {
    let levels: Vec<usize> = brief
        .lines()
        .filter_map(|line| HEADING.captures(line).map(|c| c[1].len()))
        .collect();
    let Some(&shallowest) = levels.iter().min() else {
        return Vec::new();
    };
    let section_level = (1..=6)
        .find(|level| levels.iter().filter(|l| *l == level).count() > 1)
        .unwrap_or(shallowest);

    let mut groups = Vec::new();
    let mut current: Option<Vec<&str>> = None;
    for line in brief.lines() {
        let is_section = HEADING
            .captures(line)
            .is_some_and(|c| c[1].len() == section_level);
        if is_section {
            if let Some(lines) = current.take() {
                push_group(&mut groups, &lines);
            }
            current = Some(vec![line]);
        } else if let Some(lines) = current.as_mut() {
            lines.push(line);
        }
    }
    if let Some(lines) = current {
        push_group(&mut groups, &lines);
    }
    groups
}

/// One group per top-level list item, with its indented continuation.
fn split_list_items(brief: &str) -> Vec<String> {
    let mut groups = Vec::new();
    let mut current: Option<Vec<&str>> = None;
    for line in brief.lines() {
        if LIST_ITEM.is_match(line) {
            if let Some(lines) = current.take() {
                push_group(&mut groups, &lines);
            }
            current = Some(vec![line]);
        } else if let Some(lines) = current.as_mut() {
            if line.starts_with(char::is_whitespace) && !line.trim().is_empty() {
                lines.push(line);
            } else if !line.trim().is_empty() {
                push_group(&mut groups, lines);
                current = None;
            }
        }
    }
    if let Some(lines) = current {
        push_group(&mut groups, &lines);
    }
    groups
}

fn push_group(groups: &mut Vec<String>, lines: &[&str]) {
    let text = lines.join("\n").trim().to_string();
    if !text.is_empty() {
        groups.push(text);
    }
}

/// Merge the adjacent pair with the smallest combined length (earliest pair
/// on ties) until at most `max` groups remain.
pub fn merge_smallest(mut groups: Vec<String>, max: usize) -> Vec<String> {
    while groups.len() > max.max(1) {
        let Some(i) = (0..groups.len() - 1).min_by_key(|&i| groups[i].len() + groups[i + 1].len())
        else {
            break;
        };
        let next = groups.remove(i + 1);
        groups[i] = format!("{}\n\n{}", groups[i], next);
    }
    groups
}

/// Fold every group past the cap into the last kept group.
pub fn fold_tail(mut groups: Vec<String>, max: usize) -> Vec<String> {
    let max = max.max(1);
    if groups.len() <= max {
        return groups;
    }
    let overflow = groups.split_off(max);
    if let Some(last) = groups.last_mut() {
        for group in overflow {
            last.push_str("\n\n");
            last.push_str(&group);
        }
    }
    groups
}
