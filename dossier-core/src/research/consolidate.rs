//! Source consolidation: merges the per-finding citation lists into one
//! run-wide source list and rewrites every citation to match it.
//!
//! Each finding carries local `[n]` markers that point into its own trailing
//! `### Sources` block. Consolidation walks the findings in order, assigns a
//! global id to every distinct URL the first time it is seen, rewrites each
//! finding's markers to the global ids, and renders the context the report
//! synthesizer works from. The whole process is a pure function of its
//! inputs: the same findings in the same order always number the same way.

use super::types::ConsolidatedSource;
use crate::config::SourcePrunePolicy;
use crate::types::SubjectType;
use regex::{Captures, Regex};
use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;
use tracing::{debug, info};

const SOURCES_HEADING: &str = "### Sources";

pub(crate) static CITATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[(\d+(?:\s*,\s*\d+)*)\]").expect("citation pattern is valid"));

static MARKER_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+").expect("marker number pattern is valid"));

static SOURCE_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:[-*]\s*)?(?:\[(\d+)\]|(\d+)[.)])\s*:?\s*(.+?)\s*$")
        .expect("source line pattern is valid")
});

static MARKDOWN_LINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\[([^\]]*)\]\(([^)\s]+)\)(.*)$").expect("markdown link pattern is valid")
});

/// One entry of a finding's own `### Sources` block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalSource {
    pub number: usize,
    pub url: String,
    pub description: Option<String>,
}

/// A finding split into its body text and its local source list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedNote<'a> {
    pub body: &'a str,
    pub sources: Vec<LocalSource>,
}

/// Split a finding at its last `### Sources` heading and parse the entries
/// below it in the order they appear.
///
/// A finding without the heading is all body and has no sources.
pub fn parse_note(note: &str) -> ParsedNote<'_> {
    let Some(idx) = note.rfind(SOURCES_HEADING) else {
        return ParsedNote {
            body: note,
            sources: Vec::new(),
        };
    };

    let body = note[..idx].trim_end();
    let block = &note[idx + SOURCES_HEADING.len()..];
    let sources = block.lines().filter_map(parse_source_line).collect();
    ParsedNote { body, sources }
}

fn parse_source_line(line: &str) -> Option<LocalSource> {
    let caps = SOURCE_LINE.captures(line)?;
    let number = caps
        .get(1)
        .or_else(|| caps.get(2))?
        .as_str()
        .parse::<usize>()
        .ok()?;
    let rest = caps.get(3)?.as_str().trim();

    if let Some(link) = MARKDOWN_LINK.captures(rest) {
        let title = link.get(1).map(|m| m.as_str().trim()).unwrap_or_default();
        let url = link.get(2)?.as_str().to_string();
        let trailing = link.get(3).map(|m| clean_description(m.as_str())).unwrap_or_default();
        let description = if !title.is_empty() && title != url {
            Some(title.to_string())
        } else if !trailing.is_empty() {
            Some(trailing)
        } else {
            None
        };
        return Some(LocalSource {
            number,
            url,
            description,
        });
    }

    let bracketed = rest
        .strip_prefix('<')
        .and_then(|inner| inner.split_once('>'));
    let (url, remainder) = match bracketed {
        Some((url, remainder)) => (url, remainder),
        None => rest.split_once(char::is_whitespace).unwrap_or((rest, "")),
    };
    let url = url.trim().to_string();
    if url.is_empty() {
        return None;
    }
    let description = clean_description(remainder);
    Some(LocalSource {
        number,
        url,
        description: (!description.is_empty()).then_some(description),
    })
}

fn clean_description(text: &str) -> String {
    text.trim()
        .trim_start_matches(['-', '–', '—', ':', '|'])
        .trim()
        .to_string()
}

/// The consolidated research context handed to the report synthesizer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsolidatedContext {
    /// Run-wide sources in ascending id order.
    pub sources: Vec<ConsolidatedSource>,
    /// Each finding's body with citations rewritten to global ids.
    pub findings: Vec<String>,
    /// Sources dropped by pruning.
    pub pruned: usize,
    /// The rendered context text.
    pub text: String,
}

impl ConsolidatedContext {
    /// The `## Sources` section a report built on this context must carry.
    pub fn sources_section(&self) -> String {
        let mut section = String::from("## Sources\n\n");
        for source in &self.sources {
            match &source.description {
                Some(description) => {
                    section.push_str(&format!("[{}] {} - {}\n", source.id, source.url, description))
                }
                None => section.push_str(&format!("[{}] {}\n", source.id, source.url)),
            }
        }
        section
    }
}

/// Builds the run-wide source list and rewrites findings to use it.
#[derive(Debug, Clone)]
pub struct SourceConsolidator {
    max_sources: usize,
    prune_policy: SourcePrunePolicy,
}

impl SourceConsolidator {
    pub fn new(max_sources: usize, prune_policy: SourcePrunePolicy) -> Self {
        Self {
            max_sources: max_sources.max(1),
            prune_policy,
        }
    }

    /// Consolidate `notes` (in the order research tasks completed).
    pub fn consolidate(
        &self,
        research_brief: &str,
        notes: &[String],
        subject_type: SubjectType,
    ) -> ConsolidatedContext {
        let parsed: Vec<ParsedNote<'_>> = notes.iter().map(|n| parse_note(n)).collect();

        // Global ids in first-seen order; the first description wins.
        let mut sources: Vec<ConsolidatedSource> = Vec::new();
        let mut by_url: HashMap<&str, usize> = HashMap::new();
        let mut local_maps: Vec<HashMap<usize, usize>> = Vec::with_capacity(parsed.len());

        for note in &parsed {
            let mut local_map = HashMap::new();
            for local in &note.sources {
                if local_map.contains_key(&local.number) {
                    continue;
                }
                let global_id = match by_url.get(local.url.as_str()) {
                    Some(&id) => id,
                    None => {
                        let id = sources.len() + 1;
                        sources.push(ConsolidatedSource {
                            id,
                            url: local.url.clone(),
                            description: local.description.clone(),
                        });
                        by_url.insert(local.url.as_str(), id);
                        id
                    }
                };
                local_map.insert(local.number, global_id);
            }
            local_maps.push(local_map);
        }

        let (sources, final_ids, pruned) = if sources.len() > self.max_sources {
            self.prune(sources, &parsed, &local_maps)
        } else {
            let identity = sources.iter().map(|s| (s.id, Some(s.id))).collect();
            (sources, identity, 0)
        };

        let findings: Vec<String> = parsed
            .iter()
            .zip(&local_maps)
            .map(|(note, local_map)| rewrite_citations(note.body, local_map, &final_ids))
            .collect();

        debug!(
            notes = notes.len(),
            sources = sources.len(),
            pruned,
            "Consolidated research sources"
        );

        let text = render_context(research_brief, subject_type, &findings, &sources);
        ConsolidatedContext {
            sources,
            findings,
            pruned,
            text,
        }
    }

    /// Keep `max_sources` sources per policy and renumber them densely,
    /// preserving their relative order.
    fn prune(
        &self,
        sources: Vec<ConsolidatedSource>,
        parsed: &[ParsedNote<'_>],
        local_maps: &[HashMap<usize, usize>],
    ) -> (Vec<ConsolidatedSource>, HashMap<usize, Option<usize>>, usize) {
        let keep: HashSet<usize> = match self.prune_policy {
            SourcePrunePolicy::FirstSeen => {
                sources.iter().take(self.max_sources).map(|s| s.id).collect()
            }
            SourcePrunePolicy::MostCited => {
                let counts = citation_counts(parsed, local_maps);
                let mut ranked: Vec<usize> = sources.iter().map(|s| s.id).collect();
                ranked.sort_by(|a, b| {
                    let ca = counts.get(a).copied().unwrap_or(0);
                    let cb = counts.get(b).copied().unwrap_or(0);
                    cb.cmp(&ca).then(a.cmp(b))
                });
                ranked.into_iter().take(self.max_sources).collect()
            }
        };

        let total = sources.len();
        let mut final_ids = HashMap::with_capacity(total);
        let mut kept = Vec::with_capacity(keep.len());
        for source in sources {
            if keep.contains(&source.id) {
                let new_id = kept.len() + 1;
                final_ids.insert(source.id, Some(new_id));
                kept.push(ConsolidatedSource {
                    id: new_id,
                    ..source
                });
            } else {
                final_ids.insert(source.id, None);
            }
        }

        let pruned = total - kept.len();
        info!(
            kept = kept.len(),
            pruned,
            policy = ?self.prune_policy,
            "Pruned consolidated sources"
        );
        (kept, final_ids, pruned)
    }
}

/// How many in-body citation markers point at each global id.
fn citation_counts(
    parsed: &[ParsedNote<'_>],
    local_maps: &[HashMap<usize, usize>],
) -> HashMap<usize, usize> {
    let mut counts = HashMap::new();
    for (note, local_map) in parsed.iter().zip(local_maps) {
        for caps in CITATION.captures_iter(note.body) {
            for number in caps[1].split(',').filter_map(|n| n.trim().parse::<usize>().ok()) {
                if let Some(global) = local_map.get(&number) {
                    *counts.entry(*global).or_insert(0) += 1;
                }
            }
        }
    }
    counts
}

/// What happens to one number inside a citation marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Citation {
    /// Leave the number as written.
    Keep,
    Renumber(usize),
    Drop,
}

/// Rewrite the numbers of one `[n]` / `[n, m]` marker, keeping the
/// separators exactly as written.
///
/// Returns `None` when nothing changes, so the caller can keep the marker
/// byte for byte, and `Some("")` when every number is dropped.
pub(crate) fn rewrite_marker(marker: &str, resolve: impl Fn(usize) -> Citation) -> Option<String> {
    let inner = &marker[1..marker.len() - 1];
    let mut out = String::new();
    let mut changed = false;
    let mut prev_end = 0;
    for m in MARKER_NUMBER.find_iter(inner) {
        let separator = &inner[prev_end..m.start()];
        prev_end = m.end();
        let text = match m.as_str().parse::<usize>().map(&resolve) {
            Ok(Citation::Renumber(n)) => {
                let n = n.to_string();
                changed |= n != m.as_str();
                n
            }
            Ok(Citation::Drop) => {
                changed = true;
                continue;
            }
            Ok(Citation::Keep) | Err(_) => m.as_str().to_string(),
        };
        if !out.is_empty() {
            out.push_str(separator);
        }
        out.push_str(&text);
    }
    if !changed {
        None
    } else if out.is_empty() {
        Some(String::new())
    } else {
        Some(format!("[{out}]"))
    }
}

/// `[n]` written so that no citation pass reads it as a marker.
pub(crate) fn escape_marker(marker: &str) -> String {
    format!("\\[{}\\]", &marker[1..marker.len() - 1])
}

/// Escape every citation-like marker in text whose bracketed numbers are
/// not references, such as footnotes in a scraped page.
pub fn escape_citations(text: &str) -> String {
    CITATION
        .replace_all(text, |caps: &Captures<'_>| escape_marker(&caps[0]))
        .into_owned()
}

/// Rewrite every `[n]` / `[n, m]` marker in `body`.
///
/// Numbers with a local source map to their final global id. Numbers whose
/// source was pruned are dropped, and a marker left empty disappears along
/// with the space before it. Numbers with no local source are left as
/// written, and a marker that does not change keeps its original text.
fn rewrite_citations(
    body: &str,
    local_map: &HashMap<usize, usize>,
    final_ids: &HashMap<usize, Option<usize>>,
) -> String {
    let mut out = String::with_capacity(body.len());
    let mut last = 0;
    for m in CITATION.find_iter(body) {
        out.push_str(&body[last..m.start()]);
        last = m.end();
        let rewritten = rewrite_marker(m.as_str(), |number| match local_map.get(&number) {
            Some(global) => match final_ids.get(global) {
                Some(Some(id)) => Citation::Renumber(*id),
                _ => Citation::Drop,
            },
            None => Citation::Keep,
        });
        match rewritten {
            None => out.push_str(m.as_str()),
            Some(marker) if marker.is_empty() => {
                let rest = &body[last..];
                if rest.is_empty() || rest.starts_with(|c: char| c.is_whitespace() || ".,;:!?)".contains(c)) {
                    let kept = out.trim_end_matches([' ', '\t']).len();
                    out.truncate(kept);
                }
            }
            Some(marker) => out.push_str(&marker),
        }
    }
    out.push_str(&body[last..]);
    out
}

fn render_context(
    research_brief: &str,
    subject_type: SubjectType,
    findings: &[String],
    sources: &[ConsolidatedSource],
) -> String {
    let mut out = String::from("# Profile Research Context\n\n");
    out.push_str(&format!("**Subject Type:** {subject_type}\n\n"));
    if !research_brief.trim().is_empty() {
        out.push_str("**Research Brief:**\n");
        out.push_str(research_brief.trim());
        out.push_str("\n\n");
    }
    out.push_str(&format!(
        "**Research Findings** ({} sections):\n\n",
        findings.len()
    ));
    for (i, finding) in findings.iter().enumerate() {
        out.push_str(&format!("## Findings Section {}\n\n", i + 1));
        out.push_str(finding);
        out.push_str("\n\n");
    }

    if sources.is_empty() {
        return out;
    }

    let count = sources.len();
    out.push_str("---\n\n## CONSOLIDATED SOURCE LIST\n\n");
    out.push_str(&format!("Total sources available: {count}\n\n"));
    for source in sources {
        out.push_str(&source.to_string());
        out.push('\n');
    }
    out.push_str(&format!(
        "\nIMPORTANT: The findings above already use these exact citation numbers. \
         Cite evidence with these numbers only and do not renumber them. \
         Your `## Sources` section must list all {count} sources, numbered [1] through [{count}].\n"
    ));
    out
}

/// Consolidate `notes` into the rendered context text.
pub fn consolidate(
    research_brief: &str,
    notes: &[String],
    subject_type: SubjectType,
    max_sources: usize,
) -> String {
    SourceConsolidator::new(max_sources, SourcePrunePolicy::default())
        .consolidate(research_brief, notes, subject_type)
        .text
}
