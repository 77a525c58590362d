//! One research run from the command line.

use dossier_core::research::{PipelineObserver, RunStage};
use dossier_core::{
    Brain, DossierConfig, ReportStatus, ResearchPipeline, RunOutcome, RunRequest, SubjectType,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

pub struct RunOptions {
    pub query: String,
    pub subject: SubjectType,
    pub focus: Option<String>,
    pub output: Option<PathBuf>,
    pub json: bool,
    pub quiet: bool,
}

/// Prints stage progress to stderr so stdout carries only the result.
#[derive(Default)]
struct ProgressObserver {
    tasks_done: AtomicUsize,
}

impl PipelineObserver for ProgressObserver {
    fn on_stage(&self, stage: RunStage) {
        if !stage.is_terminal() {
            eprintln!("\x1b[36m==>\x1b[0m {}", stage.label());
        }
    }

    fn on_task_complete(&self, question_group: &str, failed: bool) {
        let n = self.tasks_done.fetch_add(1, Ordering::Relaxed) + 1;
        let title = question_group.lines().next().unwrap_or_default();
        if failed {
            eprintln!("  \x1b[31m[{n}] failed:\x1b[0m {title}");
        } else {
            eprintln!("  \x1b[32m[{n}] done:\x1b[0m {title}");
        }
    }

    fn on_revision(&self, revision: usize, max_revisions: usize, feedback: &str) {
        let summary: String = feedback.chars().take(120).collect();
        eprintln!("  \x1b[33mrevision {revision}/{max_revisions}:\x1b[0m {summary}");
    }
}

/// Exit status for an outcome: 0 report, 2 clarification, 1 failure.
pub fn exit_code(outcome: &RunOutcome) -> u8 {
    match outcome {
        RunOutcome::Report { .. } => 0,
        RunOutcome::Clarification { .. } => 2,
        RunOutcome::Failed { .. } => 1,
    }
}

/// Build the pipeline from config, run it once, and print the outcome.
pub async fn run_research(options: RunOptions, config: DossierConfig) -> anyhow::Result<u8> {
    let provider = dossier_core::providers::create_provider(&config.llm)?;
    let brain = Brain::new(provider)
        .with_max_retries(config.research.llm_max_retries)
        .with_temperature(config.llm.temperature)
        .with_max_tokens(Some(config.llm.max_tokens));

    let tools = dossier_tools::build_registry(&config.tools);
    tracing::info!(tools = ?tools.list_names(), "Research tools ready");

    let mut pipeline = ResearchPipeline::new(brain, tools, config.research.clone())
        .with_resolver(dossier_tools::build_resolver(&config.tools));
    if !options.quiet && !options.json {
        pipeline = pipeline.with_observer(Arc::new(ProgressObserver::default()));
    }

    let mut request = RunRequest::new(&options.query, options.subject);
    if let Some(focus) = options.focus {
        request = request.with_focus_area(focus);
    }

    let (outcome, summary) = pipeline.run_with_summary(request).await;
    let code = exit_code(&outcome);

    if options.json {
        let rendered = serde_json::to_string_pretty(&serde_json::json!({
            "outcome": outcome,
            "summary": summary,
        }))?;
        emit(&rendered, options.output.as_ref())?;
        return Ok(code);
    }

    match &outcome {
        RunOutcome::Report { report } => {
            emit(&report.content, options.output.as_ref())?;
            if !options.quiet {
                if report.status == ReportStatus::Exhausted {
                    eprintln!(
                        "\x1b[33mNote:\x1b[0m report was not accepted by review ({} revision(s))",
                        report.revision_count
                    );
                }
                eprintln!(
                    "\x1b[90m{} sources, {} tokens, {:.1}s\x1b[0m",
                    report.sources.len(),
                    summary.usage.total(),
                    summary.elapsed_ms as f64 / 1000.0
                );
            }
        }
        RunOutcome::Clarification { question } => println!("{question}"),
        RunOutcome::Failed { message } => eprintln!("Error: {message}"),
    }
    Ok(code)
}

fn emit(text: &str, output: Option<&PathBuf>) -> anyhow::Result<()> {
    match output {
        Some(path) => {
            std::fs::write(path, text)?;
            eprintln!("Wrote {}", path.display());
        }
        None => println!("{text}"),
    }
    Ok(())
}
