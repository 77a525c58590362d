//! Dossier CLI: research a company, person, or project from the terminal.
//!
//! Runs one research pipeline per invocation and prints the report.

mod commands;
mod run;

use clap::Parser;
use dossier_core::SubjectType;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Dossier: cited profile reports from a one-line query
#[derive(Parser, Debug)]
#[command(name = "dossier", version, about, long_about = None)]
struct Cli {
    /// What to research, e.g. "Acme Corp" or "www.acme.com"
    query: Option<String>,

    /// Kind of subject: company, person, or project
    #[arg(short, long, default_value = "company")]
    subject: SubjectType,

    /// Aspect of the subject the report should emphasize
    #[arg(long)]
    focus: Option<String>,

    /// Skip the clarification gate
    #[arg(long)]
    no_clarify: bool,

    /// Maximum supervisor rounds
    #[arg(long)]
    max_iterations: Option<usize>,

    /// Maximum sources kept in the report
    #[arg(long)]
    max_sources: Option<usize>,

    /// Write the report to this file instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Print the outcome and run summary as JSON
    #[arg(long)]
    json: bool,

    /// Workspace directory (holds `.dossier/config.toml`)
    #[arg(short, long, default_value = ".")]
    workspace: PathBuf,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress progress output
    #[arg(short, long)]
    quiet: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(clap::Subcommand, Debug)]
enum ConfigAction {
    /// Create default configuration file
    Init,
    /// Show current configuration
    Show,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "warn",
        1 => "info",
        _ => "debug",
    };

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::new(filter));

    let log_dir = directories::ProjectDirs::from("dev", "dossier", "dossier")
        .map(|d| d.data_dir().join("logs"))
        .unwrap_or_else(|| PathBuf::from("."));
    let _ = std::fs::create_dir_all(&log_dir);
    let file_appender = tracing_appender::rolling::daily(&log_dir, "dossier.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let json_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(non_blocking)
        .with_filter(EnvFilter::new("debug"));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let workspace = cli
        .workspace
        .canonicalize()
        .unwrap_or_else(|_| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

    if let Some(command) = cli.command {
        commands::handle_command(command, &workspace)?;
        return Ok(ExitCode::SUCCESS);
    }

    let Some(query) = cli.query.as_deref().map(str::trim).filter(|q| !q.is_empty()) else {
        anyhow::bail!("a research query is required (see `dossier --help`)");
    };

    let mut config = dossier_core::config::load_config(Some(&workspace), None)
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;
    if cli.no_clarify {
        config.research.clarification_enabled = false;
    }
    if let Some(n) = cli.max_iterations {
        config.research.max_researcher_iterations = n;
    }
    if let Some(n) = cli.max_sources {
        config.research.max_sources = n;
    }
    config.research.validate()?;

    let options = run::RunOptions {
        query: query.to_string(),
        subject: cli.subject,
        focus: cli.focus,
        output: cli.output,
        json: cli.json,
        quiet: cli.quiet,
    };
    let code = run::run_research(options, config).await?;
    Ok(ExitCode::from(code))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_research_args() {
        let cli = Cli::try_parse_from([
            "dossier",
            "Acme Corp",
            "--subject",
            "person",
            "--focus",
            "leadership",
            "--no-clarify",
            "--max-iterations",
            "2",
            "-vv",
        ])
        .unwrap();
        assert_eq!(cli.query.as_deref(), Some("Acme Corp"));
        assert_eq!(cli.subject, SubjectType::Person);
        assert_eq!(cli.focus.as_deref(), Some("leadership"));
        assert!(cli.no_clarify);
        assert_eq!(cli.max_iterations, Some(2));
        assert_eq!(cli.verbose, 2);
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_parse_rejects_unknown_subject() {
        assert!(Cli::try_parse_from(["dossier", "x", "--subject", "planet"]).is_err());
    }

    #[test]
    fn test_parse_config_subcommand() {
        let cli = Cli::try_parse_from(["dossier", "config", "show"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Commands::Config {
                action: ConfigAction::Show
            })
        ));
    }
}
