//! CLI subcommand handlers.

use crate::Commands;
use crate::ConfigAction;
use dossier_core::config::{load_config, workspace_config_path, write_default_config};
use std::path::Path;

/// Handle a CLI subcommand.
pub fn handle_command(command: Commands, workspace: &Path) -> anyhow::Result<()> {
    match command {
        Commands::Config { action } => handle_config(action, workspace),
    }
}

fn handle_config(action: ConfigAction, workspace: &Path) -> anyhow::Result<()> {
    match action {
        ConfigAction::Init => {
            let config_path = workspace_config_path(workspace);
            if config_path.exists() {
                println!(
                    "Configuration file already exists at: {}",
                    config_path.display()
                );
                return Ok(());
            }
            let path = write_default_config(workspace)?;
            println!("Created default configuration at: {}", path.display());
            Ok(())
        }
        ConfigAction::Show => {
            println!("{}", render_config(workspace)?);
            Ok(())
        }
    }
}

/// The effective layered configuration as TOML.
fn render_config(workspace: &Path) -> anyhow::Result<String> {
    let config = load_config(Some(workspace), None)
        .map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;
    Ok(toml::to_string_pretty(&config)?)
}
