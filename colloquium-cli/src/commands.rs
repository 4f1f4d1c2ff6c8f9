//! CLI subcommand handlers.

use crate::Commands;
use crate::ConfigAction;
use std::path::Path;

/// Handle a CLI subcommand.
pub async fn handle_command(command: Commands, workspace: &Path) -> anyhow::Result<()> {
    match command {
        Commands::Config { action } => handle_config(action, workspace).await,
    }
}

async fn handle_config(action: ConfigAction, workspace: &Path) -> anyhow::Result<()> {
    match action {
        ConfigAction::Init => {
            let config_dir = workspace.join(".colloquium");
            std::fs::create_dir_all(&config_dir)?;

            let config_path = config_dir.join("config.toml");
            if config_path.exists() {
                println!(
                    "Configuration file already exists at: {}",
                    config_path.display()
                );
                return Ok(());
            }

            let default_config = colloquium_core::Config::default();
            let toml_str = toml::to_string_pretty(&default_config)?;
            std::fs::write(&config_path, &toml_str)?;
            println!(
                "Created default configuration at: {}",
                config_path.display()
            );
            Ok(())
        }
        ConfigAction::Show => {
            let config = colloquium_core::config::load_config(Some(workspace), None)
                .map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;
            let toml_str = toml::to_string_pretty(&config)?;
            println!("{}", toml_str);
            Ok(())
        }
        ConfigAction::Path => {
            match colloquium_core::config::user_config_path() {
                Some(path) => {
                    let status = if path.exists() { "present" } else { "absent" };
                    println!("user:      {} ({})", path.display(), status);
                }
                None => println!("user:      unavailable (no home directory)"),
            }
            let ws_path = workspace.join(".colloquium").join("config.toml");
            let status = if ws_path.exists() { "present" } else { "absent" };
            println!("workspace: {} ({})", ws_path.display(), status);
            Ok(())
        }
    }
}
