//! `taskflow config`: show or initialize configuration

use anyhow::{Context, Result};
use console::style;
use taskflow_worker::config::TaskflowConfig;

use super::{INFO, SUCCESS};

/// Print the effective configuration, or write a default user config.
#[derive(Debug)]
pub struct ConfigCommand {
    /// Write defaults to the user config path instead of printing.
    pub init: bool,
}

impl ConfigCommand {
    /// Execute the config command
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be rendered or the user
    /// config cannot be written.
    pub fn execute(&self, config: &TaskflowConfig) -> Result<()> {
        if !self.init {
            print!("{}", config.to_toml()?);
            return Ok(());
        }

        let path = TaskflowConfig::create_config_dir()?;
        if path.exists() {
            println!(
                "{} {} already exists, leaving it unchanged",
                INFO,
                style(path.display()).cyan()
            );
            return Ok(());
        }

        std::fs::write(&path, TaskflowConfig::default().to_toml()?)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        println!("{} Wrote {}", SUCCESS, style(path.display()).cyan());
        Ok(())
    }
}
