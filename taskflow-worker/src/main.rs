//! taskflow worker and operator CLI

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{
    ConfigCommand, EnqueueCommand, InspectCommand, PendingCommand, RunCommand,
};
use std::path::PathBuf;
use taskflow::job::DEFAULT_MAX_ATTEMPTS;
use taskflow_worker::config::TaskflowConfig;

#[derive(Parser)]
#[command(name = "taskflow")]
#[command(version)]
#[command(about = "Redis-backed job worker and queue CLI", long_about = None)]
struct Cli {
    /// Config file to use instead of ./config.toml
    #[arg(short, long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the worker pool until SIGINT or SIGTERM
    Run {
        /// Loops per job type (overrides worker.concurrency)
        #[arg(short = 'n', long)]
        concurrency: Option<usize>,
    },
    /// Submit a job
    Enqueue {
        /// Job type (email, webhook, notification, cleanup, ...)
        #[arg(short = 't', long = "type")]
        job_type: String,
        /// Payload as JSON
        #[arg(short, long, default_value = "{}")]
        payload: String,
        /// Priority, higher runs first
        #[arg(long, default_value_t = 5, allow_negative_numbers = true)]
        priority: i32,
        /// Total attempts before the job is marked failed
        #[arg(long, default_value_t = DEFAULT_MAX_ATTEMPTS)]
        max_attempts: u32,
    },
    /// Print a job record as JSON
    Inspect {
        /// Job ID
        id: String,
    },
    /// Show how many jobs of a type are waiting
    Pending {
        /// Job type
        #[arg(short = 't', long = "type")]
        job_type: String,
    },
    /// Show the effective configuration
    Config {
        /// Write a default config to the user config directory
        #[arg(long)]
        init: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = TaskflowConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Run { concurrency } => {
            RunCommand { concurrency }.execute(config).await?;
        }
        Commands::Enqueue {
            job_type,
            payload,
            priority,
            max_attempts,
        } => {
            let cmd = EnqueueCommand {
                job_type,
                payload,
                priority,
                max_attempts,
            };
            cmd.execute(&config).await?;
        }
        Commands::Inspect { id } => {
            InspectCommand { id }.execute(&config).await?;
        }
        Commands::Pending { job_type } => {
            PendingCommand { job_type }.execute(&config).await?;
        }
        Commands::Config { init } => {
            ConfigCommand { init }.execute(&config)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_enqueue_defaults() {
        let cli = Cli::parse_from(["taskflow", "enqueue", "--type", "email"]);
        let Commands::Enqueue {
            job_type,
            payload,
            priority,
            max_attempts,
        } = cli.command
        else {
            panic!("expected enqueue");
        };
        assert_eq!(job_type, "email");
        assert_eq!(payload, "{}");
        assert_eq!(priority, 5);
        assert_eq!(max_attempts, DEFAULT_MAX_ATTEMPTS);
    }

    #[test]
    fn test_global_config_flag_after_subcommand() {
        let cli = Cli::parse_from(["taskflow", "run", "-n", "4", "--config", "/tmp/taskflow.toml"]);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/taskflow.toml")));
        assert!(matches!(cli.command, Commands::Run { concurrency: Some(4) }));
    }
}
