//! CLI command implementations

mod config;
mod enqueue;
mod inspect;
mod run;

pub use config::ConfigCommand;
pub use enqueue::EnqueueCommand;
pub use inspect::{InspectCommand, PendingCommand};
pub use run::RunCommand;

use anyhow::{Context, Result};
use console::Emoji;
use std::sync::Arc;
use taskflow::queue::Queue;
use taskflow::store::RedisStore;
use taskflow_worker::config::TaskflowConfig;

pub static SUCCESS: Emoji = Emoji("✓", "√");
pub static INFO: Emoji = Emoji("ℹ", "i");

/// Connect to the configured Redis and build the queue over it.
async fn connect(config: &TaskflowConfig) -> Result<Queue> {
    let store = RedisStore::connect(&config.redis.addr)
        .await
        .with_context(|| format!("Failed to connect to Redis at {}", config.redis.addr))?;
    Ok(Queue::with_config(
        Arc::new(store),
        config.redis.queue_config(),
    ))
}
