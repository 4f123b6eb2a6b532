//! Worker configuration.
//!
//! Sources are merged lowest to highest:
//!
//! 1. Hardcoded defaults
//! 2. `/etc/taskflow/config.toml` (system config)
//! 3. `~/.config/taskflow/config.toml` (user config, XDG)
//! 4. `./config.toml`, or the file passed with `--config`
//! 5. Flat deployment variables: `REDIS_ADDR`, `WORKER_CONCURRENCY`,
//!    `SMTP_HOST`, `SMTP_PORT`, `SMTP_USER`, `SMTP_PASSWORD`, `SLACK_TOKEN`,
//!    `DISCORD_TOKEN`
//! 6. `TASKFLOW_` variables, `__` separating sections
//!    (`TASKFLOW_WORKER__CONCURRENCY=20`)
//!
//! # Example Configuration
//!
//! ```toml
//! [redis]
//! addr = "redis.internal:6379"
//! prefix = "billing:jobs"
//!
//! [worker]
//! concurrency = 4
//! poll_interval_ms = 250
//!
//! [smtp]
//! host = "smtp.example.com"
//! username = "mailer"
//! password = "secret"
//! from = "jobs@example.com"
//!
//! [log]
//! format = "json"
//! ```

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Deserializer, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use taskflow::observability::LogFormat;
use taskflow::queue::{QueueConfig, DEFAULT_PREFIX};
use taskflow::worker::{WorkerConfig, DEFAULT_CONCURRENCY};

/// How a deployment variable's raw value is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Legacy {
    Text,
    Number,
}

/// Deployment variables and the config keys they set.
const LEGACY_ENV: &[(&str, &str, Legacy)] = &[
    ("REDIS_ADDR", "redis.addr", Legacy::Text),
    ("WORKER_CONCURRENCY", "worker.concurrency", Legacy::Number),
    ("SMTP_HOST", "smtp.host", Legacy::Text),
    ("SMTP_PORT", "smtp.port", Legacy::Number),
    ("SMTP_USER", "smtp.username", Legacy::Text),
    ("SMTP_PASSWORD", "smtp.password", Legacy::Text),
    ("SLACK_TOKEN", "notifications.slack_token", Legacy::Text),
    ("DISCORD_TOKEN", "notifications.discord_token", Legacy::Text),
];

/// Complete worker configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskflowConfig {
    /// Redis connection and key layout.
    pub redis: RedisSettings,
    /// Worker pool sizing.
    pub worker: WorkerSettings,
    /// Outbound mail for the `email` handler.
    pub smtp: SmtpSettings,
    /// Channel credentials for the `notification` handler.
    pub notifications: NotificationSettings,
    /// Log output.
    pub log: LogSettings,
}

/// Redis settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisSettings {
    /// `host:port` or a full `redis://` URL.
    pub addr: String,
    /// Namespace for every queue key.
    pub prefix: String,
    /// Job record expiry in seconds.
    pub record_ttl_secs: u64,
}

impl Default for RedisSettings {
    fn default() -> Self {
        Self {
            addr: "localhost:6379".to_string(),
            prefix: DEFAULT_PREFIX.to_string(),
            record_ttl_secs: 86_400,
        }
    }
}

impl RedisSettings {
    /// Queue key layout and expiry.
    #[must_use]
    pub fn queue_config(&self) -> QueueConfig {
        QueueConfig {
            prefix: self.prefix.clone(),
            record_ttl: Duration::from_secs(self.record_ttl_secs.max(1)),
        }
    }
}

/// Worker pool settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerSettings {
    /// Loops per registered job type.
    pub concurrency: usize,
    /// Idle poll interval in milliseconds.
    pub poll_interval_ms: u64,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            poll_interval_ms: 100,
        }
    }
}

impl WorkerSettings {
    /// Pool settings for [`taskflow::worker::WorkerPool::new`].
    #[must_use]
    pub const fn worker_config(&self) -> WorkerConfig {
        WorkerConfig {
            concurrency: DEFAULT_CONCURRENCY,
            poll_interval: Duration::from_millis(self.poll_interval_ms),
        }
        .with_concurrency(self.concurrency)
    }
}

/// SMTP settings. Without a host, email jobs are logged instead of sent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmtpSettings {
    /// Server hostname.
    #[serde(
        skip_serializing_if = "Option::is_none",
        deserialize_with = "optional_text"
    )]
    pub host: Option<String>,
    /// Server port (587 for STARTTLS).
    pub port: u16,
    /// Login user.
    #[serde(
        skip_serializing_if = "Option::is_none",
        deserialize_with = "optional_text"
    )]
    pub username: Option<String>,
    /// Login password.
    #[serde(
        skip_serializing_if = "Option::is_none",
        deserialize_with = "optional_text"
    )]
    pub password: Option<String>,
    /// Sender address.
    pub from: String,
}

impl Default for SmtpSettings {
    fn default() -> Self {
        Self {
            host: None,
            port: 587,
            username: None,
            password: None,
            from: "taskflow@localhost".to_string(),
        }
    }
}

/// Notification channel credentials.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationSettings {
    /// Slack bot token.
    #[serde(
        skip_serializing_if = "Option::is_none",
        deserialize_with = "optional_text"
    )]
    pub slack_token: Option<String>,
    /// Discord bot token.
    #[serde(
        skip_serializing_if = "Option::is_none",
        deserialize_with = "optional_text"
    )]
    pub discord_token: Option<String>,
}

/// Log settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    /// `auto`, `pretty` or `json`.
    pub format: LogFormat,
}

impl TaskflowConfig {
    /// Load configuration from every source.
    ///
    /// `explicit` replaces `./config.toml` and must exist.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Default configuration cannot be serialized to TOML
    /// - The explicit file does not exist
    /// - A config file contains invalid TOML
    /// - A value has the wrong type
    pub fn load(explicit: Option<&Path>) -> anyhow::Result<Self> {
        let mut files = Vec::new();

        let system_config = PathBuf::from("/etc/taskflow/config.toml");
        if system_config.exists() {
            files.push(system_config);
        }

        let user_config = Self::recommended_path();
        if user_config.exists() {
            files.push(user_config);
        }

        match explicit {
            Some(path) => {
                anyhow::ensure!(
                    path.exists(),
                    "config file {} does not exist",
                    path.display()
                );
                files.push(path.to_path_buf());
            }
            None => {
                let local_config = PathBuf::from("./config.toml");
                if local_config.exists() {
                    files.push(local_config);
                }
            }
        }

        Ok(with_env(file_layers(&files)?).extract()?)
    }

    /// Load defaults, one file if it exists, then the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the file contains invalid TOML or a value has the
    /// wrong type.
    pub fn load_from(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let figment = file_layers(&[path.as_ref().to_path_buf()])?;
        Ok(with_env(figment).extract()?)
    }

    /// User config path: `~/.config/taskflow/config.toml`.
    #[must_use]
    pub fn recommended_path() -> PathBuf {
        dirs::config_dir().map_or_else(
            || PathBuf::from("./config.toml"),
            |config_dir| config_dir.join("taskflow").join("config.toml"),
        )
    }

    /// Create the user config directory and return the config file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn create_config_dir() -> anyhow::Result<PathBuf> {
        let config_path = Self::recommended_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(config_path)
    }

    /// Render as TOML.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

/// Defaults plus every existing file, later files winning.
fn file_layers(files: &[PathBuf]) -> anyhow::Result<Figment> {
    let mut figment =
        Figment::new().merge(Toml::string(&toml::to_string(&TaskflowConfig::default())?));
    for file in files {
        figment = figment.merge(Toml::file(file));
    }
    Ok(figment)
}

fn with_env(figment: Figment) -> Figment {
    legacy_env(figment, |name| std::env::var(name).ok())
        .merge(Env::prefixed("TASKFLOW_").split("__").lowercase(true))
}

/// Merge the flat deployment variables. Unset and blank variables are
/// skipped; text values are kept verbatim so `SMTP_PASSWORD=0123` stays a
/// string.
fn legacy_env(figment: Figment, lookup: impl Fn(&str) -> Option<String>) -> Figment {
    LEGACY_ENV.iter().fold(figment, |figment, &(name, key, kind)| {
        let Some(raw) = lookup(name).filter(|value| !value.trim().is_empty()) else {
            return figment;
        };
        match (kind, raw.trim().parse::<u64>()) {
            (Legacy::Number, Ok(number)) => figment.merge(Serialized::default(key, number)),
            _ => figment.merge(Serialized::default(key, raw)),
        }
    })
}

/// Optional string that also accepts a bare number or boolean, as produced
/// by `TASKFLOW_SMTP__PASSWORD=123456`. Blank strings read as unset.
fn optional_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Scalar {
        Text(String),
        Unsigned(u64),
        Signed(i64),
        Float(f64),
        Bool(bool),
    }

    let text = Option::<Scalar>::deserialize(deserializer)?.map(|scalar| match scalar {
        Scalar::Text(text) => text,
        Scalar::Unsigned(n) => n.to_string(),
        Scalar::Signed(n) => n.to_string(),
        Scalar::Float(n) => n.to_string(),
        Scalar::Bool(b) => b.to_string(),
    });
    Ok(text.filter(|text| !text.trim().is_empty()))
}
