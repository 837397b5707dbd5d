//! Configuration loader and validator for the source-folder→social publisher.
use crate::model::Channel;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Root configuration struct mirroring the YAML schema exactly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    pub app: App,
    pub source: Source,
    pub enrichment: Enrichment,
    pub publisher: Publisher,
    pub channels: Vec<Channel>,
}

/// App-level settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct App {
    pub data_dir: String,
    pub poll_interval_secs: u64,
    /// Upper bound on one pipeline run; remaining channels are skipped once
    /// it elapses. 0 disables the deadline.
    pub run_deadline_secs: u64,
    pub request_timeout_secs: u64,
}

/// File-store (source provider) API settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Source {
    pub base_url: String,
    pub token: String,
}

/// Enrichment (text generation) API settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Enrichment {
    pub base_url: String,
    pub token: String,
}

/// Publish provider API settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Publisher {
    pub base_url: String,
    pub token: String,
}

impl Config {
    /// Ensure required directories exist (creates `app.data_dir` if missing).
    pub fn ensure_dirs(&self) -> Result<(), std::io::Error> {
        if self.app.data_dir.trim().is_empty() {
            return Ok(());
        }
        fs::create_dir_all(&self.app.data_dir)
    }
}

/// Load configuration from a YAML file and validate it.
/// - If `path` is None, uses `config.yaml` in the current working directory.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let content = fs::read_to_string(path)?;
    let cfg: Config = serde_yaml::from_str(&content)?;
    validate(&cfg)?;
    Ok(cfg)
}

/// Validate a configuration instance.
fn validate(cfg: &Config) -> Result<(), ConfigError> {
    fn invalid(msg: impl Into<String>) -> ConfigError {
        ConfigError::Invalid(msg.into())
    }

    if cfg.app.data_dir.trim().is_empty() {
        return Err(invalid("app.data_dir must be non-empty"));
    }
    if cfg.app.poll_interval_secs == 0 {
        return Err(invalid("app.poll_interval_secs must be > 0"));
    }
    if cfg.app.request_timeout_secs == 0 {
        return Err(invalid("app.request_timeout_secs must be > 0"));
    }

    if cfg.source.base_url.trim().is_empty() {
        return Err(invalid("source.base_url must be non-empty"));
    }
    if cfg.source.token.trim().is_empty() {
        return Err(invalid("source.token must be non-empty"));
    }
    if cfg.enrichment.base_url.trim().is_empty() {
        return Err(invalid("enrichment.base_url must be non-empty"));
    }
    if cfg.enrichment.token.trim().is_empty() {
        return Err(invalid("enrichment.token must be non-empty"));
    }
    if cfg.publisher.base_url.trim().is_empty() {
        return Err(invalid("publisher.base_url must be non-empty"));
    }
    if cfg.publisher.token.trim().is_empty() {
        return Err(invalid("publisher.token must be non-empty"));
    }

    for ch in &cfg.channels {
        if ch.id.trim().is_empty() {
            return Err(invalid("channels[].id must be non-empty"));
        }
        if ch.owner_id.trim().is_empty() {
            return Err(invalid(format!("channel {}: owner_id must be non-empty", ch.id)));
        }
        if ch.source_folder.trim().is_empty() {
            return Err(invalid(format!(
                "channel {}: source_folder must be non-empty",
                ch.id
            )));
        }
        if ch.archive_folder.trim().is_empty() {
            return Err(invalid(format!(
                "channel {}: archive_folder must be non-empty",
                ch.id
            )));
        }
        if ch.source_folder == ch.archive_folder {
            return Err(invalid(format!(
                "channel {}: source_folder and archive_folder must differ",
                ch.id
            )));
        }
        if ch.enabled && ch.targets.is_empty() {
            return Err(invalid(format!(
                "channel {}: enabled channel needs at least one target",
                ch.id
            )));
        }
        if ch.targets.iter().any(|t| t.trim().is_empty()) {
            return Err(invalid(format!("channel {}: targets must be non-empty", ch.id)));
        }
    }

    Ok(())
}

/// Example YAML document, kept in sync with the schema above.
pub fn example() -> &'static str {
    r#"app:
  data_dir: "./data"
  poll_interval_secs: 300
  run_deadline_secs: 240
  request_timeout_secs: 30

source:
  base_url: "https://files.example.com/"
  token: "YOUR_FILE_STORE_TOKEN"

enrichment:
  base_url: "https://enrich.example.com/"
  token: "YOUR_ENRICHMENT_TOKEN"

publisher:
  base_url: "https://publish.example.com/"
  token: "YOUR_PUBLISHER_TOKEN"

channels:
  - id: "channel-1"
    owner_id: "user-1"
    enabled: true
    source_folder: "folder-incoming"
    archive_folder: "folder-archive"
    targets:
      - "acct-tiktok"
      - "acct-youtube"
    rules:
      language: "en"
      tone: "casual"
      constraints:
        - "no hashtags in the title"
"#
}
