//! Configuration parsing and validation.
//!
//! Tabula reads a single TOML file at startup (default
//! `./config/tabula.toml`). The file is parsed once and treated as immutable
//! for the rest of the process.
//!
//! # Example
//!
//! ```toml
//! [source]
//! api_url = "https://apidatalake.tesouro.gov.br/ords/siconfi/tt/anexos-relatorios"
//! timeout_secs = 30
//! max_retry_attempts = 3
//! use_fallback = true
//! fallback_path = "./config/annexes.json"
//!
//! [table]
//! page_size = 20
//! page_size_options = [20, 40]
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::fetch::FetchPolicy;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub source: SourceConfig,
    #[serde(default)]
    pub table: TableConfig,
}

/// Where the dataset comes from and how hard to try.
#[derive(Debug, Deserialize, Clone)]
pub struct SourceConfig {
    /// Required. There is no default endpoint.
    #[serde(default)]
    pub api_url: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retry_attempts")]
    pub max_retry_attempts: u32,
    #[serde(default = "default_use_fallback")]
    pub use_fallback: bool,
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    /// JSON array of annex records served when every attempt fails.
    #[serde(default)]
    pub fallback_path: Option<PathBuf>,
}

fn default_timeout_secs() -> u64 {
    30
}
fn default_max_retry_attempts() -> u32 {
    3
}
fn default_use_fallback() -> bool {
    true
}
fn default_backoff_base_ms() -> u64 {
    1000
}

impl SourceConfig {
    /// The configured URL, trimmed. `None` when absent or blank.
    pub fn url(&self) -> Option<&str> {
        self.api_url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
    }

    pub fn policy(&self) -> FetchPolicy {
        FetchPolicy {
            max_attempts: self.max_retry_attempts,
            attempt_timeout: Duration::from_secs(self.timeout_secs),
            backoff_base: Duration::from_millis(self.backoff_base_ms),
            use_fallback: self.use_fallback,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct TableConfig {
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default = "default_page_size_options")]
    pub page_size_options: Vec<usize>,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            page_size_options: default_page_size_options(),
        }
    }
}

fn default_page_size() -> usize {
    20
}
fn default_page_size_options() -> Vec<usize> {
    vec![20, 40]
}

/// Load and validate a configuration file.
///
/// Relative `fallback_path` values are resolved against the directory that
/// holds the config file.
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let mut config: Config =
        toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    validate(&config)?;

    if let Some(fallback) = &config.source.fallback_path {
        if fallback.is_relative() {
            if let Some(dir) = path.parent() {
                config.source.fallback_path = Some(dir.join(fallback));
            }
        }
    }

    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.source.url().is_none() {
        anyhow::bail!("source.api_url is required and must not be empty");
    }

    if config.source.timeout_secs == 0 {
        anyhow::bail!("source.timeout_secs must be > 0");
    }

    if config.source.max_retry_attempts < 1 {
        anyhow::bail!("source.max_retry_attempts must be >= 1");
    }

    if config.table.page_size == 0 {
        anyhow::bail!("table.page_size must be > 0");
    }

    let options = &config.table.page_size_options;
    if options.contains(&0) {
        anyhow::bail!("table.page_size_options must not contain 0");
    }
    if !options.is_empty() && !options.contains(&config.table.page_size) {
        anyhow::bail!(
            "table.page_size {} is not one of table.page_size_options {:?}",
            config.table.page_size,
            options
        );
    }

    Ok(())
}
