//! Runtime configuration for the triage pipeline
//!
//! Loaded from (in order of priority):
//! 1. Environment variables (`TRIAGE_LLM_API_KEY`, `TRIAGE_LLM_BASE_URL`,
//!    `TRIAGE_LLM_MODEL`, `TRIAGE_DB_PATH`)
//! 2. JSON file (`~/.config/triage/triage.json`)
//! 3. Built-in defaults

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::classify::{ClassifyOptions, LlmConfig};
use crate::models::AccountContext;
use crate::retry::RetryPolicy;
use crate::sync::{SyncMode, SyncOptions};

/// Settings filename in the triage config directory
const CONFIG_FILE: &str = "triage.json";

/// Account list filename in the triage config directory
const ACCOUNTS_FILE: &str = "accounts.json";

/// Database filename used when no path is configured
const DEFAULT_DB_FILE: &str = "triage.sqlite";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    pub batch_size: usize,
    /// Parallel message fetches per batch
    pub fetch_concurrency: usize,
    /// Minimum seconds between scheduled syncs of one account
    pub cooldown_secs: u64,
    pub target_labels: Vec<String>,
    pub max_results: Option<usize>,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            batch_size: 100,
            fetch_concurrency: 8,
            cooldown_secs: 300,
            target_labels: Vec::new(),
            max_results: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierSettings {
    #[serde(flatten)]
    pub llm: LlmConfig,
    pub batch_size: usize,
    pub max_concurrency: usize,
    pub max_api_calls_per_run: Option<usize>,
    pub max_input_chars: usize,
}

impl Default for ClassifierSettings {
    fn default() -> Self {
        Self {
            llm: LlmConfig::default(),
            batch_size: 20,
            max_concurrency: 2,
            max_api_calls_per_run: Some(200),
            max_input_chars: 500,
        }
    }
}

/// Top-level settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TriageConfig {
    /// SQLite file; defaults to `<data dir>/triage/triage.sqlite`
    pub database_path: Option<PathBuf>,
    pub sync: SyncSettings,
    pub classifier: ClassifierSettings,
    pub retry: RetryPolicy,
    pub request_timeout_secs: u64,
    /// Delete and archive skip rows classified below this confidence
    pub bulk_min_confidence: Option<f64>,
    /// Age in days after which low-value content is stripped
    pub retention_days: u32,
}

impl Default for TriageConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            sync: SyncSettings::default(),
            classifier: ClassifierSettings::default(),
            retry: RetryPolicy::default(),
            request_timeout_secs: 30,
            bulk_min_confidence: Some(0.5),
            retention_days: 90,
        }
    }
}

impl TriageConfig {
    /// Load settings from the config directory (if present) and the environment
    pub fn load() -> Result<Self> {
        let mut config = if config::config_exists(CONFIG_FILE) {
            config::load_json::<Self>(CONFIG_FILE)?
        } else {
            Self::default()
        };
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load settings from a specific JSON file, then apply the environment
    pub fn from_file(path: &Path) -> Result<Self> {
        let mut config: Self = config::load_json_file(path)?;
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Parse settings from a JSON string; missing fields take defaults
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json).context("Failed to parse triage config")?;
        config.validate()?;
        Ok(config)
    }

    /// Override fields from environment-style lookups
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(key) = lookup("TRIAGE_LLM_API_KEY") {
            self.classifier.llm.api_key = Some(key);
        }
        if let Some(url) = lookup("TRIAGE_LLM_BASE_URL") {
            self.classifier.llm.base_url = url;
        }
        if let Some(model) = lookup("TRIAGE_LLM_MODEL") {
            self.classifier.llm.model = model;
        }
        if let Some(path) = lookup("TRIAGE_DB_PATH") {
            self.database_path = Some(PathBuf::from(path));
        }
    }

    /// Write the built-in defaults to `triage.json` unless the file exists
    ///
    /// Returns whether a file was written. Environment overrides are not
    /// persisted.
    pub fn write_default_if_missing() -> Result<bool> {
        if config::config_exists(CONFIG_FILE) {
            return Ok(false);
        }
        config::save_json(CONFIG_FILE, &Self::default())?;
        Ok(true)
    }

    pub fn validate(&self) -> Result<()> {
        if self.sync.batch_size == 0 || self.classifier.batch_size == 0 {
            bail!("batch sizes must be at least 1");
        }
        if self.classifier.max_concurrency == 0 || self.sync.fetch_concurrency == 0 {
            bail!("concurrency limits must be at least 1");
        }
        if let Some(threshold) = self.bulk_min_confidence
            && !(0.0..=1.0).contains(&threshold)
        {
            bail!("bulk_min_confidence must be within [0, 1], got {}", threshold);
        }
        Ok(())
    }

    /// Resolved database path
    pub fn database_path(&self) -> Result<PathBuf> {
        if let Some(path) = &self.database_path {
            return Ok(path.clone());
        }
        let dir = config::data_dir().context("Could not determine data directory")?;
        Ok(dir.join(DEFAULT_DB_FILE))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn sync_options(&self, mode: SyncMode) -> SyncOptions {
        SyncOptions {
            mode,
            batch_size: self.sync.batch_size,
            target_labels: self.sync.target_labels.clone(),
            max_results: self.sync.max_results,
            retry: self.retry.clone(),
            ..SyncOptions::default()
        }
    }

    pub fn classify_options(&self) -> ClassifyOptions {
        ClassifyOptions {
            batch_size: self.classifier.batch_size,
            max_concurrency: self.classifier.max_concurrency,
            max_api_calls: self.classifier.max_api_calls_per_run,
            max_input_chars: self.classifier.max_input_chars,
            retry: self.retry.clone(),
            ..ClassifyOptions::default()
        }
    }
}

/// Load account credentials from `accounts.json` in the config directory
///
/// The file holds a JSON array of `{"account_id": ..., "access_token": ...}`.
pub fn load_accounts() -> Result<Vec<AccountContext>> {
    if !config::config_exists(ACCOUNTS_FILE) {
        let path =
            config::config_path(ACCOUNTS_FILE).unwrap_or_else(|| PathBuf::from(ACCOUNTS_FILE));
        bail!("No accounts configured; create {}", path.display());
    }
    config::load_json(ACCOUNTS_FILE)
}
