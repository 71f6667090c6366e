//! TOML configuration for the pipeline binary.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;

/// Default categorize-phase batch size, matching the stager's default.
const fn default_batch_size() -> u32 {
    mailvault_core::export::DEFAULT_BATCH_SIZE
}

/// Default watch-mode interval in seconds.
const fn default_interval_secs() -> u64 {
    300
}

/// One mailbox account to ingest.
#[derive(Debug, Clone, Deserialize)]
pub struct AccountConfig {
    /// Account name, recorded on every imported message.
    pub name: String,
    /// Spool directory holding the account's `.eml` files.
    pub spool_dir: PathBuf,
    /// Resume offset into the mailbox enumeration.
    #[serde(default)]
    pub skip: usize,
}

/// External classifier endpoint settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ClassifierConfig {
    /// Chat-completions endpoint URL.
    pub endpoint: String,
    /// Bearer token for the endpoint.
    pub api_key: String,
    /// Model name sent with each request.
    pub model: String,
}

/// Watch-mode settings.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct WatchConfig {
    /// Seconds between pipeline passes.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
        }
    }
}

/// Top-level configuration file.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// `SQLite` database file path.
    pub database_path: PathBuf,
    /// Directory where ingested attachments are saved.
    pub attachment_dir: PathBuf,
    /// Local staging tree for the export stager.
    pub staging_dir: PathBuf,
    /// Root directory of the local mirror store.
    pub remote_root: PathBuf,
    /// Candidate PDF passwords, tried in order.
    #[serde(default)]
    pub pdf_passwords: Vec<String>,
    /// Categorize-phase batch size.
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,
    /// Accounts to ingest, in order.
    #[serde(default)]
    pub accounts: Vec<AccountConfig>,
    /// External classifier endpoint.
    pub classifier: ClassifierConfig,
    /// Watch-mode settings.
    #[serde(default)]
    pub watch: WatchConfig,
}

impl Config {
    /// Load and parse a configuration file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("parsing config file {}", path.display()))
    }
}
