// src/config/mod.rs
pub mod sources;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::store::DEFAULT_FEED_LIMIT;

const ENV_CONFIG_PATH: &str = "FREIGHT_CONFIG_PATH";

/// Upper bound for `lock_minutes` (one year).
pub const MAX_LOCK_MINUTES: u64 = 60 * 24 * 366;

fn default_store_url() -> String {
    "sqlite://freightfeed.db".to_string()
}
fn default_output_dir() -> PathBuf {
    PathBuf::from("rss")
}
fn default_feed_base_url() -> String {
    "http://localhost/rss".to_string()
}
fn default_lock_path() -> PathBuf {
    PathBuf::from("freightfeed.lock")
}
fn default_lock_minutes() -> u64 {
    10
}
fn default_sources_path() -> PathBuf {
    PathBuf::from("config/sources.toml")
}
fn default_fetch_timeout_secs() -> u64 {
    60
}
fn default_feed_limit() -> usize {
    DEFAULT_FEED_LIMIT
}

/// Runtime configuration. File values first, then environment overrides.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Settings {
    #[serde(default = "default_store_url")]
    pub store_url: String,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// Public base URL the feed files are served from (self links).
    #[serde(default = "default_feed_base_url")]
    pub feed_base_url: String,
    #[serde(default = "default_lock_path")]
    pub lock_path: PathBuf,
    #[serde(default = "default_lock_minutes")]
    pub lock_minutes: u64,
    /// Skip every destructive write and log it instead.
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default)]
    pub report_email: Option<String>,
    #[serde(default = "default_sources_path")]
    pub sources_path: PathBuf,
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
    #[serde(default = "default_feed_limit")]
    pub feed_limit: usize,
    #[serde(default)]
    pub metrics_path: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            store_url: default_store_url(),
            output_dir: default_output_dir(),
            feed_base_url: default_feed_base_url(),
            lock_path: default_lock_path(),
            lock_minutes: default_lock_minutes(),
            dry_run: false,
            report_email: None,
            sources_path: default_sources_path(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            feed_limit: default_feed_limit(),
            metrics_path: None,
        }
    }
}

impl Settings {
    /// Load settings from:
    /// 1) $FREIGHT_CONFIG_PATH
    /// 2) config/freightfeed.toml
    /// 3) config/freightfeed.json
    /// 4) built-in defaults
    ///
    /// then apply `FREIGHT_*` environment overrides.
    pub fn load() -> Result<Self> {
        let base = if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if !pb.exists() {
                return Err(anyhow!("FREIGHT_CONFIG_PATH points to non-existent path"));
            }
            Self::from_file(&pb)?
        } else {
            let toml_p = PathBuf::from("config/freightfeed.toml");
            let json_p = PathBuf::from("config/freightfeed.json");
            if toml_p.exists() {
                Self::from_file(&toml_p)?
            } else if json_p.exists() {
                Self::from_file(&json_p)?
            } else {
                Self::default()
            }
        };
        base.with_env_overrides()
    }

    /// Parse a TOML or JSON settings file (by extension, TOML when unknown).
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading settings from {}", path.display()))?;
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        let cfg = if ext == "json" {
            serde_json::from_str(&content).context("parsing settings json")?
        } else {
            toml::from_str(&content).context("parsing settings toml")?
        };
        Ok(cfg)
    }

    pub fn with_env_overrides(mut self) -> Result<Self> {
        if let Some(v) = env_str("FREIGHT_STORE_URL") {
            self.store_url = v;
        }
        if let Some(v) = env_str("FREIGHT_OUTPUT_DIR") {
            self.output_dir = PathBuf::from(v);
        }
        if let Some(v) = env_str("FREIGHT_FEED_BASE_URL") {
            self.feed_base_url = v;
        }
        if let Some(v) = env_str("FREIGHT_LOCK_PATH") {
            self.lock_path = PathBuf::from(v);
        }
        if let Some(v) = env_str("FREIGHT_LOCK_MINUTES") {
            self.lock_minutes = v.parse().context("invalid FREIGHT_LOCK_MINUTES")?;
        }
        if let Some(v) = env_str("FREIGHT_DEBUG") {
            self.dry_run = parse_flag(&v);
        }
        if let Some(v) = env_str("FREIGHT_REPORT_EMAIL") {
            self.report_email = Some(v);
        }
        if let Some(v) = env_str("FREIGHT_SOURCES_PATH") {
            self.sources_path = PathBuf::from(v);
        }
        if let Some(v) = env_str("FREIGHT_FETCH_TIMEOUT_SECS") {
            self.fetch_timeout_secs = v.parse().context("invalid FREIGHT_FETCH_TIMEOUT_SECS")?;
        }
        if let Some(v) = env_str("FREIGHT_FEED_LIMIT") {
            self.feed_limit = v.parse().context("invalid FREIGHT_FEED_LIMIT")?;
        }
        if let Some(v) = env_str("FREIGHT_METRICS_PATH") {
            self.metrics_path = Some(PathBuf::from(v));
        }

        if self.lock_minutes > MAX_LOCK_MINUTES {
            return Err(anyhow!(
                "lock_minutes {} exceeds the maximum of {MAX_LOCK_MINUTES}",
                self.lock_minutes
            ));
        }

        // Trailing slashes would double up in self links.
        self.feed_base_url = self.feed_base_url.trim_end_matches('/').to_string();
        if self.report_email.as_deref().is_some_and(|s| s.trim().is_empty()) {
            self.report_email = None;
        }
        Ok(self)
    }
}

fn env_str(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_flag(v: &str) -> bool {
    matches!(
        v.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
