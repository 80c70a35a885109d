// src/config/sources.rs
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

fn default_kind() -> String {
    "rss".to_string()
}

/// One configured source.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SourceDef {
    /// Class identity (store partition key + output file stem).
    #[serde(rename = "class")]
    pub class_name: String,
    pub name: String,
    pub link: String,
    pub description: String,
    #[serde(default)]
    pub hidden: bool,
    #[serde(default = "default_kind")]
    pub kind: String,
    /// Cargo endpoint. Defaults to `link`.
    #[serde(default)]
    pub url: Option<String>,
}

impl SourceDef {
    pub fn endpoint(&self) -> &str {
        self.url.as_deref().unwrap_or(&self.link)
    }
}

/// Load source definitions. A missing file means no sources.
/// Supports TOML (`[[source]]` tables) or a JSON array.
pub fn load_source_defs(path: &Path) -> Result<Vec<SourceDef>> {
    if !path.exists() {
        tracing::warn!(path = %path.display(), "sources file not found");
        return Ok(Vec::new());
    }
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading sources from {}", path.display()))?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    parse_source_defs(&content, ext.as_str())
}

fn parse_source_defs(s: &str, hint_ext: &str) -> Result<Vec<SourceDef>> {
    let try_toml = hint_ext == "toml" || s.contains("[[source]]");
    if try_toml {
        if let Ok(v) = parse_toml(s) {
            return Ok(v);
        }
    }
    if let Ok(v) = parse_json(s) {
        return Ok(v);
    }
    if !try_toml {
        if let Ok(v) = parse_toml(s) {
            return Ok(v);
        }
    }
    // Surface the TOML error when that was the expected format.
    if try_toml {
        return parse_toml(s).context("parsing sources toml");
    }
    Err(anyhow!("unsupported sources format"))
}

fn parse_toml(s: &str) -> Result<Vec<SourceDef>> {
    #[derive(Deserialize)]
    struct TomlSources {
        #[serde(default)]
        source: Vec<SourceDef>,
    }
    let v: TomlSources = toml::from_str(s)?;
    Ok(v.source)
}

fn parse_json(s: &str) -> Result<Vec<SourceDef>> {
    let v: Vec<SourceDef> = serde_json::from_str(s)?;
    Ok(v)
}
