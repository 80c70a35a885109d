// src/ingest/registry.rs
//! Name -> constructor registry for sources.

use anyhow::{anyhow, Result};
use once_cell::sync::OnceCell;
use regex::Regex;

use crate::config::sources::SourceDef;
use crate::ingest::providers::rss::RssSource;
use crate::ingest::types::Source;

pub type SourceCtor = Box<dyn Fn() -> Result<Box<dyn Source>> + Send + Sync>;

struct Entry {
    class_name: String,
    ctor: SourceCtor,
}

/// Ordered set of registered sources.
#[derive(Default)]
pub struct SourceRegistry {
    entries: Vec<Entry>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register every definition, in file order.
    pub fn from_defs(defs: &[SourceDef], client: reqwest::Client) -> Self {
        let mut reg = Self::new();
        for def in defs {
            let def = def.clone();
            let client = client.clone();
            let class_name = def.class_name.clone();
            reg.register(&class_name, move || match def.kind.as_str() {
                "rss" => Ok(Box::new(RssSource::from_def(&def, client.clone())) as Box<dyn Source>),
                other => Err(anyhow!("unknown source kind `{other}`")),
            });
        }
        reg
    }

    /// Returns false (and keeps the first) when `class_name` is already taken.
    pub fn register<F>(&mut self, class_name: &str, ctor: F) -> bool
    where
        F: Fn() -> Result<Box<dyn Source>> + Send + Sync + 'static,
    {
        if self.entries.iter().any(|e| e.class_name == class_name) {
            tracing::warn!(class = class_name, "duplicate source registration ignored");
            return false;
        }
        self.entries.push(Entry {
            class_name: class_name.to_string(),
            ctor: Box::new(ctor),
        });
        true
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn class_names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.class_name.as_str()).collect()
    }

    /// Instantiate and validate sources in registration order, optionally
    /// restricted to `filter`. Failures are logged and left out.
    pub fn resolve(&self, filter: Option<&str>) -> Vec<Box<dyn Source>> {
        let mut out = Vec::new();
        for entry in &self.entries {
            if filter.is_some_and(|f| f != entry.class_name) {
                continue;
            }
            let source = match (entry.ctor)() {
                Ok(s) => s,
                Err(e) => {
                    tracing::warn!(class = %entry.class_name, "loading source failed: {e:#}");
                    continue;
                }
            };
            if let Err(e) = validate(&entry.class_name, source.as_ref()) {
                tracing::warn!(class = %entry.class_name, "source rejected: {e:#}");
                continue;
            }
            out.push(source);
        }
        if let Some(f) = filter {
            if out.is_empty() {
                tracing::warn!(class = f, "requested source not available");
            }
        }
        out
    }
}

fn class_name_re() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9_-]+$").expect("valid class name regex"))
}

/// Check the metadata a source must expose.
pub fn validate(registered_as: &str, source: &dyn Source) -> Result<()> {
    let info = source.info();
    if info.class_name != registered_as {
        return Err(anyhow!(
            "class identity `{}` doesn't match registration `{registered_as}`",
            info.class_name
        ));
    }
    if !class_name_re().is_match(&info.class_name) {
        return Err(anyhow!("class identity `{}` isn't a valid file stem", info.class_name));
    }
    for (field, value) in [
        ("name", &info.name),
        ("link", &info.link),
        ("description", &info.description),
    ] {
        if value.trim().is_empty() {
            return Err(anyhow!("missing {field}"));
        }
    }
    Ok(())
}
