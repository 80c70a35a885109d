// src/ingest/types.rs
use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// One unvalidated candidate as produced by a source.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Cargo {
    pub title: Option<String>,
    pub link: Option<String>,
    pub guid: Option<String>,
    pub description: Option<String>,
    pub image: Option<String>,
}

impl Cargo {
    pub fn new(title: &str, link: &str, guid: &str) -> Self {
        Self {
            title: Some(title.to_string()),
            link: Some(link.to_string()),
            guid: Some(guid.to_string()),
            ..Self::default()
        }
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }

    pub fn with_image(mut self, image: &str) -> Self {
        self.image = Some(image.to_string());
        self
    }

    /// Check title, link and guid, yielding a typed candidate.
    /// Blank strings count as missing.
    pub fn validate(self) -> Result<Candidate, ValidationError> {
        let title = required(self.title, "title")?;
        let link = required(self.link, "link")?;
        let guid = required(self.guid, "guid")?;
        Ok(Candidate {
            title,
            link,
            guid,
            description: self.description.filter(|s| !s.trim().is_empty()),
            image: self.image.filter(|s| !s.trim().is_empty()),
        })
    }
}

fn required(v: Option<String>, field: &'static str) -> Result<String, ValidationError> {
    match v {
        Some(s) if !s.trim().is_empty() => Ok(s),
        _ => Err(ValidationError::MissingField(field)),
    }
}

/// A validated candidate, not yet stamped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub title: String,
    pub link: String,
    pub guid: String,
    pub description: Option<String>,
    pub image: Option<String>,
}

impl Candidate {
    pub fn stamp(self, seen_ms: i64, source: &str) -> Item {
        Item {
            title: self.title,
            link: self.link,
            guid: self.guid,
            description: self.description,
            image: self.image,
            seen_ms,
            source: source.to_string(),
        }
    }
}

/// A persisted item. Immutable once stored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Item {
    pub title: String,
    pub link: String,
    pub guid: String,
    pub description: Option<String>,
    pub image: Option<String>,
    /// Milliseconds since epoch, set when the item was stored.
    pub seen_ms: i64,
    /// Class identity of the source that stored it.
    pub source: String,
}

/// Identity and channel metadata of a source.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SourceInfo {
    /// Stable class identity: store partition key and output file stem.
    pub class_name: String,
    pub name: String,
    pub link: String,
    pub description: String,
    #[serde(default)]
    pub hidden: bool,
}

#[async_trait::async_trait]
pub trait Source: Send + Sync {
    fn info(&self) -> &SourceInfo;

    /// Retrieve the current cargo. Each call is a fresh retrieval.
    async fn cargo(&self) -> Result<Vec<Cargo>>;

    fn class_name(&self) -> &str {
        &self.info().class_name
    }

    fn name(&self) -> &str {
        &self.info().name
    }

    fn hidden(&self) -> bool {
        self.info().hidden
    }
}
