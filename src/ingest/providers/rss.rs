// src/ingest/providers/rss.rs
use anyhow::{Context, Result};
use async_trait::async_trait;
use quick_xml::de::from_str;
use serde::Deserialize;

use crate::config::sources::SourceDef;
use crate::ingest::types::{Cargo, Source, SourceInfo};

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    item: Vec<RssItem>,
}

#[derive(Debug, Deserialize)]
struct RssItem {
    title: Option<String>,
    link: Option<String>,
    guid: Option<Guid>,
    description: Option<String>,
    enclosure: Option<Enclosure>,
}

#[derive(Debug, Deserialize)]
struct Guid {
    #[serde(rename = "$text")]
    value: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Enclosure {
    #[serde(rename = "@url")]
    url: Option<String>,
    #[serde(rename = "@type")]
    mime: Option<String>,
}

fn clean(s: Option<String>) -> Option<String> {
    s.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// Relays an upstream RSS 2.0 feed as cargo.
pub struct RssSource {
    info: SourceInfo,
    mode: Mode,
}

enum Mode {
    Fixture(String),
    Http {
        url: String,
        client: reqwest::Client,
    },
}

impl RssSource {
    pub fn from_def(def: &SourceDef, client: reqwest::Client) -> Self {
        Self {
            info: info_from_def(def),
            mode: Mode::Http {
                url: def.endpoint().to_string(),
                client,
            },
        }
    }

    pub fn from_fixture(info: SourceInfo, xml: &str) -> Self {
        Self {
            info,
            mode: Mode::Fixture(xml.to_string()),
        }
    }

    fn parse_cargo(s: &str) -> Result<Vec<Cargo>> {
        let rss: Rss = from_str(s).context("parsing rss xml")?;
        let out = rss
            .channel
            .item
            .into_iter()
            .map(|it| {
                let link = clean(it.link);
                let guid = clean(it.guid.and_then(|g| g.value)).or_else(|| link.clone());
                let image = it
                    .enclosure
                    .filter(|e| e.mime.as_deref().is_some_and(|m| m.starts_with("image/")))
                    .and_then(|e| clean(e.url));
                Cargo {
                    title: clean(it.title),
                    link,
                    guid,
                    description: clean(it.description),
                    image,
                }
            })
            .collect();
        Ok(out)
    }
}

pub fn info_from_def(def: &SourceDef) -> SourceInfo {
    SourceInfo {
        class_name: def.class_name.clone(),
        name: def.name.clone(),
        link: def.link.clone(),
        description: def.description.clone(),
        hidden: def.hidden,
    }
}

#[async_trait]
impl Source for RssSource {
    fn info(&self) -> &SourceInfo {
        &self.info
    }

    async fn cargo(&self) -> Result<Vec<Cargo>> {
        match &self.mode {
            Mode::Fixture(s) => Self::parse_cargo(s),
            Mode::Http { url, client } => {
                let body = client
                    .get(url.as_str())
                    .send()
                    .await
                    .with_context(|| format!("GET {url}"))?
                    .error_for_status()
                    .with_context(|| format!("GET {url}"))?
                    .text()
                    .await
                    .context("reading rss body")?;
                Self::parse_cargo(&body)
            }
        }
    }
}
