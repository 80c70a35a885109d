//! Feed and index documents, and writing them to the output directory.

pub mod feed;
pub mod index;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use time::OffsetDateTime;

use crate::ingest::types::{Item, SourceInfo};

pub const INDEX_FILE: &str = "index.html";

#[derive(Debug, Clone)]
pub struct FeedRenderer {
    base_url: String,
}

impl FeedRenderer {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// `<base>/<class>.xml`
    pub fn self_link(&self, info: &SourceInfo) -> String {
        format!("{}/{}", self.base_url, feed_file_name(info))
    }

    pub fn render_feed(&self, info: &SourceInfo, items: &[Item]) -> Result<String> {
        self.render_feed_at(info, items, OffsetDateTime::now_utc())
    }

    pub fn render_feed_at(
        &self,
        info: &SourceInfo,
        items: &[Item],
        built_at: OffsetDateTime,
    ) -> Result<String> {
        feed::render_feed(info, items, &self.self_link(info), built_at)
    }

    pub fn render_index<'a, I>(&self, sources: I) -> String
    where
        I: IntoIterator<Item = &'a SourceInfo>,
    {
        index::render_index(sources)
    }
}

pub fn feed_file_name(info: &SourceInfo) -> String {
    format!("{}.xml", info.class_name)
}

pub fn feed_path(output_dir: &Path, info: &SourceInfo) -> PathBuf {
    output_dir.join(feed_file_name(info))
}

/// Write `content` next to `path` first, then rename over it, so readers
/// never see a partial document.
pub async fn write_atomic(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    tokio::fs::write(&tmp, content)
        .await
        .with_context(|| format!("writing {}", tmp.display()))?;
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e).with_context(|| format!("renaming into {}", path.display()));
    }
    Ok(())
}
