use std::path::Path;

use anyhow::{Context, Result};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the Prometheus recorder. Only one recorder can exist per
    /// process; a second call fails.
    pub fn init() -> Result<Self> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .context("prometheus: install recorder")?;
        Ok(Self { handle })
    }

    pub fn render(&self) -> String {
        self.handle.render()
    }

    /// Write the exposition text for a node-exporter textfile collector.
    pub async fn write_textfile(&self, path: &Path) -> Result<()> {
        crate::render::write_atomic(path, &self.render()).await
    }
}
