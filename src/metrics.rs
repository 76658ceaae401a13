use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::path::Path;

use crate::error::{Error, Result};
use crate::ingest::csv::write_atomic;

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the Prometheus recorder for this process.
    pub fn init() -> Result<Self> {
        // Use default buckets to avoid API differences across crate versions.
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .map_err(|e| Error::Metrics(format!("prometheus: install recorder: {e}")))?;
        Ok(Self { handle })
    }

    pub fn render(&self) -> String {
        self.handle.render()
    }

    /// Write the exposition text for a textfile collector (atomic replace).
    pub async fn write_textfile(&self, path: &Path) -> Result<()> {
        write_atomic(path, &self.render()).await
    }
}
