//! Prometheus textfile export.
//!
//! A run is too short to be scraped, so the recorder is installed without a
//! listener and the rendered exposition is written once the verdict is known,
//! for a node-exporter textfile collector to pick up.

use std::path::Path;

use anyhow::Result;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Install the global metrics recorder and register metric descriptions.
///
/// # Errors
///
/// - Global recorder is already installed
pub fn install_metrics_recorder() -> Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| anyhow::anyhow!("failed to install metrics recorder: {}", e))?;

    devicetest_core::metrics::describe_all();
    tracing::debug!("Prometheus metrics recorder installed");

    Ok(handle)
}

/// Render everything recorded so far into `path`.
///
/// Written to a sibling temp file first and renamed, so a collector never
/// reads a half-written file.
pub async fn write_exposition(handle: &PrometheusHandle, path: &Path) -> std::io::Result<()> {
    let rendered = handle.render();
    let mut partial = path.as_os_str().to_owned();
    partial.push(".tmp");

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(&partial, rendered).await?;
    tokio::fs::rename(&partial, path).await?;

    tracing::info!(path = %path.display(), "metrics written");
    Ok(())
}
