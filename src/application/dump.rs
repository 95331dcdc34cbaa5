//! JSON dumps of run output
//!
//! Writes the run's aggregates (and their store reports) to a pretty-printed
//! JSON file so a run's raw yield can be inspected or reprocessed without
//! touching the database.

use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use crate::application::pipeline::RunSummary;

/// Dump a run summary, aggregates included, to `path`.
pub async fn dump_run_summary(path: &Path, summary: &RunSummary) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }

    let json = serde_json::to_vec_pretty(summary).context("serializing run summary")?;
    tokio::fs::write(path, json)
        .await
        .with_context(|| format!("writing run summary to {}", path.display()))?;

    info!(
        "dumped {} aggregate(s) to {}",
        summary.results.len(),
        path.display()
    );
    Ok(())
}

/// Read a previously dumped run summary back.
pub async fn load_run_summary(path: &Path) -> Result<RunSummary> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading run summary from {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing run summary {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn round_trips_a_summary() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("results.json");

        let summary = RunSummary {
            total: 2,
            succeeded: 1,
            ..RunSummary::default()
        };

        dump_run_summary(&path, &summary).await.unwrap();
        let back = load_run_summary(&path).await.unwrap();
        assert_eq!(back.total, 2);
        assert_eq!(back.succeeded, 1);
    }
}
