//! Retention - keep the newest N artifacts, delete the rest

use super::artifact::{format_size, list_artifacts};
use anyhow::Result;
use std::fs;
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Result of one retention pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PruneSummary {
    pub removed: usize,
    pub freed_bytes: u64,
}

/// Enforces the maximum artifact count on a backup root.
pub struct RetentionManager {
    root: PathBuf,
    max_backups: usize,
}

impl RetentionManager {
    pub fn new(root: impl Into<PathBuf>, max_backups: usize) -> Self {
        Self {
            root: root.into(),
            max_backups,
        }
    }

    /// Delete everything but the newest `max_backups` artifacts. Only runs
    /// after a successful enumeration; an individual deletion failure is
    /// logged and skipped, never fatal to the batch.
    pub fn prune(&self) -> Result<PruneSummary> {
        let artifacts = list_artifacts(&self.root)?;

        if artifacts.len() <= self.max_backups {
            debug!(
                count = artifacts.len(),
                max = self.max_backups,
                "Retention within limit, nothing to prune"
            );
            return Ok(PruneSummary::default());
        }

        let mut summary = PruneSummary::default();
        for artifact in &artifacts[self.max_backups..] {
            let result = if artifact.compressed {
                fs::remove_file(&artifact.path)
            } else {
                fs::remove_dir_all(&artifact.path)
            };

            match result {
                Ok(()) => {
                    summary.removed += 1;
                    summary.freed_bytes += artifact.size_bytes;
                }
                Err(e) => {
                    // Permission problems or an artifact still in use; leave
                    // it for the next pass.
                    warn!(path = %artifact.path.display(), error = %e, "Could not delete backup");
                }
            }
        }

        info!(
            "Removed {} backups, freed {} bytes ({})",
            summary.removed,
            summary.freed_bytes,
            format_size(summary.freed_bytes)
        );
        Ok(summary)
    }
}
