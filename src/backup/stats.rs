//! Backup statistics for the monitoring collaborator

use super::artifact::{format_size, list_artifacts};
use anyhow::Result;
use serde::Serialize;
use std::path::Path;

/// Aggregate view over a backup root.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupStats {
    pub count: usize,
    pub total_size_bytes: u64,
    pub total_size_human: String,
    pub newest: Option<String>,
    pub oldest: Option<String>,
}

impl BackupStats {
    /// Gather statistics for a backup root. An absent root reads as empty.
    pub fn gather(root: &Path) -> Result<Self> {
        if !root.is_dir() {
            return Ok(Self {
                count: 0,
                total_size_bytes: 0,
                total_size_human: format_size(0),
                newest: None,
                oldest: None,
            });
        }

        let artifacts = list_artifacts(root)?;
        let total_size_bytes = artifacts.iter().map(|a| a.size_bytes).sum();

        Ok(Self {
            count: artifacts.len(),
            total_size_bytes,
            total_size_human: format_size(total_size_bytes),
            newest: artifacts.first().map(|a| a.id.clone()),
            oldest: artifacts.last().map(|a| a.id.clone()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_stats_empty_root() {
        let dir = tempfile::tempdir().unwrap();
        let stats = BackupStats::gather(dir.path()).unwrap();
        assert_eq!(stats.count, 0);
        assert!(stats.newest.is_none());
    }

    #[test]
    fn test_stats_missing_root_reads_empty() {
        let stats = BackupStats::gather(Path::new("/no/such/backups")).unwrap();
        assert_eq!(stats.count, 0);
    }

    #[test]
    fn test_stats_reports_newest_and_oldest() {
        let dir = tempfile::tempdir().unwrap();
        for id in ["20260101_000000", "20260301_000000"] {
            fs::write(dir.path().join(format!("backup_{id}.zip")), vec![0u8; 50]).unwrap();
        }

        let stats = BackupStats::gather(dir.path()).unwrap();
        assert_eq!(stats.count, 2);
        assert_eq!(stats.total_size_bytes, 100);
        assert_eq!(stats.newest.as_deref(), Some("20260301_000000"));
        assert_eq!(stats.oldest.as_deref(), Some("20260101_000000"));
    }
}
