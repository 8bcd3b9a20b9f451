//! Backup artifact naming and enumeration

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use regex::Regex;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

/// File-name prefix every artifact carries.
pub const ARTIFACT_PREFIX: &str = "backup_";

/// Naming convention: `backup_YYYYMMDD_HHMMSS[.zip]`.
fn artifact_name_pattern() -> Regex {
    Regex::new(r"^backup_(\d{8}_\d{6})(\.zip)?$").unwrap_or_else(|_| unreachable!("static regex"))
}

/// One backup on disk. Created by the pipeline, owned by the filesystem,
/// enumerated and deleted by retention.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupArtifact {
    /// Timestamp id, e.g. `20260825_031500`
    pub id: String,
    pub path: PathBuf,
    pub size_bytes: u64,
    pub compressed: bool,
    pub created_at: DateTime<Utc>,
}

/// Timestamp id for an artifact created now.
pub fn new_artifact_id(now: DateTime<Utc>) -> String {
    now.format("%Y%m%d_%H%M%S").to_string()
}

/// Parse an artifact file name into (id, compressed). Non-conforming names
/// return `None` and are never touched by retention.
pub fn parse_artifact_name(name: &str) -> Option<(String, bool)> {
    let captures = artifact_name_pattern().captures(name)?;
    let id = captures.get(1)?.as_str().to_string();
    let compressed = captures.get(2).is_some();
    Some((id, compressed))
}

fn created_at_from_id(id: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(id, "%Y%m%d_%H%M%S")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Total size of a file or directory tree in bytes.
pub fn tree_size(path: &Path) -> u64 {
    if path.is_file() {
        return path.metadata().map(|m| m.len()).unwrap_or(0);
    }
    walkdir::WalkDir::new(path)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| e.metadata().ok())
        .map(|m| m.len())
        .sum()
}

/// Enumerate the artifacts under a backup root, newest first.
pub fn list_artifacts(root: &Path) -> Result<Vec<BackupArtifact>> {
    let entries = fs::read_dir(root)
        .with_context(|| format!("Failed to list backup root: {}", root.display()))?;

    let mut artifacts = Vec::new();
    for entry in entries.flatten() {
        let name = entry.file_name().to_string_lossy().to_string();
        let Some((id, compressed)) = parse_artifact_name(&name) else {
            continue;
        };
        let path = entry.path();
        let created_at = created_at_from_id(&id)
            .or_else(|| {
                entry
                    .metadata()
                    .and_then(|m| m.modified())
                    .ok()
                    .map(DateTime::<Utc>::from)
            })
            .unwrap_or_else(Utc::now);

        artifacts.push(BackupArtifact {
            size_bytes: tree_size(&path),
            id,
            path,
            compressed,
            created_at,
        });
    }

    artifacts.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
    Ok(artifacts)
}

/// Human-readable byte count, e.g. `12.4 MiB`.
pub fn format_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}
