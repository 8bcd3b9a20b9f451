//! Tiered backup pipeline
//!
//! The source directory belongs to a live server, so every tier assumes files
//! can vanish or be locked mid-copy:
//!
//! 1. enumerate-and-stage, skipping entries that fail
//! 2. external bulk-copy utility with zero retries
//! 3. manual per-file copy with per-file suppression
//!
//! A tier that collects nothing escalates to the next; nothing after the last
//! tier is an overall failure. Staging directories are scoped and removed on
//! every exit path.

use super::artifact::{new_artifact_id, tree_size, BackupArtifact, ARTIFACT_PREFIX};
use crate::notify::{Notification, NotificationKind, Notifier};
use chrono::Utc;
use serde_json::json;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info, warn};
use walkdir::WalkDir;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

#[derive(Debug, Error)]
pub enum BackupError {
    #[error("source directory missing: {0}")]
    SourceMissing(PathBuf),
    #[error("no files could be collected from {0}")]
    NothingCollected(PathBuf),
    #[error("backup root busy: {0}")]
    RootBusy(PathBuf),
    #[error("backup I/O failure: {0}")]
    Io(#[from] io::Error),
    #[error("archive failure: {0}")]
    Archive(#[from] zip::result::ZipError),
}

/// One staging strategy. Populates `staging` from `source` and reports how
/// many files it collected; zero means the next tier takes over. Must never
/// panic or propagate per-entry failures.
pub trait StageTier: Send + Sync {
    fn name(&self) -> &'static str;
    fn stage(&self, source: &Path, staging: &Path, exclude: &str) -> usize;
}

/// Snapshot of a live save directory into the backup root.
pub struct BackupPipeline {
    source: PathBuf,
    backup_root: PathBuf,
    compress: bool,
    /// Actively-written top-level log file excluded from every tier
    exclude: String,
    notifier: Notifier,
    tiers: Vec<Box<dyn StageTier>>,
}

impl BackupPipeline {
    pub fn new(
        source: impl Into<PathBuf>,
        backup_root: impl Into<PathBuf>,
        compress: bool,
        exclude: impl Into<String>,
        notifier: Notifier,
    ) -> Self {
        Self {
            source: source.into(),
            backup_root: backup_root.into(),
            compress,
            exclude: exclude.into(),
            notifier,
            tiers: vec![
                Box::new(EnumeratedStage),
                Box::new(BulkCopyStage),
                Box::new(ManualStage),
            ],
        }
    }

    /// Replace the tier chain (used by tests).
    pub fn with_tiers(mut self, tiers: Vec<Box<dyn StageTier>>) -> Self {
        self.tiers = tiers;
        self
    }

    /// Run one backup. Emits a completion or failure event either way.
    pub fn run(&self) -> Result<BackupArtifact, BackupError> {
        let started = Instant::now();
        let result = self.run_inner();

        match &result {
            Ok(artifact) => {
                info!(
                    path = %artifact.path.display(),
                    size_bytes = artifact.size_bytes,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Backup completed"
                );
                self.notifier.send(&Notification::new(
                    NotificationKind::BackupCompleted,
                    format!(
                        "Backup completed: {} ({})",
                        artifact.id,
                        super::artifact::format_size(artifact.size_bytes)
                    ),
                    json!({
                        "path": artifact.path,
                        "sizeBytes": artifact.size_bytes,
                        "compressed": artifact.compressed,
                        "elapsedMs": started.elapsed().as_millis() as u64,
                    }),
                ));
            }
            Err(e) => {
                warn!(error = %e, elapsed_ms = started.elapsed().as_millis() as u64, "Backup failed");
                self.notifier.send(&Notification::new(
                    NotificationKind::BackupFailed,
                    format!("Backup failed: {e}"),
                    json!({
                        "error": e.to_string(),
                        "elapsedMs": started.elapsed().as_millis() as u64,
                    }),
                ));
            }
        }

        result
    }

    fn run_inner(&self) -> Result<BackupArtifact, BackupError> {
        if !self.source.is_dir() {
            return Err(BackupError::SourceMissing(self.source.clone()));
        }
        fs::create_dir_all(&self.backup_root)?;

        let id = new_artifact_id(Utc::now());
        if self.compress {
            self.run_compressed(&id)
        } else {
            self.run_plain(&id)
        }
    }

    /// Run the tier chain until one collects something.
    fn stage_tiered(&self, staging: &Path) -> usize {
        let mut collected = 0;
        for tier in &self.tiers {
            collected = tier.stage(&self.source, staging, &self.exclude);
            if collected > 0 {
                debug!(tier = tier.name(), files = collected, "Staging populated");
                break;
            }
            warn!(tier = tier.name(), "Tier collected nothing, escalating");
        }
        collected
    }

    fn run_compressed(&self, id: &str) -> Result<BackupArtifact, BackupError> {
        // Staging lives under the backup root so the final rename-equivalent
        // compression never crosses filesystems. TempDir removes it on every
        // exit path, including the error ones.
        let staging = tempfile::Builder::new()
            .prefix(".staging-")
            .tempdir_in(&self.backup_root)?;

        if self.stage_tiered(staging.path()) == 0 {
            return Err(BackupError::NothingCollected(self.source.clone()));
        }

        let archive_path = self.backup_root.join(format!("{ARTIFACT_PREFIX}{id}.zip"));
        if let Err(e) = compress_directory(staging.path(), &archive_path) {
            // Half-written archives must not be picked up by retention.
            let _ = fs::remove_file(&archive_path);
            return Err(e);
        }

        Ok(BackupArtifact {
            id: id.to_string(),
            size_bytes: tree_size(&archive_path),
            path: archive_path,
            compressed: true,
            created_at: Utc::now(),
        })
    }

    /// Non-compressed mode: copy the tree straight to a timestamped
    /// destination directory, no staging.
    fn run_plain(&self, id: &str) -> Result<BackupArtifact, BackupError> {
        let dest = self.backup_root.join(format!("{ARTIFACT_PREFIX}{id}"));
        fs::create_dir_all(&dest)?;

        let collected = ManualStage.stage(&self.source, &dest, &self.exclude);
        if collected == 0 {
            let _ = fs::remove_dir_all(&dest);
            return Err(BackupError::NothingCollected(self.source.clone()));
        }

        Ok(BackupArtifact {
            id: id.to_string(),
            size_bytes: tree_size(&dest),
            path: dest,
            compressed: false,
            created_at: Utc::now(),
        })
    }
}

/// Tier 1: enumerate top-level entries and copy each one, skipping any that
/// disappear or are locked mid-copy.
pub struct EnumeratedStage;

impl StageTier for EnumeratedStage {
    fn name(&self) -> &'static str {
        "enumerate"
    }

    fn stage(&self, source: &Path, staging: &Path, exclude: &str) -> usize {
        let entries = match fs::read_dir(source) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(error = %e, "Source enumeration failed");
                return 0;
            }
        };

        for entry in entries.flatten() {
            let name = entry.file_name();
            if name.to_string_lossy() == exclude {
                continue;
            }
            let dest = staging.join(&name);
            if let Err(e) = copy_entry(&entry.path(), &dest) {
                // Expected under live contention; the entry is skipped, the
                // run continues.
                warn!(entry = %entry.path().display(), error = %e, "Skipping entry");
                let _ = remove_partial(&dest);
            }
        }

        count_files(staging)
    }
}

/// Tier 2: hand the whole copy to an external bulk-copy utility with zero
/// retries and the same exclusion, sidestepping the enumeration race.
pub struct BulkCopyStage;

impl StageTier for BulkCopyStage {
    fn name(&self) -> &'static str {
        "bulk-copy"
    }

    fn stage(&self, source: &Path, staging: &Path, exclude: &str) -> usize {
        let Ok(rsync) = which::which("rsync") else {
            debug!("rsync not available, skipping bulk copy");
            return 0;
        };

        let mut source_arg = source.as_os_str().to_os_string();
        source_arg.push("/");

        let result = Command::new(rsync)
            .arg("-a")
            .arg("--exclude")
            // Anchored to the transfer root: only the top-level log is
            // excluded, same as the other tiers.
            .arg(format!("/{exclude}"))
            .arg(source_arg)
            .arg(staging)
            .output();

        match result {
            Ok(output) if !output.status.success() => {
                // rsync exits non-zero on partial transfers; whatever it did
                // copy still counts.
                debug!(status = %output.status, "Bulk copy finished with errors");
            }
            Err(e) => warn!(error = %e, "Bulk copy failed to run"),
            _ => {}
        }

        count_files(staging)
    }
}

/// Tier 3: walk every file individually, suppressing per-file failures.
pub struct ManualStage;

impl StageTier for ManualStage {
    fn name(&self) -> &'static str {
        "manual"
    }

    fn stage(&self, source: &Path, staging: &Path, exclude: &str) -> usize {
        let mut copied = 0usize;
        for entry in WalkDir::new(source).into_iter().filter_map(|e| e.ok()) {
            let Ok(relative) = entry.path().strip_prefix(source) else {
                continue;
            };
            if relative.as_os_str().is_empty() {
                continue;
            }
            // Top-level exclusion only, matching the other tiers.
            if relative.components().count() == 1
                && relative
                    .components()
                    .next()
                    .map(|c| c.as_os_str().to_string_lossy() == exclude)
                    .unwrap_or(false)
            {
                continue;
            }

            let dest = staging.join(relative);
            if entry.file_type().is_dir() {
                let _ = fs::create_dir_all(&dest);
                continue;
            }

            let result = dest
                .parent()
                .map(fs::create_dir_all)
                .transpose()
                .and_then(|_| fs::copy(entry.path(), &dest));
            match result {
                Ok(_) => copied += 1,
                Err(e) => {
                    warn!(file = %entry.path().display(), error = %e, "Skipping file");
                }
            }
        }
        copied
    }
}

/// Recursive copy of one directory entry, propagating the first error.
fn copy_entry(src: &Path, dest: &Path) -> io::Result<()> {
    let metadata = src.symlink_metadata()?;
    if metadata.is_dir() {
        fs::create_dir_all(dest)?;
        for entry in fs::read_dir(src)? {
            let entry = entry?;
            copy_entry(&entry.path(), &dest.join(entry.file_name()))?;
        }
    } else if metadata.is_file() {
        fs::copy(src, dest)?;
    }
    Ok(())
}

/// Remove whatever a failed entry copy left behind.
fn remove_partial(dest: &Path) -> io::Result<()> {
    if dest.is_dir() {
        fs::remove_dir_all(dest)
    } else if dest.exists() {
        fs::remove_file(dest)
    } else {
        Ok(())
    }
}

fn count_files(root: &Path) -> usize {
    WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .count()
}

/// Compress a directory tree into a zip archive.
fn compress_directory(src: &Path, archive_path: &Path) -> Result<(), BackupError> {
    let file = File::create(archive_path)?;
    let mut writer = ZipWriter::new(file);
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);

    for entry in WalkDir::new(src).into_iter().filter_map(|e| e.ok()) {
        let relative = match entry.path().strip_prefix(src) {
            Ok(r) if !r.as_os_str().is_empty() => r,
            _ => continue,
        };
        let name = relative.to_string_lossy().replace('\\', "/");

        if entry.file_type().is_dir() {
            writer.add_directory(name, options)?;
        } else if entry.file_type().is_file() {
            writer.start_file(name, options)?;
            let mut reader = File::open(entry.path())?;
            io::copy(&mut reader, &mut writer)?;
        }
    }

    writer.finish()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pipeline(source: &Path, root: &Path, compress: bool) -> BackupPipeline {
        BackupPipeline::new(source, root, compress, "server.log", Notifier::new())
    }

    #[test]
    fn test_missing_source_fails() {
        let root = tempfile::tempdir().unwrap();
        let result = pipeline(Path::new("/no/such/save"), root.path(), true).run();
        assert!(matches!(result, Err(BackupError::SourceMissing(_))));
    }

    #[test]
    fn test_compressed_backup_excludes_active_log() {
        let source = tempfile::tempdir().unwrap();
        let root = tempfile::tempdir().unwrap();
        fs::write(source.path().join("world.dat"), b"world").unwrap();
        fs::write(source.path().join("server.log"), b"chatter").unwrap();

        let artifact = pipeline(source.path(), root.path(), true).run().unwrap();
        assert!(artifact.compressed);

        let file = File::open(&artifact.path).unwrap();
        let mut archive = zip::ZipArchive::new(file).unwrap();
        let names: Vec<String> = (0..archive.len())
            .map(|i| archive.by_index(i).unwrap().name().to_string())
            .collect();
        assert!(names.contains(&"world.dat".to_string()));
        assert!(!names.iter().any(|n| n.contains("server.log")));
    }

    #[test]
    fn test_exclusion_is_top_level_only() {
        // A nested file that happens to share the log's name is data, not the
        // live log, and every tier must keep it.
        let source = tempfile::tempdir().unwrap();
        let staging = tempfile::tempdir().unwrap();
        fs::create_dir(source.path().join("old")).unwrap();
        fs::write(source.path().join("old/server.log"), b"archived").unwrap();
        fs::write(source.path().join("server.log"), b"live").unwrap();

        for tier in [&EnumeratedStage as &dyn StageTier, &ManualStage] {
            let dest = staging.path().join(tier.name());
            fs::create_dir(&dest).unwrap();
            let copied = tier.stage(source.path(), &dest, "server.log");
            assert_eq!(copied, 1, "tier {}", tier.name());
            assert!(dest.join("old/server.log").exists(), "tier {}", tier.name());
            assert!(!dest.join("server.log").exists(), "tier {}", tier.name());
        }
    }

    #[test]
    fn test_staging_removed_after_run() {
        let source = tempfile::tempdir().unwrap();
        let root = tempfile::tempdir().unwrap();
        fs::write(source.path().join("world.dat"), b"world").unwrap();

        pipeline(source.path(), root.path(), true).run().unwrap();

        let leftovers: Vec<_> = fs::read_dir(root.path())
            .unwrap()
            .flatten()
            .filter(|e| e.file_name().to_string_lossy().starts_with(".staging-"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_empty_source_exhausts_all_tiers() {
        let source = tempfile::tempdir().unwrap();
        let root = tempfile::tempdir().unwrap();

        let result = pipeline(source.path(), root.path(), true).run();
        assert!(matches!(result, Err(BackupError::NothingCollected(_))));
        // No half-made artifact left behind.
        assert!(super::super::artifact::list_artifacts(root.path())
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_plain_backup_copies_tree() {
        let source = tempfile::tempdir().unwrap();
        let root = tempfile::tempdir().unwrap();
        fs::create_dir(source.path().join("region")).unwrap();
        fs::write(source.path().join("region/r.0.dat"), b"chunk").unwrap();
        fs::write(source.path().join("server.log"), b"chatter").unwrap();

        let artifact = pipeline(source.path(), root.path(), false).run().unwrap();
        assert!(!artifact.compressed);
        assert!(artifact.path.join("region/r.0.dat").exists());
        assert!(!artifact.path.join("server.log").exists());
    }
}
