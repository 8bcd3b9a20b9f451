//! Post-hoc artifact verification

use std::fs::File;
use std::path::Path;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Sanity-checks a produced artifact without ever mutating it.
pub struct IntegrityVerifier;

impl IntegrityVerifier {
    /// Verify an artifact. Compressed artifacts must open as an archive and
    /// yield every entry; uncompressed ones must contain at least one item.
    pub fn verify(path: &Path) -> bool {
        if path.is_dir() {
            Self::verify_directory(path)
        } else if path.is_file() {
            Self::verify_archive(path)
        } else {
            warn!(path = %path.display(), "Artifact missing");
            false
        }
    }

    fn verify_archive(path: &Path) -> bool {
        let file = match File::open(path) {
            Ok(file) => file,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Archive unreadable");
                return false;
            }
        };

        let mut archive = match zip::ZipArchive::new(file) {
            Ok(archive) => archive,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Archive structure invalid");
                return false;
            }
        };

        if archive.len() == 0 {
            warn!(path = %path.display(), "Archive has no entries");
            return false;
        }

        for i in 0..archive.len() {
            if let Err(e) = archive.by_index(i) {
                warn!(path = %path.display(), entry = i, error = %e, "Archive entry unreadable");
                return false;
            }
        }

        debug!(path = %path.display(), entries = archive.len(), "Archive verified");
        true
    }

    fn verify_directory(path: &Path) -> bool {
        let items = WalkDir::new(path)
            .min_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
            .count();
        if items == 0 {
            warn!(path = %path.display(), "Backup directory is empty");
        }
        items > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_valid_archive_passes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("backup.zip");
        let file = File::create(&path).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        writer
            .start_file("world.dat", zip::write::FileOptions::default())
            .unwrap();
        writer.write_all(b"world").unwrap();
        writer.finish().unwrap();

        assert!(IntegrityVerifier::verify(&path));
    }

    #[test]
    fn test_truncated_archive_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("backup.zip");
        let file = File::create(&path).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        writer
            .start_file("world.dat", zip::write::FileOptions::default())
            .unwrap();
        writer.write_all(&[0u8; 4096]).unwrap();
        writer.finish().unwrap();

        // Chop off the central directory.
        let bytes = std::fs::read(&path).unwrap();
        std::fs::write(&path, &bytes[..bytes.len() / 2]).unwrap();

        assert!(!IntegrityVerifier::verify(&path));
    }

    #[test]
    fn test_empty_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!IntegrityVerifier::verify(dir.path()));
    }

    #[test]
    fn test_populated_directory_passes() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("world.dat"), b"world").unwrap();
        assert!(IntegrityVerifier::verify(dir.path()));
    }

    #[test]
    fn test_missing_path_fails() {
        assert!(!IntegrityVerifier::verify(Path::new("/no/such/backup.zip")));
    }
}
