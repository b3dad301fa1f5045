//! Duplicate detection over the uploads directory.
//!
//! Temp files are excluded from the scan: every in-flight connection has
//! one in the directory, and for identical-content races hashing the other
//! racer's temp would report a duplicate that was never finalized.

use std::path::Path;

use tracing::warn;
use vidgate_protocol::naming;

use crate::hasher;

/// Returns true iff some regular file in `dir`, other than `ignore` and
/// other than temp or hidden files, hashes to `target_hash`
/// (case-insensitive hex comparison). Unreadable candidates are logged and
/// treated as non-matches; a missing directory yields false.
pub fn duplicate_exists(dir: &Path, target_hash: &str, ignore: &Path) -> bool {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(_) => return false,
    };

    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                warn!("skipping unreadable directory entry: {err}");
                continue;
            }
        };

        let name = entry.file_name();
        let name = name.to_string_lossy();
        if naming::is_temp_name(&name) || naming::is_hidden_name(&name) {
            continue;
        }

        let path = entry.path();
        if path == ignore {
            continue;
        }

        match entry.file_type() {
            Ok(file_type) if file_type.is_file() => {}
            Ok(_) => continue,
            Err(err) => {
                warn!("skipping candidate {}: {err}", path.display());
                continue;
            }
        }

        match hasher::sha256_file(&path) {
            Ok(hash) if hash.eq_ignore_ascii_case(target_hash) => return true,
            Ok(_) => {}
            Err(err) => {
                warn!("skipping unreadable candidate {}: {err}", path.display());
            }
        }
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    const HELLO_HASH: &str = "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824";

    fn finalized(dir: &Path, stem: &str, content: &[u8]) -> PathBuf {
        let path = dir.join(format!("20260801_120000000_abcd1234_{stem}"));
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn finds_a_finalized_duplicate() {
        let dir = TempDir::new().unwrap();
        finalized(dir.path(), "a.mp4", b"hello");

        assert!(duplicate_exists(
            dir.path(),
            HELLO_HASH,
            &dir.path().join("vid-000000000000.tmp")
        ));
    }

    #[test]
    fn comparison_is_case_insensitive() {
        let dir = TempDir::new().unwrap();
        finalized(dir.path(), "a.mp4", b"hello");

        let upper = HELLO_HASH.to_uppercase();
        assert!(duplicate_exists(
            dir.path(),
            &upper,
            &dir.path().join("vid-000000000000.tmp")
        ));
    }

    #[test]
    fn ignored_path_is_not_a_duplicate() {
        let dir = TempDir::new().unwrap();
        let only = finalized(dir.path(), "a.mp4", b"hello");

        assert!(!duplicate_exists(dir.path(), HELLO_HASH, &only));
    }

    #[test]
    fn temp_and_hidden_files_are_skipped() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("vid-aaaabbbbcccc.tmp"), b"hello").unwrap();
        std::fs::write(dir.path().join(".hidden"), b"hello").unwrap();

        assert!(!duplicate_exists(
            dir.path(),
            HELLO_HASH,
            &dir.path().join("vid-000000000000.tmp")
        ));
    }

    #[test]
    fn non_matching_content_is_not_a_duplicate() {
        let dir = TempDir::new().unwrap();
        finalized(dir.path(), "a.mp4", b"something else");

        assert!(!duplicate_exists(
            dir.path(),
            HELLO_HASH,
            &dir.path().join("vid-000000000000.tmp")
        ));
    }

    #[test]
    fn subdirectories_are_skipped() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("nested.mp4")).unwrap();

        assert!(!duplicate_exists(
            dir.path(),
            HELLO_HASH,
            &dir.path().join("vid-000000000000.tmp")
        ));
    }

    #[test]
    fn missing_directory_yields_false() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("gone");

        assert!(!duplicate_exists(
            &missing,
            HELLO_HASH,
            &missing.join("vid-000000000000.tmp")
        ));
    }
}
