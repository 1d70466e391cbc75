//! Recursive source walk, media filtering, and size totaling (C7).
//!
//! Grounded on the teacher's `fs_ops::enumerate_tree` for the recursive-walk
//! shape, generalized with the media-extension filter, hidden/system-folder
//! exclusion, and periodic source-removal recheck from
//! `transfer_components.py::get_valid_media_files`.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::capability::Storage;
use crate::error::TransferError;
use crate::model::Config;

const RECHECK_INTERVAL: usize = 100;

/// A file discovered by enumeration, before a destination path is assigned.
#[derive(Debug, Clone)]
pub struct SourceEntry {
    pub path: PathBuf,
    pub size_bytes: u64,
    pub modification_time: SystemTime,
}

fn is_hidden_or_system(path: &Path, source_root: &Path) -> bool {
    let rel = path.strip_prefix(source_root).unwrap_or(path);
    rel.components().any(|c| {
        let s = c.as_os_str().to_string_lossy();
        s.starts_with('.') || s == "System Volume Information"
    })
}

fn source_still_present(source_root: &Path, storage: &dyn Storage) -> bool {
    source_root.exists() && storage.is_mounted(source_root)
}

/// Walks `source_root`, applying the media-extension filter when
/// `config.media_only_transfer` is set, and returns paths in sorted
/// (lexicographic) order for deterministic transfer ordering.
pub fn enumerate(
    source_root: &Path,
    config: &Config,
    storage: &dyn Storage,
) -> Result<Vec<PathBuf>, TransferError> {
    let mut found = Vec::new();
    let mut visited_dirs = HashSet::new();
    let mut checked = 0usize;
    let mut stack = vec![source_root.to_path_buf()];

    while let Some(dir) = stack.pop() {
        if let Ok(canon) = fs::canonicalize(&dir) {
            if !visited_dirs.insert(canon) {
                continue;
            }
        }

        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(_) => continue,
        };

        for entry in entries.flatten() {
            let path = entry.path();
            let file_type = match entry.file_type() {
                Ok(ft) => ft,
                Err(_) => continue,
            };
            if file_type.is_symlink() {
                continue;
            }
            if is_hidden_or_system(&path, source_root) {
                continue;
            }
            if file_type.is_dir() {
                stack.push(path);
                continue;
            }
            if !file_type.is_file() {
                continue;
            }

            checked += 1;
            if checked % RECHECK_INTERVAL == 0 && !source_still_present(source_root, storage) {
                return Err(TransferError::SourceRemoved {
                    path: source_root.to_path_buf(),
                });
            }

            if config.media_only_transfer {
                let matches = path
                    .extension()
                    .map(|e| {
                        let ext = format!(".{}", e.to_string_lossy().to_lowercase());
                        config.media_extensions.contains(&ext)
                    })
                    .unwrap_or(false);
                if !matches {
                    continue;
                }
            }

            found.push(path);
        }
    }

    found.sort();
    Ok(found)
}

/// Stats each enumerated path, dropping (and logging) any that vanished
/// since enumeration, and returns the surviving entries with their total
/// byte count.
pub fn calculate_totals(paths: Vec<PathBuf>) -> (Vec<SourceEntry>, u64, usize) {
    let mut entries = Vec::with_capacity(paths.len());
    let mut total_size = 0u64;

    for path in paths {
        match fs::metadata(&path) {
            Ok(meta) => {
                let size = meta.len();
                let mtime = meta.modified().unwrap_or_else(|_| SystemTime::now());
                total_size += size;
                entries.push(SourceEntry {
                    path,
                    size_bytes: size,
                    modification_time: mtime,
                });
            }
            Err(_) => {
                tracing::warn!(path = %path.display(), "file vanished before stat; skipping");
            }
        }
    }

    let total_files = entries.len();
    (entries, total_size, total_files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::tempdir;

    struct AlwaysMounted;
    impl Storage for AlwaysMounted {
        fn available_volumes(&self) -> Vec<PathBuf> {
            vec![]
        }
        fn volume_info(&self, _path: &Path) -> Result<crate::capability::VolumeInfo, TransferError> {
            unimplemented!()
        }
        fn is_mounted(&self, _path: &Path) -> bool {
            true
        }
        fn wait_for_new_volume(&self, _initial: &[PathBuf]) -> PathBuf {
            unimplemented!()
        }
        fn wait_for_removal(&self, _path: &Path) {}
        fn unmount(&self, _path: &Path) -> bool {
            true
        }
        fn read_metadata(&self, _path: &Path) -> crate::capability::Metadata {
            Default::default()
        }
        fn apply_metadata(&self, _path: &Path, _metadata: &crate::capability::Metadata) -> bool {
            true
        }
    }

    #[test]
    fn excludes_hidden_and_system_paths() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join(".hidden")).unwrap();
        fs::write(dir.path().join(".hidden/x.mp4"), b"x").unwrap();
        fs::create_dir_all(dir.path().join("System Volume Information")).unwrap();
        fs::write(dir.path().join("System Volume Information/y.mp4"), b"y").unwrap();
        fs::write(dir.path().join("visible.mp4"), b"z").unwrap();

        let config = Config::default();
        let found = enumerate(dir.path(), &config, &AlwaysMounted).unwrap();

        assert_eq!(found, vec![dir.path().join("visible.mp4")]);
    }

    #[test]
    fn media_only_filters_by_extension() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.mp4"), b"1").unwrap();
        fs::write(dir.path().join("b.txt"), b"2").unwrap();

        let mut config = Config::default();
        config.media_only_transfer = true;
        config.media_extensions = [".mp4".to_string()].into_iter().collect();

        let found = enumerate(dir.path(), &config, &AlwaysMounted).unwrap();
        assert_eq!(found, vec![dir.path().join("a.mp4")]);
    }

    #[test]
    fn results_are_sorted_lexicographically() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("b.mov"), b"1").unwrap();
        fs::write(dir.path().join("a.mov"), b"2").unwrap();

        let config = Config::default();
        let found = enumerate(dir.path(), &config, &AlwaysMounted).unwrap();
        assert_eq!(
            found,
            vec![dir.path().join("a.mov"), dir.path().join("b.mov")]
        );
    }

    #[test]
    fn calculate_totals_skips_vanished_files() {
        let dir = tempdir().unwrap();
        let present = dir.path().join("present.mov");
        fs::write(&present, vec![0u8; 10]).unwrap();
        let vanished = dir.path().join("gone.mov");

        let (entries, total, count) = calculate_totals(vec![present.clone(), vanished]);
        assert_eq!(count, 1);
        assert_eq!(total, 10);
        assert_eq!(entries[0].path, present);
    }
}
