//! Destination directory and per-file destination path computation (C6).
//!
//! Grounded on `directory_handler.py`'s `create_organized_directory` and
//! `_sanitize_name` for the date/device folder composition and the exact
//! sanitization rule, and on spec §4.6 for per-file renaming.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Local};

use crate::error::TransferError;
use crate::model::Config;

const INVALID_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Strips filesystem-hostile characters, replaces spaces with `_`, and
/// falls back to `"unnamed_device"` if the result is empty.
pub fn sanitize(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter(|c| !INVALID_CHARS.contains(c))
        .map(|c| if c == ' ' { '_' } else { c })
        .collect();
    if cleaned.is_empty() {
        "unnamed_device".to_string()
    } else {
        cleaned
    }
}

fn device_name(source_root: &Path) -> String {
    let base = source_root
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    sanitize(&base)
}

/// Composes and creates the destination root for one session: optional
/// date folder, then optional device folder, under `destination_root`.
pub fn create_target_dir(
    destination_root: &Path,
    source_root: &Path,
    timestamp: DateTime<Local>,
    config: &Config,
) -> Result<PathBuf, TransferError> {
    let mut base = destination_root.to_path_buf();
    if config.create_date_folders {
        base = base.join(timestamp.format(&config.date_folder_format).to_string());
    }
    if config.create_device_folders {
        let device = device_name(source_root);
        let rendered = config.device_folder_template.replace("{device_name}", &device);
        base = base.join(rendered);
    }
    fs::create_dir_all(&base).map_err(|e| TransferError::io(&base, e))?;
    Ok(base)
}

/// Estimates a file's "creation time" as the earliest of its mtime, birth
/// time, and access time — an approximation where the platform lacks a
/// true creation time.
pub fn estimate_creation_time(metadata: &fs::Metadata) -> SystemTime {
    let modified = metadata.modified().ok();
    let created = metadata.created().ok();
    let accessed = metadata.accessed().ok();
    [modified, created, accessed]
        .into_iter()
        .flatten()
        .min()
        .unwrap_or_else(SystemTime::now)
}

/// Computes the destination path for `source_path`, given the session's
/// target directory and the source root it was enumerated under.
pub fn destination_path_for(
    source_path: &Path,
    source_root: &Path,
    target_dir: &Path,
    config: &Config,
    creation_time_estimate: SystemTime,
) -> PathBuf {
    let rel_dir = if config.preserve_folder_structure {
        source_path
            .parent()
            .and_then(|p| p.strip_prefix(source_root).ok())
            .map(|p| p.to_path_buf())
            .unwrap_or_default()
    } else {
        PathBuf::new()
    };

    let extension = source_path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    let stem = source_path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();

    let filename = if config.rename_with_timestamp {
        let dt: DateTime<Local> = creation_time_estimate.into();
        let ts = dt.format(&config.timestamp_format).to_string();
        let base = if config.preserve_original_filename {
            config
                .filename_template
                .replace("{original}", &stem)
                .replace("{timestamp}", &ts)
        } else {
            ts
        };
        format!("{base}{extension}")
    } else {
        source_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default()
    };

    target_dir.join(rel_dir).join(filename)
}
