//! Append-only, human-readable transfer log (C4).
//!
//! Field set, ordering, and formatting match the original tool's log
//! exactly so existing tooling that greps these files keeps working.

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Local};

use crate::error::TransferError;
use crate::model::FileTask;

/// One completed transfer's totals, written by `complete_transfer`.
#[derive(Debug, Clone, Default)]
pub struct TransferSummary {
    pub duration_secs: f64,
    pub files_transferred: usize,
    pub total_files: usize,
    pub total_bytes_transferred: u64,
    pub total_retries: u32,
    pub skipped_files: usize,
    pub failures_by_kind: BTreeMap<String, usize>,
}

/// An open transfer log file.
pub struct TransferLogger {
    file: File,
    path: PathBuf,
}

fn now_stamp() -> String {
    Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

fn format_bytes_gb(bytes: u64) -> String {
    format!("{:.2} GB", bytes as f64 / 1_000_000_000.0)
}

fn format_bytes_mb(bytes: u64) -> String {
    format!("{:.2} MB", bytes as f64 / 1_000_000.0)
}

fn format_hms(total_secs: f64) -> String {
    let total = total_secs.max(0.0) as u64;
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;
    format!("{hours}:{minutes:02}:{seconds:02}")
}

fn format_mtime(t: SystemTime) -> String {
    let dt: DateTime<Local> = t.into();
    dt.format("%Y-%m-%d %H:%M:%S").to_string()
}

#[cfg(unix)]
fn permission_string(path: &Path) -> String {
    use std::os::unix::fs::PermissionsExt;
    match std::fs::metadata(path) {
        Ok(meta) => {
            let mode = meta.permissions().mode();
            let bit = |shift: u32, ch: char| if mode & (1 << shift) != 0 { ch } else { '-' };
            format!(
                "-{}{}{}{}{}{}{}{}{}",
                bit(8, 'r'),
                bit(7, 'w'),
                bit(6, 'x'),
                bit(5, 'r'),
                bit(4, 'w'),
                bit(3, 'x'),
                bit(2, 'r'),
                bit(1, 'w'),
                bit(0, 'x'),
            )
        }
        Err(_) => "-?????????".to_string(),
    }
}

#[cfg(not(unix))]
fn permission_string(_path: &Path) -> String {
    "-?????????".to_string()
}

impl TransferLogger {
    /// Opens (creating) a log file at `path` for appending.
    pub fn open(path: &Path) -> Result<TransferLogger, TransferError> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| TransferError::io(path, e))?;
        Ok(TransferLogger {
            file,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes the session header.
    pub fn start_transfer(
        &mut self,
        source: &Path,
        destination: &Path,
        files_to_transfer: usize,
        total_size_bytes: u64,
    ) -> Result<(), TransferError> {
        writeln!(self.file, "Transfer started at {}", now_stamp())
            .and_then(|_| writeln!(self.file, "Source: {}", source.display()))
            .and_then(|_| writeln!(self.file, "Destination: {}", destination.display()))
            .and_then(|_| writeln!(self.file, "Files to transfer: {files_to_transfer}"))
            .and_then(|_| {
                writeln!(
                    self.file,
                    "Total size: {}",
                    format_bytes_gb(total_size_bytes)
                )
            })
            .and_then(|_| writeln!(self.file))
            .and_then(|_| self.file.flush())
            .map_err(|e| TransferError::io(&self.path, e))
    }

    /// Records a successful file transfer.
    #[allow(clippy::too_many_arguments)]
    pub fn log_success(
        &mut self,
        task: &FileTask,
        duration_secs: f64,
        src_xxhash: &str,
        dst_xxhash: &str,
        retries: u32,
    ) -> Result<(), TransferError> {
        let ext = task
            .source_path
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default();
        let dst_mtime = std::fs::metadata(&task.destination_path)
            .and_then(|m| m.modified())
            .unwrap_or(task.modification_time);

        writeln!(
            self.file,
            "[{}] Success: {} -> {}",
            now_stamp(),
            task.source_path.display(),
            task.destination_path.display()
        )
        .and_then(|_| writeln!(self.file, "    size: {}", format_bytes_mb(task.size_bytes)))
        .and_then(|_| writeln!(self.file, "    duration: {duration_secs:.2}s"))
        .and_then(|_| writeln!(self.file, "    src_xxhash: {src_xxhash}"))
        .and_then(|_| writeln!(self.file, "    dst_xxhash: {dst_xxhash}"))
        .and_then(|_| writeln!(self.file, "    retries: {retries}"))
        .and_then(|_| writeln!(self.file, "    ext: {ext}"))
        .and_then(|_| {
            writeln!(
                self.file,
                "    src_mtime: {}",
                format_mtime(task.modification_time)
            )
        })
        .and_then(|_| writeln!(self.file, "    dst_mtime: {}", format_mtime(dst_mtime)))
        .and_then(|_| {
            writeln!(
                self.file,
                "    src_perm: {}",
                permission_string(&task.source_path)
            )
        })
        .and_then(|_| {
            writeln!(
                self.file,
                "    dst_perm: {}",
                permission_string(&task.destination_path)
            )
        })
        .and_then(|_| writeln!(self.file))
        .and_then(|_| self.file.flush())
        .map_err(|e| TransferError::io(&self.path, e))
    }

    /// Records a failed file transfer.
    pub fn log_failure(&mut self, task: &FileTask, reason: &str) -> Result<(), TransferError> {
        writeln!(
            self.file,
            "[{}] Failed: {} -> {}",
            now_stamp(),
            task.source_path.display(),
            task.destination_path.display()
        )
        .and_then(|_| writeln!(self.file, "    size: {}", format_bytes_mb(task.size_bytes)))
        .and_then(|_| writeln!(self.file, "    error: {reason}"))
        .and_then(|_| writeln!(self.file))
        .and_then(|_| self.file.flush())
        .map_err(|e| TransferError::io(&self.path, e))
    }

    /// Writes the final summary. Called unconditionally at the end of a
    /// session, even if the transfer aborted partway through.
    pub fn complete_transfer(&mut self, summary: &TransferSummary) -> Result<(), TransferError> {
        let avg_file_size = if summary.files_transferred > 0 {
            summary.total_bytes_transferred / summary.files_transferred as u64
        } else {
            0
        };
        let avg_speed_mb_s = if summary.duration_secs > 0.0 {
            (summary.total_bytes_transferred as f64 / 1_000_000.0) / summary.duration_secs
        } else {
            0.0
        };

        writeln!(self.file, "Transfer completed at {}", now_stamp())
            .and_then(|_| writeln!(self.file, "Duration: {}", format_hms(summary.duration_secs)))
            .and_then(|_| {
                writeln!(
                    self.file,
                    "Files transferred: {}/{}",
                    summary.files_transferred, summary.total_files
                )
            })
            .and_then(|_| {
                writeln!(
                    self.file,
                    "Total data transferred: {}",
                    format_bytes_gb(summary.total_bytes_transferred)
                )
            })
            .and_then(|_| {
                writeln!(
                    self.file,
                    "Average file size: {}",
                    format_bytes_mb(avg_file_size)
                )
            })
            .and_then(|_| writeln!(self.file, "Average speed: {avg_speed_mb_s:.2} MB/s"))
            .and_then(|_| writeln!(self.file, "Total retries: {}", summary.total_retries))
            .and_then(|_| writeln!(self.file, "Skipped files: {}", summary.skipped_files))
            .map_err(|e| TransferError::io(&self.path, e))?;

        if !summary.failures_by_kind.is_empty() {
            writeln!(self.file, "Failures:").map_err(|e| TransferError::io(&self.path, e))?;
            for (kind, count) in &summary.failures_by_kind {
                writeln!(self.file, "  {kind}: {count}")
                    .map_err(|e| TransferError::io(&self.path, e))?;
            }
        }

        let user = whoami::username();
        writeln!(self.file, "User: {user}")
            .and_then(|_| self.file.flush())
            .map_err(|e| TransferError::io(&self.path, e))
    }
}

/// Builds a timestamped transfer-log filename as the orchestrator expects
/// to find it under the target directory.
pub fn log_file_name(timestamp: &DateTime<Local>) -> String {
    format!("transfer_log_{}.log", timestamp.format("%Y%m%d_%H%M%S"))
}
