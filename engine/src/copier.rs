//! Atomic per-file copy with optional in-line hashing (C2).
//!
//! Grounded on `.TBPART` staging: the staging file always lives next to
//! `dst` so the final rename is on the same filesystem and therefore atomic.

use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use crate::checksum::{self, Hasher};
use crate::error::TransferError;

/// Suffix applied to a staging file while a copy is in progress.
pub const STAGING_SUFFIX: &str = ".TBPART";

/// Outcome of a successful copy.
pub struct CopyOutcome {
    pub hex: Option<String>,
}

fn staging_path(dst: &Path) -> PathBuf {
    let mut name = dst.as_os_str().to_owned();
    name.push(STAGING_SUFFIX);
    PathBuf::from(name)
}

/// Copies `src` to `dst` atomically via a `.TBPART` staging file,
/// optionally computing the XXH64 digest during the copy.
///
/// `progress_cb(bytes_transferred, total_size)` is invoked after each chunk.
/// `stop_flag` is polled between chunks; if set, the staging file is removed
/// and `TransferError::Stopped` is returned. The source's modification time
/// is preserved on the staging file before the final rename; richer
/// platform metadata is the host's responsibility via `Storage::apply_metadata`.
pub fn copy_file_with_hash(
    src: &Path,
    dst: &Path,
    buffer_size_bytes: usize,
    chunk_size_bytes: usize,
    compute_hash: bool,
    stop_flag: &AtomicBool,
    mut progress_cb: impl FnMut(u64, u64),
) -> Result<CopyOutcome, TransferError> {
    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent).map_err(|e| TransferError::io(parent, e))?;
    }

    let staging = staging_path(dst);
    let result = copy_inner(
        src,
        dst,
        &staging,
        buffer_size_bytes,
        chunk_size_bytes,
        compute_hash,
        stop_flag,
        &mut progress_cb,
    );

    if result.is_err() {
        let _ = fs::remove_file(&staging);
    }
    result
}

#[allow(clippy::too_many_arguments)]
fn copy_inner(
    src: &Path,
    dst: &Path,
    staging: &Path,
    buffer_size_bytes: usize,
    chunk_size_bytes: usize,
    compute_hash: bool,
    stop_flag: &AtomicBool,
    progress_cb: &mut impl FnMut(u64, u64),
) -> Result<CopyOutcome, TransferError> {
    let src_file = File::open(src).map_err(|e| TransferError::io(src, e))?;
    let total_size = src_file
        .metadata()
        .map_err(|e| TransferError::io(src, e))?
        .len();
    let mut reader = BufReader::with_capacity(buffer_size_bytes.max(1), src_file);

    let staging_file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(staging)
        .map_err(|e| TransferError::io(staging, e))?;
    let mut writer = BufWriter::with_capacity(buffer_size_bytes.max(1), staging_file);

    let mut hasher: Option<Hasher> = if compute_hash {
        Some(checksum::hash_new())
    } else {
        None
    };

    let mut buf = vec![0u8; chunk_size_bytes.max(1)];
    let mut bytes_transferred = 0u64;

    loop {
        if stop_flag.load(Ordering::SeqCst) {
            return Err(TransferError::Stopped);
        }
        let n = reader
            .read(&mut buf)
            .map_err(|e| TransferError::io(src, e))?;
        if n == 0 {
            break;
        }
        writer
            .write_all(&buf[..n])
            .map_err(|e| TransferError::io(staging, e))?;
        if let Some(h) = hasher.as_mut() {
            checksum::update(h, &buf[..n]);
        }
        bytes_transferred += n as u64;
        progress_cb(bytes_transferred, total_size);
    }

    writer.flush().map_err(|e| TransferError::io(staging, e))?;
    drop(writer);

    let src_metadata = fs::metadata(src).map_err(|e| TransferError::io(src, e))?;
    if let Ok(mtime) = src_metadata.modified() {
        let ft = filetime::FileTime::from_system_time(mtime);
        let _ = filetime::set_file_mtime(staging, ft);
    }

    if dst.exists() {
        fs::remove_file(dst).map_err(|e| TransferError::io(dst, e))?;
    }
    fs::rename(staging, dst).map_err(|e| TransferError::io(dst, e))?;

    let hex = hasher.map(checksum::finalize);
    Ok(CopyOutcome { hex })
}

/// Recursively removes `*.TBPART` files left behind by an interrupted
/// transfer.
pub fn cleanup_temp_files(root: &Path) -> Result<usize, TransferError> {
    let mut removed = 0;
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(_) => continue,
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
            } else if path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.ends_with(STAGING_SUFFIX))
            {
                if fs::remove_file(&path).is_ok() {
                    removed += 1;
                }
            }
        }
    }
    Ok(removed)
}
