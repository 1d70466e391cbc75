//! Streaming XXH64 computation and verification (C1).
//!
//! Matches `xxhash`'s output byte-for-byte so manifests stay compatible with
//! ones written by the original tool: same algorithm, 32 MiB read chunks.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use xxhash_rust::xxh64::Xxh64;

use crate::error::TransferError;

/// Bytes read per chunk while hashing or copying a file.
pub const CHUNK_SIZE_BYTES: usize = 32 * 1024 * 1024;

const XXH64_SEED: u64 = 0;

/// A fresh streaming hasher.
pub struct Hasher(Xxh64);

pub fn hash_new() -> Hasher {
    Hasher(Xxh64::new(XXH64_SEED))
}

pub fn update(hasher: &mut Hasher, bytes: &[u8]) {
    hasher.0.update(bytes);
}

/// 16 lowercase hex digits.
pub fn finalize(hasher: Hasher) -> String {
    format!("{:016x}", hasher.0.digest())
}

/// Reads `path` in 32 MiB chunks, invoking `progress_cb(bytes_read,
/// total_bytes)` after each chunk, and returns the hex digest.
pub fn hash_file(
    path: &Path,
    mut progress_cb: impl FnMut(u64, u64),
) -> Result<String, TransferError> {
    let file = File::open(path).map_err(|e| TransferError::io(path, e))?;
    let total_bytes = file
        .metadata()
        .map_err(|e| TransferError::io(path, e))?
        .len();

    let mut reader = std::io::BufReader::with_capacity(CHUNK_SIZE_BYTES, file);
    let mut hasher = hash_new();
    let mut buf = vec![0u8; CHUNK_SIZE_BYTES];
    let mut bytes_read = 0u64;

    loop {
        let n = reader
            .read(&mut buf)
            .map_err(|e| TransferError::io(path, e))?;
        if n == 0 {
            break;
        }
        update(&mut hasher, &buf[..n]);
        bytes_read += n as u64;
        progress_cb(bytes_read, total_bytes);
    }

    let hex = finalize(hasher);
    tracing::debug!(path = %path.display(), checksum = %hex, "checksum calculated");
    Ok(hex)
}

/// Computes the digest of `path` and compares it case-insensitively against
/// `expected_hex`. Reads the whole file even on an early mismatching byte so
/// the caller gets size-consistent statistics.
pub fn verify_file(
    path: &Path,
    expected_hex: &str,
    progress_cb: impl FnMut(u64, u64),
) -> Result<bool, TransferError> {
    let actual = hash_file(path, progress_cb)?;
    let matches = actual.eq_ignore_ascii_case(expected_hex);
    if !matches {
        tracing::warn!(
            path = %path.display(),
            expected = %expected_hex,
            actual = %actual,
            "checksum mismatch"
        );
    }
    Ok(matches)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn hash_file_matches_incremental_hash() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.bin");
        let mut f = File::create(&path).unwrap();
        f.write_all(&vec![0x41u8; 70_000]).unwrap();
        drop(f);

        let via_file = hash_file(&path, |_, _| {}).unwrap();

        let mut h = hash_new();
        update(&mut h, &vec![0x41u8; 70_000]);
        let via_incremental = finalize(h);

        assert_eq!(via_file, via_incremental);
        assert_eq!(via_file.len(), 16);
    }

    #[test]
    fn verify_file_accepts_case_insensitive_match() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("b.bin");
        std::fs::write(&path, b"hello world").unwrap();
        let hex = hash_file(&path, |_, _| {}).unwrap();
        assert!(verify_file(&path, &hex.to_uppercase(), |_, _| {}).unwrap());
    }

    #[test]
    fn verify_file_rejects_mismatch_without_erroring() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("c.bin");
        std::fs::write(&path, b"hello world").unwrap();
        assert!(!verify_file(&path, "0000000000000000", |_, _| {}).unwrap());
    }

    #[test]
    fn hash_file_missing_path_is_io_error() {
        let err = hash_file(Path::new("/nonexistent/x"), |_, _| {}).unwrap_err();
        assert!(matches!(err, TransferError::IoError { .. }));
    }
}
