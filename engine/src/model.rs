//! Core data model for a transfer session.
//!
//! This module defines the plain data shared by every component: the
//! immutable `Config` a session runs under, the `FileTask`s enumeration
//! produces, the `TransferProgress` snapshot the tracker publishes, and the
//! small enums (`Status`, `SystemState`) that gate behavior elsewhere.

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

/// Lower bound for `Config::buffer_size_bytes` (4 KiB).
pub const MIN_BUFFER_SIZE_BYTES: u64 = 4 * 1024;
/// Upper bound for `Config::buffer_size_bytes` (100 MiB).
pub const MAX_BUFFER_SIZE_BYTES: u64 = 100 * 1024 * 1024;
/// Default chunk size used by the copier and checksum engine (32 MiB).
pub const DEFAULT_CHUNK_SIZE_BYTES: u64 = 32 * 1024 * 1024;
/// Safety margin applied to free-space checks (5%), per spec: mandated
/// uniformly across platforms rather than macOS-only as in the source.
pub const SPACE_SAFETY_MARGIN: f64 = 1.05;

/// Configuration for one transfer session. Constructed once, passed by
/// value into the orchestrator, and never mutated during a transfer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub media_only_transfer: bool,
    pub media_extensions: HashSet<String>,

    pub preserve_folder_structure: bool,

    pub rename_with_timestamp: bool,
    pub preserve_original_filename: bool,
    pub filename_template: String,
    pub timestamp_format: String,

    pub create_date_folders: bool,
    pub date_folder_format: String,
    pub create_device_folders: bool,
    pub device_folder_template: String,

    pub verify_transfers: bool,
    pub create_mhl_files: bool,

    pub buffer_size_bytes: u64,
    pub chunk_size_bytes: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            media_only_transfer: false,
            media_extensions: HashSet::new(),
            preserve_folder_structure: true,
            rename_with_timestamp: false,
            preserve_original_filename: true,
            filename_template: "{original}_{timestamp}".to_string(),
            timestamp_format: "%Y%m%d_%H%M%S".to_string(),
            create_date_folders: false,
            date_folder_format: "%Y-%m-%d".to_string(),
            create_device_folders: false,
            device_folder_template: "{device_name}".to_string(),
            verify_transfers: true,
            create_mhl_files: true,
            buffer_size_bytes: 8 * 1024 * 1024,
            chunk_size_bytes: DEFAULT_CHUNK_SIZE_BYTES,
        }
    }
}

impl Config {
    /// Clamp `buffer_size_bytes` into `[MIN_BUFFER_SIZE_BYTES,
    /// MAX_BUFFER_SIZE_BYTES]`, as the specification requires.
    pub fn normalized(mut self) -> Self {
        self.buffer_size_bytes = self
            .buffer_size_bytes
            .clamp(MIN_BUFFER_SIZE_BYTES, MAX_BUFFER_SIZE_BYTES);
        if self.chunk_size_bytes == 0 {
            self.chunk_size_bytes = DEFAULT_CHUNK_SIZE_BYTES;
        }
        self
    }
}

/// One file discovered by enumeration and carried through the pipeline.
#[derive(Debug, Clone)]
pub struct FileTask {
    pub source_path: PathBuf,
    pub destination_path: PathBuf,
    pub size_bytes: u64,
    pub modification_time: SystemTime,
}

/// Transfer status, published as part of every progress snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    Ready,
    Copying,
    Checksumming,
    Verifying,
    Success,
    Error,
    Stopped,
}

/// Observable snapshot of transfer progress, published by the tracker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferProgress {
    pub current_file_name: String,
    pub file_index: usize,
    pub total_files: usize,
    pub bytes_transferred_current: u64,
    pub total_bytes_current: u64,
    pub total_bytes_transferred_session: u64,
    pub total_bytes_session: u64,
    pub current_file_progress: f64,
    pub overall_progress: f64,
    pub status: Status,
    pub speed_bytes_per_sec: f64,
    pub eta_seconds: f64,
    pub total_elapsed_secs: f64,
    pub file_elapsed_secs: f64,
    pub checksum_elapsed_secs: f64,
    pub source_drive_name: String,
}

/// One entry recorded in an ASC-MHL manifest.
#[derive(Debug, Clone)]
pub struct ManifestEntry {
    pub relative_path: PathBuf,
    pub size_bytes: u64,
    pub last_modification_time: SystemTime,
    pub xxh64_hex: String,
    pub hash_date: chrono::DateTime<chrono::Local>,
}

/// The three system states gated by the state machine (C9).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SystemState {
    Standby,
    Transfer,
    Utility,
}

/// Outcome of a single orchestrated transfer run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferOutcome {
    /// All enumerated files succeeded.
    Success,
    /// At least one file failed but the session ran to completion.
    PartialFailure,
    /// Enumeration found nothing to transfer.
    NoFiles,
    /// The user requested a stop mid-transfer.
    Stopped,
}
