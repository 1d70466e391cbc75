//! Collaborator contracts the engine consumes but does not implement.
//!
//! The orchestrator is generic over these traits rather than constructing
//! concrete display/storage objects itself, so a host (CLI, GUI, test
//! harness) supplies its own implementation without the engine caring which.

use std::collections::HashMap;
use std::path::Path;
use std::time::SystemTime;

use crate::error::TransferError;
use crate::model::TransferProgress;

/// A value recoverable from platform metadata (permission bits, timestamps,
/// extended attributes, ACLs). Deliberately a tagged union rather than one
/// concrete type, since the set of attributes is platform-variant.
#[derive(Debug, Clone, PartialEq)]
pub enum MetadataValue {
    Bytes(Vec<u8>),
    Integer(i64),
    Timestamp(SystemTime),
    Blob(Vec<u8>),
}

/// Best-effort, platform-variant file metadata.
pub type Metadata = HashMap<String, MetadataValue>;

/// Pushed to by the Progress Tracker. Implementations must not block the
/// transfer thread; a sink backed by another thread should queue and
/// coalesce rather than apply back-pressure.
pub trait DisplaySink: Send {
    fn show_status(&self, message: &str, line: u32);
    fn show_progress(&self, snapshot: &TransferProgress);
    fn show_error(&self, message: &str);
    fn clear(&self, preserve_errors: bool);
}

/// Abstracts the host platform: volume discovery, mount checks, and
/// best-effort metadata read/apply. The orchestrator never touches the
/// filesystem or OS volume APIs directly except through this trait.
pub trait Storage: Send {
    fn available_volumes(&self) -> Vec<std::path::PathBuf>;
    fn volume_info(&self, path: &Path) -> Result<VolumeInfo, TransferError>;
    fn is_mounted(&self, path: &Path) -> bool;
    fn wait_for_new_volume(&self, initial: &[std::path::PathBuf]) -> std::path::PathBuf;
    fn wait_for_removal(&self, path: &Path);
    fn unmount(&self, path: &Path) -> bool;
    fn read_metadata(&self, path: &Path) -> Metadata;
    fn apply_metadata(&self, path: &Path, metadata: &Metadata) -> bool;
}

/// Bytes used, free, and total capacity of a volume, in bytes.
#[derive(Debug, Clone, Copy)]
pub struct VolumeInfo {
    pub total: u64,
    pub used: u64,
    pub free: u64,
}
