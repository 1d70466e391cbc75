//! Error taxonomy for the transfer engine.
//!
//! `TransferError` is the single sum type every fallible engine operation
//! returns. Its variants mirror the error taxonomy table in the
//! specification: each carries the paths involved and a short,
//! display-friendly message suitable for constrained surfaces (LCDs).
//!
//! A checksum mismatch and a per-file I/O failure are *not* escalated to a
//! session-ending error by the orchestrator — those are recorded against
//! the individual file and the transfer continues. `TransferError` is also
//! used as the per-file error payload in those cases, but only the
//! orchestrator decides whether a given variant aborts the session.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors arising during validation, orchestration, or per-file processing.
#[derive(Debug, Error)]
pub enum TransferError {
    #[error("Invalid source: {path}: {reason}")]
    InvalidSource { path: PathBuf, reason: String },

    #[error("Invalid destination: {path}: {reason}")]
    InvalidDestination { path: PathBuf, reason: String },

    #[error("Not enough space: need {required} bytes, have {available} available")]
    NotEnoughSpace { required: u64, available: u64 },

    #[error("Source removed: {path}")]
    SourceRemoved { path: PathBuf },

    #[error("I/O error on {path}: {source}")]
    IoError { path: PathBuf, source: io::Error },

    #[error("Checksum mismatch for {path}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    #[error("Manifest error: {message}")]
    ManifestError { message: String },

    #[error("In utility mode")]
    InUtilityMode,

    #[error("Invalid state transition: {current:?} -> {target:?}")]
    InvalidTransition {
        current: crate::model::SystemState,
        target: crate::model::SystemState,
    },

    #[error("Stopped by request")]
    Stopped,
}

impl TransferError {
    /// Extract the OS error code backing this error, if any.
    pub fn raw_os_error(&self) -> Option<i32> {
        match self {
            Self::IoError { source, .. } => source.raw_os_error(),
            _ => None,
        }
    }

    /// Short, display-friendly label per the taxonomy table (kept under
    /// ~28 characters for LCD-class surfaces).
    pub fn display_label(&self) -> &'static str {
        match self {
            Self::InvalidSource { .. } => "Invalid source",
            Self::InvalidDestination { .. } => "Invalid destination",
            Self::NotEnoughSpace { .. } => "Not enough space",
            Self::SourceRemoved { .. } => "Source removed",
            Self::IoError { .. } => "I/O error",
            Self::ChecksumMismatch { .. } => "Checksum mismatch",
            Self::ManifestError { .. } => "Manifest error",
            Self::InUtilityMode => "In utility mode",
            Self::InvalidTransition { .. } => "Invalid transition",
            Self::Stopped => "Stopped",
        }
    }

    /// Whether the taxonomy marks this kind recoverable (retry after
    /// correcting the condition), as opposed to terminal for the session.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::InvalidSource { .. }
                | Self::InvalidDestination { .. }
                | Self::NotEnoughSpace { .. }
                | Self::InUtilityMode
        )
    }

    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::IoError {
            path: path.into(),
            source,
        }
    }
}
