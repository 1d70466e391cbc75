//! Pre-flight validation: utility-mode gate, source/destination checks, and
//! free-space margin (C8).
//!
//! Error message strings are grounded on `validation.py`'s `ErrorMessages`
//! and `PathValidator`/`DriveValidator`, and on
//! `transfer_components.py::TransferValidator` for check order.

use std::fs;
use std::path::Path;

use crate::capability::Storage;
use crate::error::TransferError;
use crate::model::{SystemState, SPACE_SAFETY_MARGIN};

/// Refuses if the state machine is in Utility mode.
pub fn validate_not_utility(state: SystemState) -> Result<(), TransferError> {
    if state == SystemState::Utility {
        return Err(TransferError::InUtilityMode);
    }
    Ok(())
}

/// Source must exist, be a directory, be mounted, and be readable.
pub fn validate_source(source: &Path, storage: &dyn Storage) -> Result<(), TransferError> {
    if !source.exists() {
        return Err(TransferError::InvalidSource {
            path: source.to_path_buf(),
            reason: "path does not exist".to_string(),
        });
    }
    if !source.is_dir() {
        return Err(TransferError::InvalidSource {
            path: source.to_path_buf(),
            reason: "not a directory".to_string(),
        });
    }
    if !storage.is_mounted(source) {
        return Err(TransferError::InvalidSource {
            path: source.to_path_buf(),
            reason: "not mounted".to_string(),
        });
    }
    fs::read_dir(source).map_err(|_| TransferError::InvalidSource {
        path: source.to_path_buf(),
        reason: "not readable".to_string(),
    })?;
    Ok(())
}

/// Destination, if present, must be a writable directory. If absent, its
/// parent must exist and be writable, and the destination is created
/// (parents included).
pub fn validate_destination(destination: &Path) -> Result<(), TransferError> {
    if destination.exists() {
        if !destination.is_dir() {
            return Err(TransferError::InvalidDestination {
                path: destination.to_path_buf(),
                reason: "not a directory".to_string(),
            });
        }
        if fs::metadata(destination)
            .map(|m| m.permissions().readonly())
            .unwrap_or(true)
        {
            return Err(TransferError::InvalidDestination {
                path: destination.to_path_buf(),
                reason: "not writable".to_string(),
            });
        }
        return Ok(());
    }

    match destination.parent() {
        Some(parent) if parent.as_os_str().is_empty() || parent.exists() => {}
        _ => {
            return Err(TransferError::InvalidDestination {
                path: destination.to_path_buf(),
                reason: "parent directory missing".to_string(),
            })
        }
    }

    fs::create_dir_all(destination).map_err(|e| TransferError::InvalidDestination {
        path: destination.to_path_buf(),
        reason: e.to_string(),
    })
}

/// `storage.volume_info(destination).free >= 1.05 * required_bytes`. Goes
/// through `Storage` rather than querying the filesystem directly, so a
/// host's volume-info implementation is the single source of truth for free
/// space (and so tests can simulate a full disk without needing one).
pub fn check_space(
    destination: &Path,
    required_bytes: u64,
    storage: &dyn Storage,
) -> Result<(), TransferError> {
    let free = storage.volume_info(destination)?.free;
    let required_with_margin = (required_bytes as f64 * SPACE_SAFETY_MARGIN).ceil() as u64;
    if free < required_with_margin {
        return Err(TransferError::NotEnoughSpace {
            required: required_with_margin,
            available: free,
        });
    }
    Ok(())
}

/// Runs the non-space pre-flight checks (utility gate, source, destination).
/// Space is checked separately once the required byte count is known.
pub fn validate(
    source: &Path,
    destination: &Path,
    state: SystemState,
    storage: &dyn Storage,
) -> Result<(), TransferError> {
    validate_not_utility(state)?;
    validate_source(source, storage)?;
    validate_destination(destination)?;
    Ok(())
}
