// SPDX-License-Identifier: GPL-3.0-only

use sdm_contracts::{StorageError, StorageErrorKind};
use thiserror::Error;

/// Error types for system-level operations
#[derive(Error, Debug)]
pub enum SysError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid mountinfo line: {0}")]
    InvalidMountInfoLine(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unexpected output from `{command}`: {output}")]
    UnexpectedOutput { command: String, output: String },

    #[error("Operation failed: {0}")]
    OperationFailed(String),
}

impl From<SysError> for StorageError {
    fn from(error: SysError) -> Self {
        match error {
            SysError::Io(e) => e.into(),
            SysError::PermissionDenied(_) => {
                StorageError::new(StorageErrorKind::PermissionDenied, error.to_string())
            }
            SysError::NotFound(_) => StorageError::not_found(error.to_string()),
            SysError::InvalidMountInfoLine(_)
            | SysError::UnexpectedOutput { .. }
            | SysError::OperationFailed(_) => StorageError::internal(error.to_string()),
        }
    }
}

/// Result type alias for system operations
pub type Result<T> = std::result::Result<T, SysError>;
