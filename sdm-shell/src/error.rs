// SPDX-License-Identifier: GPL-3.0-only

use std::time::Duration;

use sdm_contracts::{StorageError, StorageErrorKind};
use sdm_types::ShellMode;
use thiserror::Error;

/// Error types for shell sessions
///
/// Cloneable so a single failed open can be handed to every waiter.
#[derive(Error, Debug, Clone)]
pub enum ShellError {
    #[error("failed to spawn {program}: {message}")]
    Spawn { program: String, message: String },

    #[error("shell session closed")]
    Closed,

    #[error("shell transport failed: {0}")]
    Transport(String),

    #[error("shell scope cancelled")]
    Cancelled,

    #[error("command timed out after {0:?}")]
    Timeout(Duration),

    #[error("{mode} shell unavailable: {reason}")]
    Unavailable { mode: ShellMode, reason: String },

    #[error("{mode} shell failed: {source}")]
    Backend {
        mode: ShellMode,
        #[source]
        source: Box<ShellError>,
    },
}

impl ShellError {
    pub fn transport(error: std::io::Error) -> Self {
        Self::Transport(error.to_string())
    }

    pub fn unavailable(mode: ShellMode, reason: impl Into<String>) -> Self {
        Self::Unavailable {
            mode,
            reason: reason.into(),
        }
    }

    /// Innermost error, skipping `Backend` wrappers
    pub fn root_cause(&self) -> &ShellError {
        match self {
            Self::Backend { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

impl From<ShellError> for StorageError {
    fn from(error: ShellError) -> Self {
        let kind = match error.root_cause() {
            ShellError::Unavailable { .. } => StorageErrorKind::Unsupported,
            ShellError::Cancelled => StorageErrorKind::Cancelled,
            ShellError::Timeout(_) => StorageErrorKind::Timeout,
            ShellError::Closed | ShellError::Transport(_) | ShellError::Spawn { .. } => {
                StorageErrorKind::Unavailable
            }
            ShellError::Backend { .. } => StorageErrorKind::Internal,
        };
        StorageError::new(kind, error.to_string())
    }
}

/// Result type alias for shell operations
pub type Result<T> = std::result::Result<T, ShellError>;
