// SPDX-License-Identifier: GPL-3.0-only

use sdm_contracts::{StorageError, StorageErrorKind};
use sdm_types::AreaType;
use thiserror::Error;

/// Error types for forensics, clutter and sieve operations
#[derive(Error, Debug)]
pub enum ForensicsError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Invalid marker group #{index}: {reason}")]
    InvalidMarker { index: usize, reason: String },

    #[error("Invalid sieve: {0}")]
    InvalidSieve(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid pattern: {0}")]
    Regex(#[from] regex::Error),

    #[error("{processor} has no jurisdiction over {area_type}")]
    WrongJurisdiction {
        processor: &'static str,
        area_type: AreaType,
    },

    #[error("No processor has jurisdiction over {0}")]
    NoJurisdiction(AreaType),
}

impl ForensicsError {
    pub fn invalid_sieve(reason: impl Into<String>) -> Self {
        Self::InvalidSieve(reason.into())
    }
}

impl From<ForensicsError> for StorageError {
    fn from(error: ForensicsError) -> Self {
        match error {
            ForensicsError::Storage(e) => e,
            ForensicsError::WrongJurisdiction { .. } => {
                StorageError::new(StorageErrorKind::InvalidInput, error.to_string())
            }
            ForensicsError::NoJurisdiction(_) => StorageError::unsupported(error.to_string()),
            ForensicsError::InvalidMarker { .. }
            | ForensicsError::InvalidSieve(_)
            | ForensicsError::Json(_)
            | ForensicsError::Regex(_) => StorageError::internal(error.to_string()),
        }
    }
}

/// Result type alias for forensics operations
pub type Result<T> = std::result::Result<T, ForensicsError>;
