// SPDX-License-Identifier: GPL-3.0-only

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use sdm_types::{AreaType, LocalPath, PkgId};

use crate::StorageError;

/// A path a filter marked as expendable
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ExpendableMatch {
    pub identifier: String,
    pub path: LocalPath,
}

impl ExpendableMatch {
    pub fn new(identifier: impl Into<String>, path: LocalPath) -> Self {
        Self {
            identifier: identifier.into(),
            path,
        }
    }
}

/// Outcome of [`ExpendablesFilter::process`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessResult {
    pub success: Vec<ExpendableMatch>,
    pub failed: Vec<(ExpendableMatch, StorageError)>,
}

#[async_trait]
pub trait ExpendablesFilter: Send + Sync {
    fn identifier(&self) -> &'static str;

    /// Loads sieves; must be called before [`Self::is_expendable`]
    async fn initialize(&self) -> Result<(), StorageError>;

    async fn is_expendable(
        &self,
        pkg_id: &PkgId,
        target: &LocalPath,
        area_type: AreaType,
        segments: &[String],
    ) -> Result<bool, StorageError>;

    async fn process(
        &self,
        targets: &[ExpendableMatch],
        all_matches: &[ExpendableMatch],
    ) -> Result<ProcessResult, StorageError>;
}
