// SPDX-License-Identifier: GPL-3.0-only

use async_trait::async_trait;

use sdm_types::{AreaInfo, AreaType, CsiResult, LocalPath};

use crate::StorageError;

/// Area-family specific forensics: maps paths onto areas and attributes owners
#[async_trait]
pub trait CsiProcessor: Send + Sync {
    fn name(&self) -> &'static str;

    fn has_jurisdiction(&self, area_type: AreaType) -> bool;

    async fn identify_area(&self, target: &LocalPath) -> Result<Option<AreaInfo>, StorageError>;

    async fn find_owners(&self, area_info: &AreaInfo) -> Result<CsiResult, StorageError>;
}

/// Additional ownership heuristic run after area identification
#[async_trait]
pub trait CsiSubProcessor: Send + Sync {
    fn name(&self) -> &'static str;

    fn has_jurisdiction(&self, _area_type: AreaType) -> bool {
        true
    }

    async fn process(&self, area_info: &AreaInfo) -> Result<CsiResult, StorageError>;
}
