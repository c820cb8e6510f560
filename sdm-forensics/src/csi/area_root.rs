// SPDX-License-Identifier: GPL-3.0-only

use std::sync::Arc;

use async_trait::async_trait;
use sdm_contracts::{CsiProcessor, StorageError};
use sdm_types::{AreaInfo, AreaType, CsiResult, LocalPath};

use crate::areas::StorageAreaManager;
use crate::error::ForensicsError;

const AREA_TYPES: [AreaType; 11] = [
    AreaType::Data,
    AreaType::DataSystem,
    AreaType::DataSystemCe,
    AreaType::DataSystemDe,
    AreaType::DataSdext2,
    AreaType::DataVendor,
    AreaType::DataMisc,
    AreaType::DownloadCache,
    AreaType::System,
    AreaType::Oem,
    AreaType::Portable,
];

/// Areas without a package layout of their own
///
/// Paths are attributed to the area whose root contains them unless a deeper
/// area (of any type) sits in between. Ownership is left to the sub-processors.
pub struct AreaRootCsi {
    areas: Arc<StorageAreaManager>,
}

impl AreaRootCsi {
    pub fn new(areas: Arc<StorageAreaManager>) -> Self {
        Self { areas }
    }
}

#[async_trait]
impl CsiProcessor for AreaRootCsi {
    fn name(&self) -> &'static str {
        "area-root"
    }

    fn has_jurisdiction(&self, area_type: AreaType) -> bool {
        AREA_TYPES.contains(&area_type)
    }

    async fn identify_area(&self, target: &LocalPath) -> Result<Option<AreaInfo>, StorageError> {
        let snapshot = self.areas.snapshot().await;
        let Some(area) = snapshot
            .areas
            .iter()
            .filter(|area| self.has_jurisdiction(area.area_type))
            .filter(|area| area.path.is_ancestor_of(target))
            .max_by_key(|area| area.path.depth())
        else {
            return Ok(None);
        };

        let nested = snapshot.areas.iter().any(|other| {
            other.path.depth() > area.path.depth() && other.path.is_ancestor_of(target)
        });
        if nested {
            return Ok(None);
        }

        Ok(Some(AreaInfo {
            data_area: area.clone(),
            file: target.clone(),
            prefix: area.path.clone(),
            is_blacklist_location: !area.area_type.is_public(),
        }))
    }

    async fn find_owners(&self, area_info: &AreaInfo) -> Result<CsiResult, StorageError> {
        if !self.has_jurisdiction(area_info.area_type()) {
            return Err(ForensicsError::WrongJurisdiction {
                processor: self.name(),
                area_type: area_info.area_type(),
            }
            .into());
        }
        Ok(CsiResult::default())
    }
}
