// SPDX-License-Identifier: GPL-3.0-only

use std::sync::Arc;

use async_trait::async_trait;
use sdm_contracts::{CsiProcessor, PkgRepo, PlatformCapabilities, StorageError};
use sdm_types::{AreaInfo, AreaType, CsiResult, LocalPath};

use super::owners::DirNameOwners;
use crate::areas::StorageAreaManager;
use crate::clutter::ClutterRepo;
use crate::error::ForensicsError;

const DEFAULT_DIR: &str = "data";

/// `PRIVATE_DATA`: per-app private directories
pub struct PrivateDataCsi {
    areas: Arc<StorageAreaManager>,
    platform: Arc<dyn PlatformCapabilities>,
    owners: DirNameOwners,
}

impl PrivateDataCsi {
    pub fn new(
        areas: Arc<StorageAreaManager>,
        platform: Arc<dyn PlatformCapabilities>,
        pkg_repo: Arc<dyn PkgRepo>,
        clutter: Arc<ClutterRepo>,
    ) -> Self {
        Self {
            areas,
            platform,
            owners: DirNameOwners {
                pkg_repo,
                clutter,
                lge_themes: true,
            },
        }
    }
}

#[async_trait]
impl CsiProcessor for PrivateDataCsi {
    fn name(&self) -> &'static str {
        "private-data"
    }

    fn has_jurisdiction(&self, area_type: AreaType) -> bool {
        area_type == AreaType::PrivateData
    }

    async fn identify_area(&self, target: &LocalPath) -> Result<Option<AreaInfo>, StorageError> {
        let current_user = self.platform.current_user();
        let mut user_area = None;

        for area in self.areas.snapshot().await.of_type(AreaType::PrivateData) {
            if area.user_handle == current_user {
                user_area = Some(area.clone());
            }
            if area.path.is_ancestor_of(target) {
                return Ok(Some(AreaInfo {
                    data_area: area.clone(),
                    file: target.clone(),
                    prefix: area.path.clone(),
                    is_blacklist_location: true,
                }));
            }
        }

        // `/data/data` stays reachable even when the areas point at the mirror
        let Some(user_area) = user_area else {
            return Ok(None);
        };
        let default_dir = self.platform.data_dir().child(DEFAULT_DIR);
        if !default_dir.is_ancestor_of(target) {
            return Ok(None);
        }
        Ok(Some(AreaInfo {
            data_area: user_area,
            file: target.clone(),
            prefix: default_dir,
            is_blacklist_location: true,
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
        self.owners
            .find(area_info, Some(area_info.user_handle()))
            .await
    }
}
