// SPDX-License-Identifier: GPL-3.0-only

use std::sync::Arc;

use async_trait::async_trait;
use sdm_contracts::{CsiProcessor, PkgRepo, StorageError};
use sdm_types::{AreaInfo, AreaType, CsiResult, LocalPath};

use super::owners::DirNameOwners;
use crate::areas::StorageAreaManager;
use crate::clutter::ClutterRepo;
use crate::error::ForensicsError;

/// Pre-multi-user location of the primary sdcard
pub const LEGACY_STORAGE: &str = "/storage/emulated/legacy";

/// Subdirectories of `Android/` that are areas of their own
pub const PUBLIC_SUBDIRS: [&str; 3] = ["data", "media", "obb"];

/// `PUBLIC_DATA`, `PUBLIC_MEDIA` and `PUBLIC_OBB`: per-package folders below `Android/<dir>`
pub struct PublicCsi {
    name: &'static str,
    area_type: AreaType,
    dir: &'static str,
    areas: Arc<StorageAreaManager>,
    owners: DirNameOwners,
}

impl PublicCsi {
    fn new(
        name: &'static str,
        area_type: AreaType,
        dir: &'static str,
        areas: Arc<StorageAreaManager>,
        pkg_repo: Arc<dyn PkgRepo>,
        clutter: Arc<ClutterRepo>,
    ) -> Self {
        Self {
            name,
            area_type,
            dir,
            areas,
            owners: DirNameOwners {
                pkg_repo,
                clutter,
                lge_themes: false,
            },
        }
    }

    pub fn data(
        areas: Arc<StorageAreaManager>,
        pkg_repo: Arc<dyn PkgRepo>,
        clutter: Arc<ClutterRepo>,
    ) -> Self {
        Self::new("public-data", AreaType::PublicData, "data", areas, pkg_repo, clutter)
    }

    pub fn media(
        areas: Arc<StorageAreaManager>,
        pkg_repo: Arc<dyn PkgRepo>,
        clutter: Arc<ClutterRepo>,
    ) -> Self {
        Self::new("public-media", AreaType::PublicMedia, "media", areas, pkg_repo, clutter)
    }

    pub fn obb(
        areas: Arc<StorageAreaManager>,
        pkg_repo: Arc<dyn PkgRepo>,
        clutter: Arc<ClutterRepo>,
    ) -> Self {
        Self::new("public-obb", AreaType::PublicObb, "obb", areas, pkg_repo, clutter)
    }
}

#[async_trait]
impl CsiProcessor for PublicCsi {
    fn name(&self) -> &'static str {
        self.name
    }

    fn has_jurisdiction(&self, area_type: AreaType) -> bool {
        area_type == self.area_type
    }

    async fn identify_area(&self, target: &LocalPath) -> Result<Option<AreaInfo>, StorageError> {
        let mut primary = None;
        for area in self.areas.snapshot().await.of_type(self.area_type) {
            if area.is_primary() {
                primary = Some(area.clone());
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

        let Some(primary) = primary else {
            return Ok(None);
        };
        let legacy = LocalPath::build(&LocalPath::new(LEGACY_STORAGE), ["Android", self.dir]);
        if !legacy.is_ancestor_of(target) {
            return Ok(None);
        }
        Ok(Some(AreaInfo {
            data_area: primary,
            file: target.clone(),
            prefix: legacy,
            is_blacklist_location: true,
        }))
    }

    async fn find_owners(&self, area_info: &AreaInfo) -> Result<CsiResult, StorageError> {
        if !self.has_jurisdiction(area_info.area_type()) {
            return Err(ForensicsError::WrongJurisdiction {
                processor: self.name,
                area_type: area_info.area_type(),
            }
            .into());
        }
        // Public storage is shared, any user's install counts
        self.owners.find(area_info, None).await
    }
}
