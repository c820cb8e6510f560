// SPDX-License-Identifier: GPL-3.0-only

//! `ART_PROFILE` and `DALVIK_PROFILE`: per-package compilation profiles
//!
//! Each package gets a directory named after it, e.g.
//! `/data/misc/profiles/cur/0/<pkg>/primary.prof`.

use std::sync::Arc;

use async_trait::async_trait;
use sdm_contracts::{CsiProcessor, PkgRepo, StorageError};
use sdm_types::{AreaInfo, AreaType, CsiResult, LocalPath, UserHandle};
use tracing::trace;

use super::owners::installed_dir_owner;
use crate::areas::StorageAreaManager;
use crate::error::ForensicsError;

const AREA_TYPES: [AreaType; 2] = [AreaType::ArtProfile, AreaType::DalvikProfile];

pub struct ProfileCsi {
    areas: Arc<StorageAreaManager>,
    pkg_repo: Arc<dyn PkgRepo>,
}

impl ProfileCsi {
    pub fn new(areas: Arc<StorageAreaManager>, pkg_repo: Arc<dyn PkgRepo>) -> Self {
        Self { areas, pkg_repo }
    }
}

#[async_trait]
impl CsiProcessor for ProfileCsi {
    fn name(&self) -> &'static str {
        "profile"
    }

    fn has_jurisdiction(&self, area_type: AreaType) -> bool {
        AREA_TYPES.contains(&area_type)
    }

    async fn identify_area(&self, target: &LocalPath) -> Result<Option<AreaInfo>, StorageError> {
        let snapshot = self.areas.snapshot().await;
        Ok(snapshot
            .areas
            .iter()
            .filter(|area| self.has_jurisdiction(area.area_type))
            .filter(|area| area.path.is_ancestor_of(target))
            .max_by_key(|area| area.path.depth())
            .map(|area| AreaInfo {
                data_area: area.clone(),
                file: target.clone(),
                prefix: area.path.clone(),
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

        // Reference profiles are shared by all users
        let user = Some(area_info.user_handle()).filter(|user| *user != UserHandle::ALL);
        match installed_dir_owner(self.pkg_repo.as_ref(), area_info, user).await? {
            Some(owner) => Ok(CsiResult::new([owner])),
            None => {
                trace!("No installed package named by {}", area_info.file);
                Ok(CsiResult::default())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use sdm_types::{PkgId, StorageArea};

    use super::*;
    use crate::testing::{FakePkgRepo, area, manager_with};

    const PROFILE_ROOTS: [(AreaType, &str, UserHandle); 5] = [
        (AreaType::ArtProfile, "/data/misc/profiles/ref", UserHandle::ALL),
        (AreaType::ArtProfile, "/data/misc/profiles/cur/0", UserHandle::SYSTEM),
        (AreaType::ArtProfile, "/data_mirror/ref_profiles", UserHandle::ALL),
        (AreaType::ArtProfile, "/data_mirror/cur_profiles/0", UserHandle::SYSTEM),
        (AreaType::DalvikProfile, "/data/dalvik-cache/profiles", UserHandle::ALL),
    ];

    fn csi(repo: FakePkgRepo) -> ProfileCsi {
        let areas = PROFILE_ROOTS
            .iter()
            .map(|&(area_type, path, user)| {
                StorageArea::new(area_type, LocalPath::new(path), user)
            })
            .collect();
        ProfileCsi::new(manager_with(areas), Arc::new(repo))
    }

    async fn identify(csi: &ProfileCsi, raw: &str) -> Option<AreaInfo> {
        csi.identify_area(&LocalPath::new(raw)).await.expect("identify")
    }

    #[tokio::test]
    async fn profile_roots_are_identified() {
        let csi = csi(FakePkgRepo::default());
        for (area_type, root, _) in PROFILE_ROOTS {
            let info = identify(&csi, &format!("{root}/some.pkg")).await.expect("area");
            assert_eq!(info.area_type(), area_type);
            assert_eq!(info.prefix, LocalPath::new(root));
            assert!(info.is_blacklist_location);
        }

        assert!(identify(&csi, "/data/misc/profiles/cur/0").await.is_none());
        assert!(identify(&csi, "/data/misc/profiles/cur/some.pkg").await.is_none());
        assert!(identify(&csi, "/data_mirror/cur_profiles/0").await.is_none());
        assert!(identify(&csi, "/data/dalvik-cache/arm64/boot.oat").await.is_none());
    }

    #[tokio::test]
    async fn installed_package_directory_is_the_owner() {
        let csi = csi(FakePkgRepo::default().with("eu.thedarken.sdm.test"));
        for (_, root, _) in PROFILE_ROOTS {
            for below in ["eu.thedarken.sdm.test", "eu.thedarken.sdm.test/abc/primary.prof"] {
                let info = identify(&csi, &format!("{root}/{below}")).await.expect("area");
                assert_eq!(info.prefix, LocalPath::new(root));

                let result = csi.find_owners(&info).await.expect("owners");
                assert_eq!(result.owners.len(), 1, "{root}/{below}");
                let owner = result.owners.iter().next().expect("owner");
                assert_eq!(owner.pkg_id, PkgId::new("eu.thedarken.sdm.test"));
                assert!(!result.has_known_unknown_owner);
            }
        }
    }

    #[tokio::test]
    async fn unknown_directory_has_no_owner() {
        let csi = csi(FakePkgRepo::default().with("eu.thedarken.sdm.test"));
        for (_, root, _) in PROFILE_ROOTS {
            let info = identify(&csi, &format!("{root}/com.uninstalled.app/primary.prof"))
                .await
                .expect("area");
            let result = csi.find_owners(&info).await.expect("owners");
            assert!(result.is_empty());
            assert!(!result.has_known_unknown_owner);
        }
    }

    #[tokio::test]
    async fn other_area_types_are_refused() {
        let csi = csi(FakePkgRepo::default());
        let info = AreaInfo {
            data_area: area(AreaType::Data, "/data"),
            file: LocalPath::new("/data/x"),
            prefix: LocalPath::new("/data"),
            is_blacklist_location: true,
        };
        assert!(csi.find_owners(&info).await.is_err());
    }
}
