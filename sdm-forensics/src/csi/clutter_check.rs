// SPDX-License-Identifier: GPL-3.0-only

use std::sync::Arc;

use async_trait::async_trait;
use sdm_contracts::{CsiSubProcessor, StorageError};
use sdm_types::{AreaInfo, CsiResult};

use crate::clutter::ClutterRepo;

/// Attributes a path through the clutter database, keyed on its first directory below the area
pub struct ClutterCheck {
    clutter: Arc<ClutterRepo>,
}

impl ClutterCheck {
    pub fn new(clutter: Arc<ClutterRepo>) -> Self {
        Self { clutter }
    }
}

#[async_trait]
impl CsiSubProcessor for ClutterCheck {
    fn name(&self) -> &'static str {
        "clutter-check"
    }

    async fn process(&self, area_info: &AreaInfo) -> Result<CsiResult, StorageError> {
        let Some(first) = area_info.first_dir_element() else {
            return Ok(CsiResult::default());
        };
        let area_type = area_info.area_type();
        // Public storage is shared between users
        let user = (!area_type.is_public()).then(|| area_info.user_handle());

        let matches = self
            .clutter
            .match_segments(area_type, std::slice::from_ref(&first))
            .await;
        Ok(CsiResult::new(
            matches.iter().flat_map(|found| found.to_owners(user)),
        ))
    }
}

#[cfg(test)]
mod tests {
    use sdm_types::{AreaType, LocalPath, MarkerFlag, PkgId};

    use super::*;
    use crate::testing::{FakePkgRepo, area};

    fn info(area_type: AreaType, base: &str, file: &str) -> AreaInfo {
        AreaInfo {
            data_area: area(area_type, base),
            file: LocalPath::new(file),
            prefix: LocalPath::new(base),
            is_blacklist_location: false,
        }
    }

    fn check() -> ClutterCheck {
        let repo = ClutterRepo::with_defaults(Arc::new(FakePkgRepo::default())).expect("repo");
        ClutterCheck::new(Arc::new(repo))
    }

    #[tokio::test]
    async fn whatsapp_media_belongs_to_whatsapp() {
        let result = check()
            .process(&info(
                AreaType::PublicData,
                "/storage/emulated/0/Android/data",
                "/storage/emulated/0/Android/data/WhatsApp/Media",
            ))
            .await
            .expect("process");

        let owner = result.owners.iter().next().expect("owner");
        assert_eq!(result.owners.len(), 1);
        assert_eq!(owner.pkg_id, PkgId::new("com.whatsapp"));
        assert_eq!(owner.user_handle, None);
        assert!(owner.has_flag(MarkerFlag::Keeper));
    }

    #[tokio::test]
    async fn lookups_are_anchored_below_the_prefix() {
        let result = check()
            .process(&info(
                AreaType::Sdcard,
                "/storage/emulated/0",
                "/storage/emulated/0/not_an_app/WhatsApp",
            ))
            .await
            .expect("process");
        assert!(result.is_empty());

        let area_root = check()
            .process(&info(AreaType::Sdcard, "/storage/emulated/0", "/storage/emulated/0"))
            .await
            .expect("process");
        assert!(area_root.is_empty());
    }

    #[tokio::test]
    async fn private_owners_keep_the_area_user() {
        let result = check()
            .process(&info(
                AreaType::PrivateData,
                "/data/data",
                "/data/data/com.google.android.finsky/cache",
            ))
            .await
            .expect("process");
        let owner = result.owners.iter().next().expect("owner");
        assert_eq!(owner.pkg_id, PkgId::new("com.android.vending"));
        assert!(owner.user_handle.is_some());
    }
}
