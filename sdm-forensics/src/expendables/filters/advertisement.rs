// SPDX-License-Identifier: GPL-3.0-only

use std::sync::Arc;

use async_trait::async_trait;
use sdm_contracts::{ExpendableMatch, ExpendablesFilter, LocalGateway, ProcessResult, StorageError};
use sdm_types::segments;
use sdm_types::{AreaType, LocalPath, PkgId};
use tokio::sync::OnceCell;
use tracing::debug;

use super::{is_ignored_file, is_own_cache_dir};
use crate::expendables::delete::delete_all;
use crate::expendables::json_sieve::JsonAppSieve;

const SIEVE: &str = include_str!("../../../assets/expendables/db_advertisement_files.json");

const AD_CACHE_FOLDERS: &[&str] = &["vast_rtb_cache", "goadsdk", "iflyadimgcache"];

/// Below the top directory
const AD_CACHE_PATHS: &[&str] = &["files/mb/res/.mbridge"];

/// Media and creatives cached by ad SDKs
pub struct AdvertisementFilter {
    gateway: Arc<dyn LocalGateway>,
    sieve: OnceCell<JsonAppSieve>,
}

impl AdvertisementFilter {
    pub fn new(gateway: Arc<dyn LocalGateway>) -> Self {
        Self {
            gateway,
            sieve: OnceCell::new(),
        }
    }

    async fn sieve(&self) -> Result<&JsonAppSieve, StorageError> {
        Ok(self
            .sieve
            .get_or_try_init(|| async { JsonAppSieve::from_json(SIEVE) })
            .await?)
    }
}

#[async_trait]
impl ExpendablesFilter for AdvertisementFilter {
    fn identifier(&self) -> &'static str {
        "advertisements"
    }

    async fn initialize(&self) -> Result<(), StorageError> {
        debug!("Initializing {}", self.identifier());
        self.sieve().await.map(|_| ())
    }

    async fn is_expendable(
        &self,
        pkg_id: &PkgId,
        _target: &LocalPath,
        area_type: AreaType,
        segments: &[String],
    ) -> Result<bool, StorageError> {
        let lc = segments::lowercase(segments);
        if matches!(area_type, AreaType::PrivateData | AreaType::PublicData)
            && is_own_cache_dir(pkg_id.name(), &lc)
        {
            return Ok(false);
        }
        if is_ignored_file(&lc) {
            return Ok(false);
        }

        // <pkg>/vast_rtb_cache/..
        if lc.len() >= 3 && AD_CACHE_FOLDERS.contains(&lc[1].as_str()) {
            return Ok(true);
        }
        // <pkg>/files/goadsdk/..
        if lc.len() >= 4 && lc[1] == "files" && AD_CACHE_FOLDERS.contains(&lc[2].as_str()) {
            return Ok(true);
        }
        let below_top = lc.get(1..).unwrap_or_default();
        if AD_CACHE_PATHS
            .iter()
            .any(|raw| segments::is_ancestor_of(&segments::to_segs(raw), below_top, false))
        {
            return Ok(true);
        }

        Ok(!segments.is_empty() && self.sieve().await?.matches(pkg_id, area_type, segments))
    }

    async fn process(
        &self,
        targets: &[ExpendableMatch],
        all_matches: &[ExpendableMatch],
    ) -> Result<ProcessResult, StorageError> {
        Ok(delete_all(targets, self.gateway.as_ref(), all_matches).await)
    }
}

#[cfg(test)]
mod tests {
    use sdm_types::segments::to_segs;

    use super::*;
    use crate::testing::FakeGateway;

    async fn check(area_type: AreaType, raw: &str) -> bool {
        let filter = AdvertisementFilter::new(Arc::new(FakeGateway::default()));
        filter
            .is_expendable(
                &PkgId::new("com.test"),
                &LocalPath::new(format!("/prefix/{raw}")),
                area_type,
                &to_segs(raw),
            )
            .await
            .expect("is_expendable")
    }

    #[tokio::test]
    async fn ad_sdk_folders() {
        assert!(check(AreaType::PrivateData, "com.test/vast_rtb_cache/creative").await);
        assert!(check(AreaType::PublicData, "com.test/files/GoAdSdk/a/b").await);
        assert!(check(AreaType::PrivateData, "com.test/files/mb/res/.mbridge/x").await);
        assert!(!check(AreaType::PrivateData, "com.test/files/mb/res/.mbridge").await);
        assert!(check(AreaType::PrivateData, "com.test/files/.abc-123.mologiq").await);
        assert!(!check(AreaType::PrivateData, "com.test/files/settings.xml").await);
    }

    #[tokio::test]
    async fn own_cache_and_markers_are_left_alone() {
        assert!(!check(AreaType::PrivateData, "com.test/cache/vast_rtb_cache/x").await);
        assert!(!check(AreaType::PrivateData, "com.test/vast_rtb_cache/.nomedia").await);
        assert!(check(AreaType::Sdcard, ".adcache/banner.png").await);
    }
}
