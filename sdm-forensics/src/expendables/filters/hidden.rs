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

const SIEVE: &str = include_str!("../../../assets/expendables/db_hidden_caches_files.json");

const HIDDEN_CACHE_FOLDERS: &[&str] = &[
    ".cache",
    "tmp",
    ".tmp",
    "tmpdata",
    "tmp-data",
    "tmp_data",
    ".tmpdata",
    ".tmp-data",
    ".tmp_data",
    ".temp",
    "temp",
    "tempdata",
    "temp-data",
    "temp_data",
    ".tempdata",
    ".temp-data",
    ".temp_data",
    "cache",
    "_cache",
    "-cache",
    "imagecache",
    "image-cache",
    "image_cache",
    ".imagecache",
    ".image-cache",
    ".image_cache",
    "videocache",
    "video-cache",
    "video_cache",
    ".videocache",
    ".video-cache",
    ".video_cache",
    "mediacache",
    "media-cache",
    "media_cache",
    ".mediacache",
    ".media-cache",
    ".media_cache",
    "diskcache",
    "disk-cache",
    "disk_cache",
    ".diskcache",
    ".disk-cache",
    ".disk_cache",
    "filescache",
    "avfscache",
];

const HIDDEN_CACHE_FILES: &[&str] = &["cache.dat", "tmp.dat", "temp.dat", ".temp.jpg"];

fn is_cache_folder(lc_name: &str) -> bool {
    HIDDEN_CACHE_FOLDERS.contains(&lc_name)
}

fn is_cache_file(lc_name: &str) -> bool {
    HIDDEN_CACHE_FILES.contains(&lc_name)
}

/// Unity asset bundles keep a `Cache` folder that is reloaded on every start
fn is_exception(segments: &[String]) -> bool {
    segments.len() >= 4 && segments[2] == "Cache" && segments[3].contains(".unity3d&")
}

/// Caches that apps keep outside their regular cache directory
pub struct HiddenFilter {
    gateway: Arc<dyn LocalGateway>,
    sieve: OnceCell<JsonAppSieve>,
}

impl HiddenFilter {
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
impl ExpendablesFilter for HiddenFilter {
    fn identifier(&self) -> &'static str {
        "hidden_caches"
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
        if is_ignored_file(&lc) || is_own_cache_dir(pkg_id.name(), segments) {
            return Ok(false);
        }

        // <pkg>/cache.dat
        if lc.len() == 2 && is_cache_file(&lc[1]) {
            return Ok(true);
        }
        // <pkg>/files/cache.dat
        if lc.len() == 3 && is_cache_file(&lc[2]) {
            return Ok(true);
        }
        // <pkg>/.cache/file
        if lc.len() >= 3 && is_cache_folder(&lc[1]) {
            return Ok(true);
        }
        if is_exception(segments) {
            return Ok(false);
        }
        // <pkg>/files/.cache/file
        if lc.len() >= 4 && lc[1] == "files" && is_cache_folder(&lc[2]) {
            return Ok(true);
        }
        // Huawei/Themes/.cache/file
        if lc.len() >= 4 && area_type == AreaType::Sdcard && is_cache_folder(&lc[2]) {
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
