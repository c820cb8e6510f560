// SPDX-License-Identifier: GPL-3.0-only

use std::sync::Arc;

use async_trait::async_trait;
use sdm_contracts::{CsiProcessor, PkgRepo, StorageError};
use sdm_types::{AreaInfo, AreaType, CsiResult, LocalPath, Owner, PkgId};
use tracing::trace;

use crate::areas::StorageAreaManager;
use crate::error::ForensicsError;

const SOURCE_AREA_TYPES: [AreaType; 6] = [
    AreaType::AppApp,
    AreaType::AppAppPrivate,
    AreaType::AppLib,
    AreaType::AppAsec,
    AreaType::SystemApp,
    AreaType::SystemPrivApp,
];

/// `com.test-1`, `com.test-RLEuLDrRIaICTBfF4FhaFg==` or `com.test-2.apk` to `com.test`
fn dir_name_to_pkg(name: &str) -> Option<PkgId> {
    let name = name.strip_suffix(".apk").unwrap_or(name);
    let name = match name.rsplit_once('-') {
        Some((pkg, suffix))
            if !suffix.is_empty()
                && suffix
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '=' || c == '_') =>
        {
            pkg
        }
        _ => name,
    };
    let looks_like_pkg = name.contains('.')
        && name
            .split('.')
            .all(|part| !part.is_empty() && part.chars().all(|c| c.is_alphanumeric() || c == '_'));
    looks_like_pkg.then(|| PkgId::new(name))
}

/// App code locations: `APP_*`, `SYSTEM_APP` and `SYSTEM_PRIV_APP`
///
/// The entry directly below the area is matched against installed packages'
/// code paths, then interpreted as `<pkg>[-<suffix>][.apk]`.
pub struct AppSourceCsi {
    areas: Arc<StorageAreaManager>,
    pkg_repo: Arc<dyn PkgRepo>,
}

impl AppSourceCsi {
    pub fn new(areas: Arc<StorageAreaManager>, pkg_repo: Arc<dyn PkgRepo>) -> Self {
        Self { areas, pkg_repo }
    }
}

#[async_trait]
impl CsiProcessor for AppSourceCsi {
    fn name(&self) -> &'static str {
        "app-source"
    }

    fn has_jurisdiction(&self, area_type: AreaType) -> bool {
        SOURCE_AREA_TYPES.contains(&area_type)
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
        let Some(top) = area_info.first_dir_element() else {
            return Ok(CsiResult::default());
        };
        let entry = area_info.prefix.child(&top);

        let pkgs = self.pkg_repo.current_pkgs().await?;
        let by_code_path: Vec<Owner> = pkgs
            .iter()
            .filter(|pkg| {
                pkg.source_dir.as_ref().is_some_and(|source| {
                    entry.is_ancestor_or_same(source) || source.is_ancestor_or_same(&area_info.file)
                })
            })
            .map(|pkg| Owner::new(pkg.id.clone()))
            .collect();
        if !by_code_path.is_empty() {
            return Ok(CsiResult::new(by_code_path));
        }

        let Some(pkg_id) = dir_name_to_pkg(&top) else {
            return Ok(CsiResult::default());
        };
        if pkgs.iter().any(|pkg| pkg.id == pkg_id) {
            trace!("{} named after {}", entry, pkg_id);
            return Ok(CsiResult::new([Owner::new(pkg_id)]));
        }
        Ok(CsiResult::default())
    }
}
