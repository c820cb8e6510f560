// SPDX-License-Identifier: GPL-3.0-only

use std::sync::Arc;

use async_trait::async_trait;
use sdm_contracts::{CsiProcessor, StorageError};
use sdm_types::{AreaInfo, AreaType, CsiResult, LocalPath, StorageArea};
use tracing::trace;

use super::public::{LEGACY_STORAGE, PUBLIC_SUBDIRS};
use crate::areas::StorageAreaManager;
use crate::clutter::ClutterRepo;
use crate::error::ForensicsError;

/// `SDCARD`: everything on public storage outside `Android/{data,media,obb}`
pub struct SdcardCsi {
    areas: Arc<StorageAreaManager>,
    clutter: Arc<ClutterRepo>,
}

impl SdcardCsi {
    pub fn new(areas: Arc<StorageAreaManager>, clutter: Arc<ClutterRepo>) -> Self {
        Self { areas, clutter }
    }
}

/// Below one of the public subareas of `base`, which belong to other processors
fn in_public_subarea(base: &LocalPath, target: &LocalPath) -> bool {
    PUBLIC_SUBDIRS
        .iter()
        .any(|dir| LocalPath::build(base, ["Android", dir]).is_ancestor_of(target))
}

#[async_trait]
impl CsiProcessor for SdcardCsi {
    fn name(&self) -> &'static str {
        "sdcard"
    }

    fn has_jurisdiction(&self, area_type: AreaType) -> bool {
        area_type == AreaType::Sdcard
    }

    async fn identify_area(&self, target: &LocalPath) -> Result<Option<AreaInfo>, StorageError> {
        let snapshot = self.areas.snapshot().await;
        let mut sdcards: Vec<&StorageArea> = snapshot.of_type(AreaType::Sdcard).collect();
        // Deepest nest first, e.g. an external card mounted inside the internal one
        sdcards.sort_by_key(|area| std::cmp::Reverse(area.path.depth()));

        let mut primary = None;
        for area in sdcards {
            if area.is_primary() {
                primary = Some(area);
            }
            if !area.path.is_ancestor_of(target) {
                continue;
            }
            if in_public_subarea(&area.path, target) {
                trace!("{} is below a public subarea of {}", target, area.path);
                return Ok(None);
            }
            return Ok(Some(AreaInfo {
                data_area: area.clone(),
                file: target.clone(),
                prefix: area.path.clone(),
                is_blacklist_location: false,
            }));
        }

        let Some(primary) = primary else {
            return Ok(None);
        };
        let legacy = LocalPath::new(LEGACY_STORAGE);
        if !legacy.is_ancestor_of(target) || in_public_subarea(&legacy, target) {
            return Ok(None);
        }
        Ok(Some(AreaInfo {
            data_area: primary.clone(),
            file: target.clone(),
            prefix: legacy,
            is_blacklist_location: false,
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

        // Chop segments off the end until something matches
        let mut segments = area_info.prefix_free_segments();
        while !segments.is_empty() {
            let matches = self
                .clutter
                .match_segments(area_info.area_type(), &segments)
                .await;
            if !matches.is_empty() {
                return Ok(CsiResult::new(
                    matches.iter().flat_map(|found| found.to_owners(None)),
                ));
            }
            segments.pop();
        }
        Ok(CsiResult::default())
    }
}
