// SPDX-License-Identifier: GPL-3.0-only

//! Content-specific identification: which area a path is in, and who owns it

mod app_source;
mod area_root;
mod clutter_check;
mod dalvik;
mod forensics;
mod owners;
mod private_data;
mod profile;
mod public;
mod sdcard;

use std::sync::Arc;

use sdm_contracts::{CsiProcessor, CsiSubProcessor, LocalGateway, PkgRepo, PlatformCapabilities};

pub use app_source::AppSourceCsi;
pub use area_root::AreaRootCsi;
pub use clutter_check::ClutterCheck;
pub use dalvik::{DalvikCandidateGenerator, DalvikDexCsi};
pub use forensics::{FileForensics, OwnerInfo, OwnerState};
pub use private_data::PrivateDataCsi;
pub use profile::ProfileCsi;
pub use public::PublicCsi;
pub use sdcard::SdcardCsi;

use crate::areas::StorageAreaManager;
use crate::clutter::ClutterRepo;

/// Processors in the order they are consulted
pub fn default_processors(
    areas: Arc<StorageAreaManager>,
    platform: Arc<dyn PlatformCapabilities>,
    pkg_repo: Arc<dyn PkgRepo>,
    gateway: Arc<dyn LocalGateway>,
    clutter: Arc<ClutterRepo>,
) -> Vec<Arc<dyn CsiProcessor>> {
    vec![
        Arc::new(PrivateDataCsi::new(
            areas.clone(),
            platform.clone(),
            pkg_repo.clone(),
            clutter.clone(),
        )),
        Arc::new(PublicCsi::data(areas.clone(), pkg_repo.clone(), clutter.clone())),
        Arc::new(PublicCsi::media(areas.clone(), pkg_repo.clone(), clutter.clone())),
        Arc::new(PublicCsi::obb(areas.clone(), pkg_repo.clone(), clutter.clone())),
        Arc::new(SdcardCsi::new(areas.clone(), clutter)),
        Arc::new(DalvikDexCsi::new(areas.clone(), platform, pkg_repo.clone(), gateway)),
        Arc::new(AppSourceCsi::new(areas.clone(), pkg_repo.clone())),
        Arc::new(ProfileCsi::new(areas.clone(), pkg_repo)),
        Arc::new(AreaRootCsi::new(areas)),
    ]
}

pub fn default_sub_processors(clutter: Arc<ClutterRepo>) -> Vec<Arc<dyn CsiSubProcessor>> {
    vec![Arc::new(ClutterCheck::new(clutter))]
}
