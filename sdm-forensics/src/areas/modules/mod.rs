// SPDX-License-Identifier: GPL-3.0-only

use std::sync::Arc;

use sdm_contracts::{DataAreaModule, LocalGateway, PlatformCapabilities};

mod app;
mod art_profile;
mod base;
mod dalvik;
mod private_data;
mod public;
mod sdcards;

pub use app::AppModule;
pub use art_profile::ArtProfileModule;
pub use base::{DataModule, DownloadCacheModule, SystemModule};
pub use dalvik::DalvikDexModule;
pub use private_data::PrivateDataModule;
pub use public::PublicSubdirModule;
pub use sdcards::SdcardsModule;

/// The discovery modules in their fixed execution order
pub fn default_modules(
    platform: Arc<dyn PlatformCapabilities>,
    gateway: Arc<dyn LocalGateway>,
) -> Vec<Arc<dyn DataAreaModule>> {
    vec![
        Arc::new(DataModule::new(platform.clone())),
        Arc::new(SystemModule::new(platform.clone(), gateway.clone())),
        Arc::new(DownloadCacheModule::new(platform.clone(), gateway.clone())),
        Arc::new(SdcardsModule::new(platform.clone(), gateway.clone())),
        Arc::new(PublicSubdirModule::data(gateway.clone())),
        Arc::new(PublicSubdirModule::media(gateway.clone())),
        Arc::new(PublicSubdirModule::obb(gateway.clone())),
        Arc::new(PrivateDataModule::new(platform.clone(), gateway.clone())),
        Arc::new(ArtProfileModule::new(platform.clone(), gateway.clone())),
        Arc::new(DalvikDexModule::new(platform, gateway.clone())),
        Arc::new(AppModule::new(gateway)),
    ]
}
