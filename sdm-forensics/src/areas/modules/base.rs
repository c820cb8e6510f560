// SPDX-License-Identifier: GPL-3.0-only

//! Areas known from platform facts alone

use std::sync::Arc;

use async_trait::async_trait;
use sdm_contracts::{DataAreaModule, LocalGateway, PlatformCapabilities, StorageError};
use sdm_types::{AreaFlag, AreaType, GatewayMode, StorageArea};
use tracing::{debug, trace};

/// `DATA`: the platform's data directory
pub struct DataModule {
    platform: Arc<dyn PlatformCapabilities>,
}

impl DataModule {
    pub fn new(platform: Arc<dyn PlatformCapabilities>) -> Self {
        Self { platform }
    }
}

#[async_trait]
impl DataAreaModule for DataModule {
    fn name(&self) -> &'static str {
        "data"
    }

    async fn first_pass(&self) -> Result<Vec<StorageArea>, StorageError> {
        Ok(vec![
            StorageArea::new(
                AreaType::Data,
                self.platform.data_dir(),
                self.platform.system_user(),
            )
            .with_flags([AreaFlag::Primary]),
        ])
    }
}

/// `SYSTEM` partitions, plus their `app` and `priv-app` folders
pub struct SystemModule {
    platform: Arc<dyn PlatformCapabilities>,
    gateway: Arc<dyn LocalGateway>,
}

impl SystemModule {
    pub fn new(platform: Arc<dyn PlatformCapabilities>, gateway: Arc<dyn LocalGateway>) -> Self {
        Self { platform, gateway }
    }
}

#[async_trait]
impl DataAreaModule for SystemModule {
    fn name(&self) -> &'static str {
        "system"
    }

    async fn first_pass(&self) -> Result<Vec<StorageArea>, StorageError> {
        let user = self.platform.system_user();
        let mut areas = Vec::new();
        for (index, dir) in self.platform.system_dirs().into_iter().enumerate() {
            if index == 0 {
                areas.push(
                    StorageArea::new(AreaType::System, dir, user).with_flags([AreaFlag::Primary]),
                );
                continue;
            }
            match self.gateway.exists(&dir, GatewayMode::Normal).await {
                Ok(true) => areas.push(StorageArea::new(AreaType::System, dir, user)),
                Ok(false) => trace!("{} is not present", dir),
                Err(e) => debug!("Can't check {}: {}", dir, e),
            }
        }
        Ok(areas)
    }

    async fn second_pass(
        &self,
        first_pass: &[StorageArea],
    ) -> Result<Vec<StorageArea>, StorageError> {
        let mut areas = Vec::new();
        for system in first_pass.iter().filter(|area| area.area_type == AreaType::System) {
            for (area_type, dir) in [
                (AreaType::SystemApp, "app"),
                (AreaType::SystemPrivApp, "priv-app"),
            ] {
                let path = system.path.child(dir);
                if self.gateway.exists(&path, GatewayMode::Normal).await.unwrap_or(false) {
                    areas.push(
                        StorageArea::new(area_type, path, system.user_handle)
                            .with_flags(system.flags.iter().copied()),
                    );
                }
            }
        }
        Ok(areas)
    }
}

/// `DOWNLOAD_CACHE`: `/cache` on devices that still have it
pub struct DownloadCacheModule {
    platform: Arc<dyn PlatformCapabilities>,
    gateway: Arc<dyn LocalGateway>,
}

impl DownloadCacheModule {
    pub fn new(platform: Arc<dyn PlatformCapabilities>, gateway: Arc<dyn LocalGateway>) -> Self {
        Self { platform, gateway }
    }
}

#[async_trait]
impl DataAreaModule for DownloadCacheModule {
    fn name(&self) -> &'static str {
        "download-cache"
    }

    async fn first_pass(&self) -> Result<Vec<StorageArea>, StorageError> {
        let path = self.platform.download_cache_dir();
        if !self.gateway.exists(&path, GatewayMode::Auto).await? {
            debug!("No download cache at {}", path);
            return Ok(Vec::new());
        }
        Ok(vec![
            StorageArea::new(AreaType::DownloadCache, path, self.platform.system_user())
                .with_flags([AreaFlag::Primary]),
        ])
    }
}
