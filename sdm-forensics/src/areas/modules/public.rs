// SPDX-License-Identifier: GPL-3.0-only

use std::sync::Arc;

use async_trait::async_trait;
use sdm_contracts::{DataAreaModule, LocalGateway, StorageError};
use sdm_types::{AreaType, GatewayMode, LocalPath, StorageArea};
use tracing::{debug, warn};

/// `PUBLIC_DATA`, `PUBLIC_MEDIA` and `PUBLIC_OBB`: `Android/<dir>` below every sdcard
pub struct PublicSubdirModule {
    name: &'static str,
    area_type: AreaType,
    dir: &'static str,
    gateway: Arc<dyn LocalGateway>,
}

impl PublicSubdirModule {
    pub fn data(gateway: Arc<dyn LocalGateway>) -> Self {
        Self {
            name: "public-data",
            area_type: AreaType::PublicData,
            dir: "data",
            gateway,
        }
    }

    pub fn media(gateway: Arc<dyn LocalGateway>) -> Self {
        Self {
            name: "public-media",
            area_type: AreaType::PublicMedia,
            dir: "media",
            gateway,
        }
    }

    pub fn obb(gateway: Arc<dyn LocalGateway>) -> Self {
        Self {
            name: "public-obb",
            area_type: AreaType::PublicObb,
            dir: "obb",
            gateway,
        }
    }

    async fn is_usable(&self, path: &LocalPath) -> bool {
        match self.gateway.can_read(path, GatewayMode::Auto).await {
            Ok(true) => {}
            Ok(false) => {
                debug!("Can't read {}", path);
                return false;
            }
            Err(e) => {
                warn!("Failed to check {}: {}", path, e);
                return false;
            }
        }
        match self.gateway.lookup(path, GatewayMode::Auto).await {
            Ok(info) => info.is_directory(),
            Err(e) => {
                warn!("Failed to lookup {}: {}", path, e);
                false
            }
        }
    }
}

#[async_trait]
impl DataAreaModule for PublicSubdirModule {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn second_pass(
        &self,
        first_pass: &[StorageArea],
    ) -> Result<Vec<StorageArea>, StorageError> {
        let mut areas = Vec::new();
        for sdcard in first_pass.iter().filter(|area| area.area_type == AreaType::Sdcard) {
            let path = LocalPath::build(&sdcard.path, ["Android", self.dir]);
            if !self.is_usable(&path).await {
                continue;
            }
            let mut area = StorageArea::new(self.area_type, path, sdcard.user_handle);
            area.flags = sdcard.flags.clone();
            areas.push(area);
        }
        debug!("{}: {:?}", self.name, areas);
        Ok(areas)
    }
}
