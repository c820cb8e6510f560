// SPDX-License-Identifier: GPL-3.0-only

use std::sync::Arc;

use async_trait::async_trait;
use sdm_contracts::{DataAreaModule, LocalGateway, StorageError};
use sdm_types::{AreaType, GatewayMode, StorageArea};
use tracing::info;

const APP_DIRS: [(AreaType, &str); 3] = [
    (AreaType::AppApp, "app"),
    (AreaType::AppAsec, "app-asec"),
    (AreaType::AppLib, "app-lib"),
];

/// App code locations below primary data (root only)
pub struct AppModule {
    gateway: Arc<dyn LocalGateway>,
}

impl AppModule {
    pub fn new(gateway: Arc<dyn LocalGateway>) -> Self {
        Self { gateway }
    }
}

#[async_trait]
impl DataAreaModule for AppModule {
    fn name(&self) -> &'static str {
        "app"
    }

    async fn second_pass(
        &self,
        first_pass: &[StorageArea],
    ) -> Result<Vec<StorageArea>, StorageError> {
        if !self.gateway.has_root().await {
            info!("No root, skipping app areas");
            return Ok(Vec::new());
        }

        let mut areas = Vec::new();
        for data in first_pass
            .iter()
            .filter(|area| area.area_type == AreaType::Data && area.is_primary())
        {
            for (area_type, dir) in APP_DIRS {
                let path = data.path.child(dir);
                if self.gateway.exists(&path, GatewayMode::Root).await? {
                    let mut area = StorageArea::new(area_type, path, data.user_handle);
                    area.flags = data.flags.clone();
                    areas.push(area);
                }
            }
        }
        Ok(areas)
    }
}
