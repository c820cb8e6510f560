// SPDX-License-Identifier: GPL-3.0-only

use std::sync::Arc;

use async_trait::async_trait;
use sdm_contracts::{DataAreaModule, LocalGateway, PlatformCapabilities, StorageError};
use sdm_types::{AreaFlag, AreaType, GatewayMode, LocalPath, StorageArea, UserHandle};
use tracing::{debug, info, warn};

/// First API level where `/data/data` is only a bind mount and `/data_mirror` exists
pub const MIRROR_API_LEVEL: u32 = 30;

const MIRROR_DIRS: [&str; 2] = ["data_ce", "data_de"];

/// `PRIVATE_DATA`: per-user app data directories (root only)
pub struct PrivateDataModule {
    platform: Arc<dyn PlatformCapabilities>,
    gateway: Arc<dyn LocalGateway>,
}

impl PrivateDataModule {
    pub fn new(platform: Arc<dyn PlatformCapabilities>, gateway: Arc<dyn LocalGateway>) -> Self {
        Self { platform, gateway }
    }

    async fn mirrored(&self, first_pass: &[StorageArea]) -> Result<Vec<StorageArea>, StorageError> {
        if !first_pass.iter().any(|area| area.area_type == AreaType::Data) {
            warn!("No data areas available");
            return Ok(Vec::new());
        }

        let mirror = self.platform.data_mirror_dir();
        let items = self.gateway.list_files(&mirror, GatewayMode::Root).await?;
        debug!("Items in mirror: {:?}", items);

        let mut areas = Vec::new();
        for folder in items.iter().filter(|item| MIRROR_DIRS.contains(&item.name())) {
            for user in self.platform.all_users() {
                let id = user.id().to_string();
                areas.push(
                    StorageArea::new(
                        AreaType::PrivateData,
                        LocalPath::build(folder, ["null", id.as_str()]),
                        user,
                    )
                    .with_flags([AreaFlag::Primary]),
                );
            }
        }
        Ok(areas)
    }

    async fn legacy(&self, first_pass: &[StorageArea]) -> Vec<StorageArea> {
        let data_areas: Vec<&StorageArea> = first_pass
            .iter()
            .filter(|area| area.area_type == AreaType::Data)
            .collect();
        if data_areas.is_empty() {
            warn!("No data areas available");
            return Vec::new();
        }

        let current_user = self.platform.current_user();
        let mut areas = Vec::new();
        for base in data_areas {
            let user_dirs = self.user_dirs(&base.path).await;
            if !user_dirs.is_empty() {
                for dir in user_dirs {
                    let Ok(id) = dir.name().parse::<i32>() else {
                        continue;
                    };
                    let mut area = StorageArea::new(AreaType::PrivateData, dir, UserHandle(id));
                    area.flags = base.flags.clone();
                    areas.push(area);
                }
            } else if base.is_primary() && !self.platform.has_multi_user_support() {
                areas.push(
                    StorageArea::new(AreaType::PrivateData, base.path.child("data"), current_user)
                        .with_flags([AreaFlag::Primary]),
                );
            } else {
                warn!("Unknown base area, can't map: {}", base);
            }
        }

        for extra in [LocalPath::new("/datadata"), LocalPath::new("/dbdata/databases")] {
            match self.gateway.can_read(&extra, GatewayMode::Root).await {
                Ok(true) => {
                    areas.push(StorageArea::new(AreaType::PrivateData, extra, current_user))
                }
                Ok(false) => {}
                Err(e) => warn!("{} lookup failed: {}", extra, e),
            }
        }
        areas
    }

    /// Numeric directories below `user` and `user_de`
    async fn user_dirs(&self, base: &LocalPath) -> Vec<LocalPath> {
        let mut dirs = Vec::new();
        for parent in ["user", "user_de"] {
            match self.gateway.list_files(&base.child(parent), GatewayMode::Root).await {
                Ok(items) => dirs.extend(items),
                Err(e) => warn!("Failed to get '{}' dirs: {}", parent, e),
            }
        }
        dirs.retain(|dir| is_user_dir_name(dir.name()));
        dirs
    }
}

fn is_user_dir_name(name: &str) -> bool {
    (1..=2).contains(&name.len()) && name.chars().all(|c| c.is_ascii_digit())
}

#[async_trait]
impl DataAreaModule for PrivateDataModule {
    fn name(&self) -> &'static str {
        "private-data"
    }

    async fn second_pass(
        &self,
        first_pass: &[StorageArea],
    ) -> Result<Vec<StorageArea>, StorageError> {
        if !self.gateway.has_root().await {
            info!("No root, skipping private data");
            return Ok(Vec::new());
        }

        let mirror = self.platform.data_mirror_dir();
        if self.platform.api_level() >= MIRROR_API_LEVEL
            && self.gateway.exists(&mirror, GatewayMode::Root).await?
        {
            self.mirrored(first_pass).await
        } else {
            Ok(self.legacy(first_pass).await)
        }
    }
}
