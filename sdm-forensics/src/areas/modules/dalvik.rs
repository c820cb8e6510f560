// SPDX-License-Identifier: GPL-3.0-only

use std::sync::Arc;

use async_trait::async_trait;
use sdm_contracts::{DataAreaModule, LocalGateway, PlatformCapabilities, StorageError};
use sdm_types::{AreaType, GatewayMode, LocalPath, StorageArea};
use tracing::{debug, info};

/// `DALVIK_DEX`: `dalvik-cache/<arch>` below primary data and the download cache (root only)
pub struct DalvikDexModule {
    platform: Arc<dyn PlatformCapabilities>,
    gateway: Arc<dyn LocalGateway>,
}

impl DalvikDexModule {
    pub fn new(platform: Arc<dyn PlatformCapabilities>, gateway: Arc<dyn LocalGateway>) -> Self {
        Self { platform, gateway }
    }
}

#[async_trait]
impl DataAreaModule for DalvikDexModule {
    fn name(&self) -> &'static str {
        "dalvik-dex"
    }

    async fn second_pass(
        &self,
        first_pass: &[StorageArea],
    ) -> Result<Vec<StorageArea>, StorageError> {
        if !self.gateway.has_root().await {
            info!("No root, skipping dalvik cache");
            return Ok(Vec::new());
        }

        let parents = first_pass.iter().filter(|area| {
            (area.area_type == AreaType::Data && area.is_primary())
                || area.area_type == AreaType::DownloadCache
        });

        let mut areas = Vec::new();
        for parent in parents {
            for arch in self.platform.cpu_arch_folders() {
                let path = LocalPath::build(&parent.path, ["dalvik-cache", arch.as_str()]);
                if self.gateway.exists(&path, GatewayMode::Root).await? {
                    areas.push(StorageArea::new(
                        AreaType::DalvikDex,
                        path,
                        self.platform.system_user(),
                    ));
                } else {
                    debug!("{} does not exist", path);
                }
            }
        }
        Ok(areas)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeGateway, FakePlatform, area, primary};

    #[tokio::test]
    async fn existing_arch_folders_become_areas() {
        let gateway = FakeGateway::default().with_root();
        gateway
            .add_dir("/data/dalvik-cache/arm64")
            .add_dir("/cache/dalvik-cache/arm");
        let module = DalvikDexModule::new(Arc::new(FakePlatform::default()), Arc::new(gateway));

        let areas = module
            .second_pass(&[
                primary(AreaType::Data, "/data"),
                area(AreaType::Data, "/mnt/expand/data"),
                primary(AreaType::DownloadCache, "/cache"),
            ])
            .await
            .expect("second pass");
        let paths: Vec<_> = areas.iter().map(|area| area.path.to_string()).collect();
        assert_eq!(
            paths,
            vec!["/data/dalvik-cache/arm64", "/cache/dalvik-cache/arm"]
        );
    }
}
