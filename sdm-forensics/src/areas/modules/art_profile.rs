// SPDX-License-Identifier: GPL-3.0-only

use std::sync::Arc;

use async_trait::async_trait;
use sdm_contracts::{DataAreaModule, LocalGateway, PlatformCapabilities, StorageError};
use sdm_types::{AreaType, GatewayMode, LocalPath, StorageArea};
use tracing::{debug, info, warn};

use super::private_data::MIRROR_API_LEVEL;

/// `ART_PROFILE`: reference and per-user current profiles (root only)
pub struct ArtProfileModule {
    platform: Arc<dyn PlatformCapabilities>,
    gateway: Arc<dyn LocalGateway>,
}

impl ArtProfileModule {
    pub fn new(platform: Arc<dyn PlatformCapabilities>, gateway: Arc<dyn LocalGateway>) -> Self {
        Self { platform, gateway }
    }

    fn candidates(&self, base: &LocalPath, reference: &str, current: &str) -> Vec<StorageArea> {
        let mut areas = vec![StorageArea::new(
            AreaType::ArtProfile,
            base.child(reference),
            self.platform.system_user(),
        )];
        for user in self.platform.all_users() {
            let id = user.id().to_string();
            areas.push(StorageArea::new(
                AreaType::ArtProfile,
                LocalPath::build(base, [current, id.as_str()]),
                user,
            ));
        }
        areas
    }

    async fn readable(&self, candidates: Vec<StorageArea>) -> Vec<StorageArea> {
        let mut areas = Vec::new();
        for area in candidates {
            match self.gateway.can_read(&area.path, GatewayMode::Root).await {
                Ok(true) => areas.push(area),
                Ok(false) => debug!("Can't read {}", area.path),
                Err(e) => warn!("Failed to check {}: {}", area.path, e),
            }
        }
        areas
    }
}

#[async_trait]
impl DataAreaModule for ArtProfileModule {
    fn name(&self) -> &'static str {
        "art-profile"
    }

    async fn second_pass(
        &self,
        first_pass: &[StorageArea],
    ) -> Result<Vec<StorageArea>, StorageError> {
        if !self.gateway.has_root().await {
            info!("No root, skipping ART profiles");
            return Ok(Vec::new());
        }

        let mirror = self.platform.data_mirror_dir();
        let candidates = if self.platform.api_level() >= MIRROR_API_LEVEL
            && self.gateway.exists(&mirror, GatewayMode::Root).await?
        {
            self.candidates(&mirror, "ref_profiles", "cur_profiles")
        } else {
            first_pass
                .iter()
                .filter(|area| area.area_type == AreaType::Data && area.is_primary())
                .flat_map(|data| {
                    let base = LocalPath::build(&data.path, ["misc", "profiles"]);
                    self.candidates(&base, "ref", "cur")
                })
                .collect()
        };
        Ok(self.readable(candidates).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeGateway, FakePlatform, primary};

    #[tokio::test]
    async fn mirror_profiles_are_used_when_present() {
        let gateway = FakeGateway::default().with_root();
        gateway
            .add_dir("/data_mirror/ref_profiles")
            .add_dir("/data_mirror/cur_profiles/0");
        let module = ArtProfileModule::new(Arc::new(FakePlatform::default()), Arc::new(gateway));

        let areas = module
            .second_pass(&[primary(AreaType::Data, "/data")])
            .await
            .expect("second pass");
        let paths: Vec<_> = areas.iter().map(|area| area.path.to_string()).collect();
        assert_eq!(
            paths,
            vec!["/data_mirror/ref_profiles", "/data_mirror/cur_profiles/0"]
        );
    }

    #[tokio::test]
    async fn legacy_profiles_live_below_primary_data() {
        let gateway = FakeGateway::default().with_root();
        gateway.add_dir("/data/misc/profiles/cur/0");
        let module = ArtProfileModule::new(Arc::new(FakePlatform::default()), Arc::new(gateway));

        let areas = module
            .second_pass(&[primary(AreaType::Data, "/data")])
            .await
            .expect("second pass");
        assert_eq!(areas.len(), 1);
        assert_eq!(areas[0].path, LocalPath::new("/data/misc/profiles/cur/0"));
    }
}
