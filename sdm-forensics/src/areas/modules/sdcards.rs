// SPDX-License-Identifier: GPL-3.0-only

use std::sync::Arc;

use async_trait::async_trait;
use sdm_contracts::{DataAreaModule, LocalGateway, PlatformCapabilities, StorageError};
use sdm_types::{AreaFlag, AreaType, GatewayMode, LocalPath, StorageArea};
use tracing::{debug, error, trace, warn};
use uuid::Uuid;

const TEST_FILE_PREFIX: &str = ".sdm-area-access";

/// `SDCARD`: the current user's primary public storage and any secondary volumes
///
/// A volume only becomes an area if a test file can be created on it through
/// plain I/O, ADB or root, in that order.
pub struct SdcardsModule {
    platform: Arc<dyn PlatformCapabilities>,
    gateway: Arc<dyn LocalGateway>,
}

impl SdcardsModule {
    pub fn new(platform: Arc<dyn PlatformCapabilities>, gateway: Arc<dyn LocalGateway>) -> Self {
        Self { platform, gateway }
    }

    async fn is_accessible(&self, path: &LocalPath) -> bool {
        if self.probe(path, GatewayMode::Normal).await {
            return true;
        }
        if self.gateway.has_adb().await && self.probe(path, GatewayMode::Adb).await {
            return true;
        }
        if self.gateway.has_root().await && self.probe(path, GatewayMode::Root).await {
            return true;
        }
        debug!("{} is not accessible", path);
        false
    }

    async fn probe(&self, path: &LocalPath, mode: GatewayMode) -> bool {
        let tag = format!("{mode:?}").to_lowercase();
        let test_file = path.child(format!("{TEST_FILE_PREFIX}-{tag}-{}", Uuid::new_v4().simple()));

        let created = match self.gateway.create_file(&test_file, mode).await {
            Ok(()) => self.gateway.exists(&test_file, mode).await.unwrap_or(false),
            Err(e) => {
                warn!("Couldn't create {} ({:?}): {}", test_file, mode, e);
                false
            }
        };

        if created {
            trace!("{} is accessible via {:?}", path, mode);
            if let Err(e) = self.gateway.delete(&test_file, mode, false).await {
                error!("Clean up of {} ({:?}) failed: {}", test_file, mode, e);
            }
        }
        created
    }
}

#[async_trait]
impl DataAreaModule for SdcardsModule {
    fn name(&self) -> &'static str {
        "sdcards"
    }

    async fn first_pass(&self) -> Result<Vec<StorageArea>, StorageError> {
        let user = self.platform.current_user();
        let mut sdcards = Vec::new();

        if let Some(primary) = self.platform.public_primary_storage(user) {
            if self.is_accessible(&primary).await {
                sdcards.push(
                    StorageArea::new(AreaType::Sdcard, primary, user)
                        .with_flags([AreaFlag::Primary, AreaFlag::Emulated]),
                );
            }
        }

        // Secondary volumes are shared between users
        for volume in self.platform.public_secondary_storage(user) {
            if self.is_accessible(&volume).await {
                sdcards.push(StorageArea::new(
                    AreaType::Sdcard,
                    volume,
                    self.platform.system_user(),
                ));
            }
        }

        debug!("Sdcards: {:?}", sdcards);
        Ok(sdcards)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeGateway, FakePlatform};

    fn platform() -> Arc<FakePlatform> {
        Arc::new(FakePlatform {
            secondary: vec![LocalPath::new("/storage/1A2B-3C4D")],
            ..FakePlatform::default()
        })
    }

    #[tokio::test]
    async fn writable_volumes_become_areas_and_probes_are_cleaned_up() {
        let gateway = FakeGateway::default();
        gateway
            .add_dir("/storage/emulated/0")
            .add_dir("/storage/1A2B-3C4D");
        let module = SdcardsModule::new(platform(), Arc::new(gateway.clone()));

        let areas = module.first_pass().await.expect("first pass");
        assert_eq!(areas.len(), 2);
        assert!(areas[0].is_primary());
        assert_eq!(areas[1].path, LocalPath::new("/storage/1A2B-3C4D"));
        assert!(!areas[1].is_primary());

        assert_eq!(gateway.deleted().len(), 2);
        assert!(gateway.deleted().iter().all(|path| path.name().starts_with(TEST_FILE_PREFIX)));
    }

    #[tokio::test]
    async fn root_is_tried_when_plain_access_is_denied() {
        let gateway = FakeGateway::default();
        gateway.add_dir("/storage/emulated/0");
        gateway.deny_write("/storage/1A2B-3C4D", GatewayMode::Normal);
        let module = SdcardsModule::new(platform(), Arc::new(gateway.clone()));
        let areas = module.first_pass().await.expect("first pass");
        assert_eq!(areas.len(), 1);

        let gateway = gateway.with_root();
        let module = SdcardsModule::new(platform(), Arc::new(gateway));
        let areas = module.first_pass().await.expect("first pass");
        assert_eq!(areas.len(), 2);
    }
}
