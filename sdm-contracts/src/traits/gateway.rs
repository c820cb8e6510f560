// SPDX-License-Identifier: GPL-3.0-only

use async_trait::async_trait;

use sdm_types::{GatewayMode, LocalPath, LookupInfo};

use crate::StorageError;

#[async_trait]
pub trait LocalGateway: Send + Sync {
    async fn exists(&self, path: &LocalPath, mode: GatewayMode) -> Result<bool, StorageError>;

    async fn can_read(&self, path: &LocalPath, mode: GatewayMode) -> Result<bool, StorageError>;

    async fn list_files(
        &self,
        path: &LocalPath,
        mode: GatewayMode,
    ) -> Result<Vec<LocalPath>, StorageError>;

    async fn lookup(&self, path: &LocalPath, mode: GatewayMode) -> Result<LookupInfo, StorageError>;

    async fn create_file(&self, path: &LocalPath, mode: GatewayMode) -> Result<(), StorageError>;

    async fn delete(
        &self,
        path: &LocalPath,
        mode: GatewayMode,
        recursive: bool,
    ) -> Result<(), StorageError>;

    async fn has_root(&self) -> bool;

    async fn has_adb(&self) -> bool;
}
