// SPDX-License-Identifier: GPL-3.0-only

use async_trait::async_trait;

use sdm_types::{ShellMode, ShellOpsCmd, ShellOpsResult};

use crate::StorageError;

/// Runs command lines through the backend of the requested privilege mode
#[async_trait]
pub trait ShellExecutor: Send + Sync {
    async fn execute(
        &self,
        cmd: ShellOpsCmd,
        mode: ShellMode,
    ) -> Result<ShellOpsResult, StorageError>;
}

#[async_trait]
pub trait PrivilegeProbe: Send + Sync {
    async fn can_use_root_now(&self) -> bool;

    async fn can_use_adb_now(&self) -> bool;
}
