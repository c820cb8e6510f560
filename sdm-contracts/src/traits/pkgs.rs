// SPDX-License-Identifier: GPL-3.0-only

use async_trait::async_trait;

use sdm_types::{InstalledPkg, PkgId, UserHandle};

use crate::StorageError;

#[async_trait]
pub trait PkgRepo: Send + Sync {
    async fn current_pkgs(&self) -> Result<Vec<InstalledPkg>, StorageError>;

    /// `user == None` matches an install for any user
    async fn is_installed(
        &self,
        pkg_id: &PkgId,
        user: Option<UserHandle>,
    ) -> Result<bool, StorageError> {
        Ok(self
            .current_pkgs()
            .await?
            .iter()
            .any(|pkg| &pkg.id == pkg_id && user.is_none_or(|user| pkg.user_handle == user)))
    }
}
