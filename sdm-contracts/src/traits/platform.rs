// SPDX-License-Identifier: GPL-3.0-only

use sdm_types::{LocalPath, UserHandle};

/// Host facts the discovery and forensics layers depend on
///
/// Implementations are selected at compile time; nothing in the core queries
/// the host directly.
pub trait PlatformCapabilities: Send + Sync {
    /// Android API level; non-Android hosts report the level they emulate
    fn api_level(&self) -> u32;

    fn current_user(&self) -> UserHandle;

    fn system_user(&self) -> UserHandle {
        UserHandle::SYSTEM
    }

    fn all_users(&self) -> Vec<UserHandle>;

    fn has_multi_user_support(&self) -> bool {
        self.all_users().len() > 1
    }

    /// Architecture folder names as used under `dalvik-cache` and `oat`
    fn cpu_arch_folders(&self) -> Vec<String>;

    /// `/data` on a device
    fn data_dir(&self) -> LocalPath;

    /// Root of the `data_ce` / `data_de` / profile mirrors
    fn data_mirror_dir(&self) -> LocalPath {
        LocalPath::new("/data_mirror")
    }

    /// `/cache` on a device
    fn download_cache_dir(&self) -> LocalPath;

    /// Read-only system partitions such as `/system` and `/vendor`
    fn system_dirs(&self) -> Vec<LocalPath>;

    fn public_primary_storage(&self, user: UserHandle) -> Option<LocalPath>;

    fn public_secondary_storage(&self, user: UserHandle) -> Vec<LocalPath>;
}
