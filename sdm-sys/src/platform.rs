// SPDX-License-Identifier: GPL-3.0-only

//! Host platform facts
//!
//! [`HostPlatform`] resolves to [`AndroidPlatform`] when building for Android
//! and to [`LinuxPlatform`] everywhere else. The Linux variant treats
//! `storage_root` as the root of a device-like tree, which makes it usable
//! against a pulled device image or a test fixture.

use nix::unistd::getuid;
use sdm_contracts::PlatformCapabilities;
use sdm_types::{LocalPath, UserHandle};
use tracing::{debug, info};

use crate::mounts::{read_mount_info, secondary_volumes};

/// API level reported by non-Android hosts
pub const LINUX_API_LEVEL: u32 = 34;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformConfig {
    pub storage_root: LocalPath,
    /// Users to scan; empty means only the current user
    pub users: Vec<UserHandle>,
    pub api_level: Option<u32>,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            storage_root: LocalPath::root(),
            users: Vec::new(),
            api_level: None,
        }
    }
}

#[cfg(target_os = "android")]
pub type HostPlatform = AndroidPlatform;
#[cfg(not(target_os = "android"))]
pub type HostPlatform = LinuxPlatform;

#[derive(Debug, Clone)]
pub struct LinuxPlatform {
    root: LocalPath,
    api_level: u32,
    current_user: UserHandle,
    users: Vec<UserHandle>,
    secondary: Vec<LocalPath>,
}

impl LinuxPlatform {
    pub fn detect(config: &PlatformConfig) -> Self {
        let root = config.storage_root.clone();
        let secondary = match read_mount_info() {
            Ok(entries) => secondary_volumes(&entries, &root),
            Err(e) => {
                debug!("Mount table unavailable: {}", e);
                Vec::new()
            }
        };
        let secondary = if secondary.is_empty() {
            volume_dirs(&root.child("storage"))
        } else {
            secondary
        };

        let platform = Self::new(config, UserHandle::from_uid(getuid().as_raw()), secondary);
        info!(
            "Platform: root={}, api={}, user={}, users={:?}",
            platform.root, platform.api_level, platform.current_user, platform.users
        );
        platform
    }

    pub fn new(
        config: &PlatformConfig,
        current_user: UserHandle,
        secondary: Vec<LocalPath>,
    ) -> Self {
        let mut users = config.users.clone();
        if !users.contains(&current_user) {
            users.insert(0, current_user);
        }
        Self {
            root: config.storage_root.clone(),
            api_level: config.api_level.unwrap_or(LINUX_API_LEVEL),
            current_user,
            users,
            secondary,
        }
    }

    fn under_root(&self, parts: &[&str]) -> LocalPath {
        LocalPath::build(&self.root, parts)
    }
}

impl PlatformCapabilities for LinuxPlatform {
    fn api_level(&self) -> u32 {
        self.api_level
    }

    fn current_user(&self) -> UserHandle {
        self.current_user
    }

    fn all_users(&self) -> Vec<UserHandle> {
        self.users.clone()
    }

    fn cpu_arch_folders(&self) -> Vec<String> {
        cpu_arch_folders(std::env::consts::ARCH)
    }

    fn data_dir(&self) -> LocalPath {
        self.under_root(&["data"])
    }

    fn data_mirror_dir(&self) -> LocalPath {
        self.under_root(&["data_mirror"])
    }

    fn download_cache_dir(&self) -> LocalPath {
        self.under_root(&["cache"])
    }

    fn system_dirs(&self) -> Vec<LocalPath> {
        ["system", "vendor", "product"]
            .iter()
            .map(|name| self.under_root(&[*name]))
            .collect()
    }

    fn public_primary_storage(&self, user: UserHandle) -> Option<LocalPath> {
        let id = user.id();
        if id < 0 {
            return None;
        }
        let id = id.to_string();
        Some(self.under_root(&["storage", "emulated", id.as_str()]))
    }

    fn public_secondary_storage(&self, _user: UserHandle) -> Vec<LocalPath> {
        self.secondary.clone()
    }
}

/// Android device, reading the API level from system properties
#[cfg(target_os = "android")]
#[derive(Debug, Clone)]
pub struct AndroidPlatform {
    inner: LinuxPlatform,
}

#[cfg(target_os = "android")]
impl AndroidPlatform {
    pub fn detect(config: &PlatformConfig) -> Self {
        let api_level = config
            .api_level
            .or_else(|| system_property("ro.build.version.sdk")?.parse().ok());
        let config = PlatformConfig {
            storage_root: LocalPath::root(),
            api_level,
            ..config.clone()
        };
        Self {
            inner: LinuxPlatform::detect(&config),
        }
    }
}

#[cfg(target_os = "android")]
impl PlatformCapabilities for AndroidPlatform {
    fn api_level(&self) -> u32 {
        self.inner.api_level()
    }

    fn current_user(&self) -> UserHandle {
        self.inner.current_user()
    }

    fn all_users(&self) -> Vec<UserHandle> {
        self.inner.all_users()
    }

    fn cpu_arch_folders(&self) -> Vec<String> {
        self.inner.cpu_arch_folders()
    }

    fn data_dir(&self) -> LocalPath {
        self.inner.data_dir()
    }

    fn data_mirror_dir(&self) -> LocalPath {
        self.inner.data_mirror_dir()
    }

    fn download_cache_dir(&self) -> LocalPath {
        self.inner.download_cache_dir()
    }

    fn system_dirs(&self) -> Vec<LocalPath> {
        self.inner.system_dirs()
    }

    fn public_primary_storage(&self, user: UserHandle) -> Option<LocalPath> {
        self.inner.public_primary_storage(user)
    }

    fn public_secondary_storage(&self, user: UserHandle) -> Vec<LocalPath> {
        self.inner.public_secondary_storage(user)
    }
}

#[cfg(target_os = "android")]
fn system_property(name: &str) -> Option<String> {
    let name = std::ffi::CString::new(name).ok()?;
    let mut value = [0 as libc::c_char; libc::PROP_VALUE_MAX as usize];
    // SAFETY: `value` holds PROP_VALUE_MAX bytes as required by the bionic API.
    let len = unsafe { libc::__system_property_get(name.as_ptr(), value.as_mut_ptr()) };
    if len <= 0 {
        return None;
    }
    let bytes: Vec<u8> = value[..len as usize].iter().map(|c| *c as u8).collect();
    Some(String::from_utf8_lossy(&bytes).into_owned())
}

/// Folder names ART uses for `arch`, most specific first
pub fn cpu_arch_folders(arch: &str) -> Vec<String> {
    let folders: &[&str] = match arch {
        "aarch64" => &["arm64", "arm"],
        "arm" => &["arm"],
        "x86_64" => &["x86_64", "x86"],
        "x86" => &["x86"],
        "riscv64" => &["riscv64"],
        other => return vec![other.to_string()],
    };
    folders.iter().map(|folder| folder.to_string()).collect()
}

/// Volume-id named directories (`1A2B-3C4D`) below `storage`
fn volume_dirs(storage: &LocalPath) -> Vec<LocalPath> {
    let Ok(entries) = std::fs::read_dir(storage) else {
        return Vec::new();
    };
    let mut volumes: Vec<LocalPath> = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().map(|t| t.is_dir()).unwrap_or(false))
        .filter_map(|entry| entry.file_name().to_str().map(str::to_string))
        .filter(|name| is_volume_id(name))
        .map(|name| storage.child(name))
        .collect();
    volumes.sort();
    volumes
}

fn is_volume_id(name: &str) -> bool {
    let Some((head, tail)) = name.split_once('-') else {
        return false;
    };
    let hex = |part: &str| part.len() == 4 && part.chars().all(|c| c.is_ascii_hexdigit());
    hex(head) && hex(tail)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arch_folders_include_compat_abi() {
        assert_eq!(cpu_arch_folders("aarch64"), vec!["arm64", "arm"]);
        assert_eq!(cpu_arch_folders("x86"), vec!["x86"]);
        assert_eq!(cpu_arch_folders("mips"), vec!["mips"]);
    }

    #[test]
    fn volume_ids_are_two_hex_quads() {
        assert!(is_volume_id("1A2B-3C4D"));
        assert!(!is_volume_id("emulated"));
        assert!(!is_volume_id("1A2B-3C4"));
    }

    #[test]
    fn paths_are_resolved_below_the_storage_root() {
        let config = PlatformConfig {
            storage_root: LocalPath::new("/srv/device"),
            users: vec![UserHandle(10)],
            api_level: Some(29),
        };
        let platform = LinuxPlatform::new(
            &config,
            UserHandle::SYSTEM,
            vec![LocalPath::new("/srv/device/storage/1A2B-3C4D")],
        );

        assert_eq!(platform.api_level(), 29);
        assert_eq!(platform.all_users(), vec![UserHandle::SYSTEM, UserHandle(10)]);
        assert!(platform.has_multi_user_support());
        assert_eq!(platform.data_dir(), LocalPath::new("/srv/device/data"));
        assert_eq!(
            platform.public_primary_storage(UserHandle(10)),
            Some(LocalPath::new("/srv/device/storage/emulated/10"))
        );
        assert_eq!(platform.public_primary_storage(UserHandle::ALL), None);
        assert_eq!(
            platform.data_mirror_dir(),
            LocalPath::new("/srv/device/data_mirror")
        );
    }
}
