// SPDX-License-Identifier: GPL-3.0-only

//! Low-level filesystem and platform operations
//!
//! This crate provides the pieces of the core that touch the host directly:
//! - [`ShellGateway`]: file lookups through plain I/O or a privileged shell
//! - Mount table parsing for secondary storage volumes
//! - [`PmPkgRepo`]: installed packages as reported by `pm`
//! - [`HostPlatform`]: API level, users, partitions and storage roots,
//!   selected at compile time for Android or a Linux development host

pub mod error;
pub mod gateway;
pub mod mounts;
pub mod packages;
pub mod platform;

pub use error::{Result, SysError};
pub use gateway::{ShellGateway, shell_quote};
pub use mounts::{MountEntry, parse_mount_info, read_mount_info};
pub use packages::{PmPkgRepo, StaticPkgRepo, parse_pm_listing};
pub use platform::{HostPlatform, LinuxPlatform, PlatformConfig, cpu_arch_folders};
#[cfg(target_os = "android")]
pub use platform::AndroidPlatform;
