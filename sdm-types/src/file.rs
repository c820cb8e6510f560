// SPDX-License-Identifier: GPL-3.0-only

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::path::LocalPath;

/// How the local gateway reaches the filesystem
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum GatewayMode {
    /// Plain I/O with the privileges of this process
    Normal,
    /// Through the root shell
    Root,
    /// Through the ADB shell
    Adb,
    /// Plain I/O first, escalating to root then ADB when available
    Auto,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileType {
    File,
    Directory,
    Symlink,
    Unknown,
}

/// Stat result for a single path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LookupInfo {
    pub path: LocalPath,
    pub file_type: FileType,
    pub size: u64,
    pub modified_at: Option<DateTime<Utc>>,
}

impl LookupInfo {
    pub fn is_directory(&self) -> bool {
        self.file_type == FileType::Directory
    }
}
