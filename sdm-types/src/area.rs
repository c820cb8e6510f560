// SPDX-License-Identifier: GPL-3.0-only

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::path::LocalPath;
use crate::user::UserHandle;

/// Logical, typed region of the device filesystem
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AreaType {
    Sdcard,
    PublicData,
    PublicMedia,
    PublicObb,
    Portable,
    PrivateData,
    Data,
    DataSystem,
    DataSystemCe,
    DataSystemDe,
    DataSdext2,
    DataVendor,
    DataMisc,
    DownloadCache,
    DalvikDex,
    DalvikProfile,
    ArtProfile,
    AppApp,
    AppAppPrivate,
    AppLib,
    AppAsec,
    System,
    SystemApp,
    SystemPrivApp,
    Oem,
}

impl AreaType {
    pub const ALL: [AreaType; 25] = [
        Self::Sdcard,
        Self::PublicData,
        Self::PublicMedia,
        Self::PublicObb,
        Self::Portable,
        Self::PrivateData,
        Self::Data,
        Self::DataSystem,
        Self::DataSystemCe,
        Self::DataSystemDe,
        Self::DataSdext2,
        Self::DataVendor,
        Self::DataMisc,
        Self::DownloadCache,
        Self::DalvikDex,
        Self::DalvikProfile,
        Self::ArtProfile,
        Self::AppApp,
        Self::AppAppPrivate,
        Self::AppLib,
        Self::AppAsec,
        Self::System,
        Self::SystemApp,
        Self::SystemPrivApp,
        Self::Oem,
    ];

    /// Public storage is backed by case-insensitive filesystems (sdcardfs/fuse/vfat)
    pub fn is_case_insensitive(self) -> bool {
        matches!(
            self,
            Self::Sdcard | Self::PublicData | Self::PublicMedia | Self::PublicObb | Self::Portable
        )
    }

    pub fn is_public(self) -> bool {
        self.is_case_insensitive()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sdcard => "SDCARD",
            Self::PublicData => "PUBLIC_DATA",
            Self::PublicMedia => "PUBLIC_MEDIA",
            Self::PublicObb => "PUBLIC_OBB",
            Self::Portable => "PORTABLE",
            Self::PrivateData => "PRIVATE_DATA",
            Self::Data => "DATA",
            Self::DataSystem => "DATA_SYSTEM",
            Self::DataSystemCe => "DATA_SYSTEM_CE",
            Self::DataSystemDe => "DATA_SYSTEM_DE",
            Self::DataSdext2 => "DATA_SDEXT2",
            Self::DataVendor => "DATA_VENDOR",
            Self::DataMisc => "DATA_MISC",
            Self::DownloadCache => "DOWNLOAD_CACHE",
            Self::DalvikDex => "DALVIK_DEX",
            Self::DalvikProfile => "DALVIK_PROFILE",
            Self::ArtProfile => "ART_PROFILE",
            Self::AppApp => "APP_APP",
            Self::AppAppPrivate => "APP_APP_PRIVATE",
            Self::AppLib => "APP_LIB",
            Self::AppAsec => "APP_ASEC",
            Self::System => "SYSTEM",
            Self::SystemApp => "SYSTEM_APP",
            Self::SystemPrivApp => "SYSTEM_PRIV_APP",
            Self::Oem => "OEM",
        }
    }
}

impl std::fmt::Display for AreaType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AreaFlag {
    /// The device's primary instance of this area type for the user
    Primary,
    Emulated,
}

/// One discovered storage area
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StorageArea {
    #[serde(rename = "type")]
    pub area_type: AreaType,
    pub path: LocalPath,
    pub user_handle: UserHandle,
    #[serde(default)]
    pub flags: BTreeSet<AreaFlag>,
    #[serde(default)]
    pub label: Option<String>,
}

impl StorageArea {
    pub fn new(area_type: AreaType, path: LocalPath, user_handle: UserHandle) -> Self {
        Self {
            area_type,
            path,
            user_handle,
            flags: BTreeSet::new(),
            label: None,
        }
    }

    pub fn with_flags(mut self, flags: impl IntoIterator<Item = AreaFlag>) -> Self {
        self.flags.extend(flags);
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn has_flag(&self, flag: AreaFlag) -> bool {
        self.flags.contains(&flag)
    }

    pub fn is_primary(&self) -> bool {
        self.has_flag(AreaFlag::Primary)
    }

    /// Identity used for deduplication within one discovery pass
    pub fn key(&self) -> (AreaType, UserHandle, &LocalPath) {
        (self.area_type, self.user_handle, &self.path)
    }
}

impl std::fmt::Display for StorageArea {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}({}, user={}, flags={:?})",
            self.area_type, self.path, self.user_handle, self.flags
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn area_type_uses_screaming_case_on_the_wire() {
        let json = serde_json::to_string(&AreaType::PublicMedia).expect("serialize area type");
        assert_eq!(json, "\"PUBLIC_MEDIA\"");
        for area_type in AreaType::ALL {
            let json = serde_json::to_string(&area_type).expect("serialize area type");
            assert_eq!(json, format!("\"{}\"", area_type.as_str()));
        }
    }
}
