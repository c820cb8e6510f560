// SPDX-License-Identifier: GPL-3.0-only

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::path::LocalPath;
use crate::user::UserHandle;

/// Android package name, e.g. `com.whatsapp`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PkgId(pub String);

impl PkgId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl From<&str> for PkgId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl std::fmt::Display for PkgId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Qualifiers attached to clutter markers and carried over to owners
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarkerFlag {
    /// User data worth keeping even if the owner is gone
    Keeper,
    /// Location shared by many apps, never a corpse on its own
    Common,
    /// Owner manages data on behalf of other apps
    Custodian,
}

/// A package attributed to a path
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Owner {
    pub pkg_id: PkgId,
    #[serde(default)]
    pub user_handle: Option<UserHandle>,
    #[serde(default)]
    pub flags: BTreeSet<MarkerFlag>,
}

impl Owner {
    pub fn new(pkg_id: PkgId) -> Self {
        Self {
            pkg_id,
            user_handle: None,
            flags: BTreeSet::new(),
        }
    }

    pub fn for_user(pkg_id: PkgId, user_handle: UserHandle) -> Self {
        Self {
            pkg_id,
            user_handle: Some(user_handle),
            flags: BTreeSet::new(),
        }
    }

    pub fn with_flags(mut self, flags: impl IntoIterator<Item = MarkerFlag>) -> Self {
        self.flags.extend(flags);
        self
    }

    pub fn has_flag(&self, flag: MarkerFlag) -> bool {
        self.flags.contains(&flag)
    }
}

/// Union owners, keeping one entry per package and user with merged flags
pub fn merge_owners<I>(owners: I) -> BTreeSet<Owner>
where
    I: IntoIterator<Item = Owner>,
{
    let mut merged: BTreeMap<(PkgId, Option<UserHandle>), BTreeSet<MarkerFlag>> = BTreeMap::new();
    for owner in owners {
        merged
            .entry((owner.pkg_id, owner.user_handle))
            .or_default()
            .extend(owner.flags);
    }

    merged
        .into_iter()
        .map(|((pkg_id, user_handle), flags)| Owner {
            pkg_id,
            user_handle,
            flags,
        })
        .collect()
}

/// Installed package as reported by the package repository
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstalledPkg {
    pub id: PkgId,
    pub user_handle: UserHandle,
    /// Location of the package's code (`base.apk` directory or the apk itself)
    #[serde(default)]
    pub source_dir: Option<LocalPath>,
}
