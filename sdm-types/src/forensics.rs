// SPDX-License-Identifier: GPL-3.0-only

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::area::{AreaType, StorageArea};
use crate::path::LocalPath;
use crate::pkg::{Owner, merge_owners};
use crate::segments::Segments;
use crate::user::UserHandle;

/// Result of mapping one concrete path onto the area that contains it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AreaInfo {
    pub data_area: StorageArea,
    pub file: LocalPath,
    pub prefix: LocalPath,
    pub is_blacklist_location: bool,
}

impl AreaInfo {
    pub fn area_type(&self) -> AreaType {
        self.data_area.area_type
    }

    pub fn user_handle(&self) -> UserHandle {
        self.data_area.user_handle
    }

    /// Segments of `file` below `prefix`
    ///
    /// Empty when the prefix is not an ancestor of the file, which only
    /// happens for hand-built values.
    pub fn prefix_free_segments(&self) -> Segments {
        self.file.remove_prefix(&self.prefix).unwrap_or_default()
    }

    pub fn prefix_free_path(&self) -> String {
        self.prefix_free_segments().join("/")
    }

    /// First directory element below the prefix, the anchor for clutter lookups
    pub fn first_dir_element(&self) -> Option<String> {
        self.prefix_free_segments().into_iter().next()
    }
}

/// Ownership verdict of a CSI processor or sub-processor
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CsiResult {
    pub owners: BTreeSet<Owner>,
    /// The path is recognised as shared clutter without a single determinable owner
    pub has_known_unknown_owner: bool,
}

impl CsiResult {
    pub fn new(owners: impl IntoIterator<Item = Owner>) -> Self {
        Self {
            owners: merge_owners(owners),
            has_known_unknown_owner: false,
        }
    }

    pub fn known_unknown() -> Self {
        Self {
            owners: BTreeSet::new(),
            has_known_unknown_owner: true,
        }
    }

    /// Union owners (deduplicated by package) and OR the known-unknown flag
    pub fn merge(self, other: CsiResult) -> CsiResult {
        CsiResult {
            owners: merge_owners(self.owners.into_iter().chain(other.owners)),
            has_known_unknown_owner: self.has_known_unknown_owner || other.has_known_unknown_owner,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.owners.is_empty() && !self.has_known_unknown_owner
    }
}
