// SPDX-License-Identifier: GPL-3.0-only

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use sdm_types::{AreaType, MarkerFlag, Owner, PkgId, UserHandle};
use serde::Serialize;

use crate::error::Result;

/// Packages a marker attributes a path to
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct MarkerMatch {
    pub pkgs: BTreeSet<PkgId>,
    pub flags: BTreeSet<MarkerFlag>,
}

impl MarkerMatch {
    pub fn new(
        pkgs: impl IntoIterator<Item = PkgId>,
        flags: impl IntoIterator<Item = MarkerFlag>,
    ) -> Self {
        Self {
            pkgs: pkgs.into_iter().collect(),
            flags: flags.into_iter().collect(),
        }
    }

    pub fn to_owners(&self, user: Option<UserHandle>) -> Vec<Owner> {
        self.pkgs
            .iter()
            .map(|pkg| Owner {
                pkg_id: pkg.clone(),
                user_handle: user,
                flags: self.flags.clone(),
            })
            .collect()
    }
}

/// A clutter rule for one area type
///
/// `segments` is the literal location the marker describes, if it has one;
/// pattern-only markers return an empty slice.
pub trait Marker: Send + Sync + std::fmt::Debug {
    fn area_type(&self) -> AreaType;
    fn segments(&self) -> &[String];
    fn flags(&self) -> &BTreeSet<MarkerFlag>;
    /// The marker names exactly one location rather than a pattern
    fn is_direct_match(&self) -> bool;
    fn match_segments(&self, area_type: AreaType, segments: &[String]) -> Option<MarkerMatch>;
}

#[async_trait]
pub trait MarkerSource: Send + Sync {
    fn name(&self) -> &str;

    async fn markers_for_location(&self, area_type: AreaType) -> Result<Vec<Arc<dyn Marker>>>;

    async fn markers_for_pkg(&self, pkg_id: &PkgId) -> Result<Vec<Arc<dyn Marker>>>;

    async fn match_segments(
        &self,
        area_type: AreaType,
        segments: &[String],
    ) -> Result<Vec<MarkerMatch>> {
        Ok(self
            .markers_for_location(area_type)
            .await?
            .iter()
            .filter_map(|marker| marker.match_segments(area_type, segments))
            .collect())
    }
}
