// SPDX-License-Identifier: GPL-3.0-only

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use regex::{Regex, RegexBuilder};
use sdm_types::segments::{self, Segments};
use sdm_types::{AreaType, MarkerFlag, PkgId};

use super::marker::{Marker, MarkerMatch, MarkerSource};
use crate::error::{ForensicsError, Result};

/// Packages whose data lives in a folder tree named after the package
///
/// `<base>/com/example/app` or `<base>/com.example.app`: a good pattern's
/// first capture group names the package, with `/` read as `.`. Bad patterns
/// veto a good match.
pub struct NestedPackageMatcher {
    name: String,
    area_type: AreaType,
    base: Segments,
    marker: Arc<NestedMarker>,
    by_pkg: Mutex<HashMap<PkgId, Vec<Arc<dyn Marker>>>>,
}

#[derive(Debug)]
struct NestedMarker {
    area_type: AreaType,
    base: Segments,
    good: Vec<Regex>,
    bad: Vec<Regex>,
    flags: BTreeSet<MarkerFlag>,
}

impl NestedPackageMatcher {
    pub fn new(
        name: impl Into<String>,
        area_type: AreaType,
        base: &[&str],
        good: &[&str],
        bad: &[&str],
        flags: impl IntoIterator<Item = MarkerFlag>,
    ) -> Result<Self> {
        let name = name.into();
        let invalid = |reason: &str| ForensicsError::InvalidMarker {
            index: 0,
            reason: format!("{name}: {reason}"),
        };
        if base.is_empty() || base.iter().any(|segment| segment.is_empty()) {
            return Err(invalid("base path is empty"));
        }
        if base.iter().any(|segment| segment.contains('/')) {
            return Err(invalid("base segments must not contain '/'"));
        }
        if good.is_empty() || good[0].is_empty() {
            return Err(invalid("no good patterns"));
        }

        let ignore_case = area_type.is_case_insensitive();
        let compile = |patterns: &[&str]| -> Result<Vec<Regex>> {
            patterns
                .iter()
                .map(|pattern| -> Result<Regex> {
                    Ok(RegexBuilder::new(&format!("^(?:{pattern})$"))
                        .case_insensitive(ignore_case)
                        .build()?)
                })
                .collect()
        };
        let base: Segments = base.iter().map(|segment| segment.to_string()).collect();
        let marker = NestedMarker {
            area_type,
            base: base.clone(),
            good: compile(good)?,
            bad: compile(bad)?,
            flags: flags.into_iter().collect(),
        };

        Ok(Self {
            name,
            area_type,
            base,
            marker: Arc::new(marker),
            by_pkg: Mutex::new(HashMap::new()),
        })
    }
}

impl Marker for NestedMarker {
    fn area_type(&self) -> AreaType {
        self.area_type
    }

    fn segments(&self) -> &[String] {
        &self.base
    }

    fn flags(&self) -> &BTreeSet<MarkerFlag> {
        &self.flags
    }

    fn is_direct_match(&self) -> bool {
        false
    }

    fn match_segments(&self, _area_type: AreaType, other: &[String]) -> Option<MarkerMatch> {
        if !segments::is_ancestor_of(&self.base, other, self.area_type.is_case_insensitive()) {
            return None;
        }
        let joined = segments::join_segments(other);
        let captures = self.good.iter().find_map(|regex| regex.captures(&joined))?;
        if self.bad.iter().any(|regex| regex.is_match(&joined)) {
            return None;
        }
        let pkg = captures.get(1)?.as_str().replace('/', ".");
        Some(MarkerMatch::new([PkgId::new(pkg)], self.flags.iter().copied()))
    }
}

/// Exact location of one package's folder below the base
#[derive(Debug)]
struct PackageMarker {
    area_type: AreaType,
    segments: Segments,
    pkg_id: PkgId,
    flags: BTreeSet<MarkerFlag>,
}

impl Marker for PackageMarker {
    fn area_type(&self) -> AreaType {
        self.area_type
    }

    fn segments(&self) -> &[String] {
        &self.segments
    }

    fn flags(&self) -> &BTreeSet<MarkerFlag> {
        &self.flags
    }

    fn is_direct_match(&self) -> bool {
        true
    }

    fn match_segments(&self, area_type: AreaType, other: &[String]) -> Option<MarkerMatch> {
        if area_type != self.area_type
            || !segments::matches(other, &self.segments, area_type.is_case_insensitive())
        {
            return None;
        }
        Some(MarkerMatch::new([self.pkg_id.clone()], []))
    }
}

#[async_trait]
impl MarkerSource for NestedPackageMatcher {
    fn name(&self) -> &str {
        &self.name
    }

    async fn markers_for_location(&self, area_type: AreaType) -> Result<Vec<Arc<dyn Marker>>> {
        if area_type != self.area_type {
            return Ok(Vec::new());
        }
        Ok(vec![self.marker.clone() as Arc<dyn Marker>])
    }

    async fn markers_for_pkg(&self, pkg_id: &PkgId) -> Result<Vec<Arc<dyn Marker>>> {
        let mut cache = self
            .by_pkg
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let markers = cache.entry(pkg_id.clone()).or_insert_with(|| {
            let mut segments = self.base.clone();
            segments.extend(pkg_id.name().split('.').map(str::to_string));
            vec![Arc::new(PackageMarker {
                area_type: self.area_type,
                segments,
                pkg_id: pkg_id.clone(),
                flags: BTreeSet::new(),
            }) as Arc<dyn Marker>]
        });
        Ok(markers.clone())
    }
}

/// Nested package layouts seen in the wild
pub fn default_nested_matchers() -> Result<Vec<NestedPackageMatcher>> {
    Ok(vec![
        NestedPackageMatcher::new(
            "sdcard-data",
            AreaType::Sdcard,
            &["data"],
            &[r"data/((?:\w+\.)+\w+)"],
            &[],
            [],
        )?,
        NestedPackageMatcher::new(
            "sdcard-backups",
            AreaType::Sdcard,
            &["backups", "apps"],
            &[r"backups/apps/((?:\w+\.)+\w+)"],
            &[],
            [MarkerFlag::Keeper],
        )?,
    ])
}
