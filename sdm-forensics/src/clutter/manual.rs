// SPDX-License-Identifier: GPL-3.0-only

//! Hand-curated clutter markers loaded from JSON
//!
//! ```json
//! [{"pkgs": ["com.whatsapp"], "mrks": [{"loc": "SDCARD", "path": "WhatsApp", "flags": ["keeper"]}]}]
//! ```
//!
//! A group names its packages literally (`pkgs`) or as patterns matched
//! against installed packages (`regexPkgs`). Each marker needs at least one of
//! `path` (segment-exact), `contains` (substring of the joined path) or
//! `regex` (full match of the joined path).

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use regex::{Regex, RegexBuilder};
use sdm_contracts::PkgRepo;
use sdm_types::segments::{self, Segments};
use sdm_types::{AreaType, MarkerFlag, PkgId};
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use tracing::{debug, info, trace, warn};

use super::marker::{Marker, MarkerMatch, MarkerSource};
use crate::error::{ForensicsError, Result};

const BUNDLED_MARKERS: &str = include_str!("../../assets/clutter/db_clutter_markers.json");

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JsonMarkerGroup {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pkgs: Option<Vec<String>>,
    #[serde(default, rename = "regexPkgs", skip_serializing_if = "Option::is_none")]
    pub regex_pkgs: Option<Vec<String>>,
    #[serde(default)]
    pub mrks: Vec<JsonMarker>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JsonMarker {
    pub loc: AreaType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contains: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regex: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flags: Option<BTreeSet<MarkerFlag>>,
}

/// Parses and validates marker groups; `index` in errors is 1-based
pub fn parse_marker_groups(json: &str) -> Result<Vec<JsonMarkerGroup>> {
    let groups: Vec<JsonMarkerGroup> = serde_json::from_str(json)?;
    for (position, group) in groups.iter().enumerate() {
        validate_group(position + 1, group)?;
    }
    Ok(groups)
}

fn validate_group(index: usize, group: &JsonMarkerGroup) -> Result<()> {
    let invalid = |reason: &str| ForensicsError::InvalidMarker {
        index,
        reason: reason.to_string(),
    };

    let has_pkgs = group.pkgs.as_ref().is_some_and(|pkgs| !pkgs.is_empty());
    let has_regex_pkgs = group.regex_pkgs.as_ref().is_some_and(|pkgs| !pkgs.is_empty());
    if !has_pkgs && !has_regex_pkgs {
        return Err(invalid("no pkgs defined"));
    }
    if group.mrks.is_empty() {
        return Err(invalid("no markers defined"));
    }
    for marker in &group.mrks {
        if marker.path.is_none() && marker.contains.is_none() && marker.regex.is_none() {
            return Err(invalid("marker without path, contains or regex"));
        }
        if marker.path.as_deref().is_some_and(str::is_empty) {
            return Err(invalid("empty marker path"));
        }
    }
    Ok(())
}

fn full_match(pattern: &str, ignore_case: bool) -> Result<Regex> {
    Ok(RegexBuilder::new(&format!("^(?:{pattern})$"))
        .case_insensitive(ignore_case)
        .build()?)
}

/// A single marker from a JSON group
#[derive(Debug)]
pub struct ManualMarker {
    pkgs: BTreeSet<PkgId>,
    area_type: AreaType,
    segments: Option<Segments>,
    contains: Option<String>,
    regex: Option<Regex>,
    flags: BTreeSet<MarkerFlag>,
}

impl ManualMarker {
    fn compile(pkgs: BTreeSet<PkgId>, raw: &JsonMarker) -> Result<Self> {
        let ignore_case = raw.loc.is_case_insensitive();
        Ok(Self {
            pkgs,
            area_type: raw.loc,
            segments: raw.path.as_deref().map(segments::to_segs),
            contains: raw.contains.clone(),
            regex: raw
                .regex
                .as_deref()
                .map(|pattern| full_match(pattern, ignore_case))
                .transpose()?,
            flags: raw.flags.clone().unwrap_or_default(),
        })
    }

    fn identity(&self) -> (AreaType, Option<&Segments>, Option<&str>, Option<&str>) {
        (
            self.area_type,
            self.segments.as_ref(),
            self.contains.as_deref(),
            self.regex.as_ref().map(Regex::as_str),
        )
    }
}

impl Marker for ManualMarker {
    fn area_type(&self) -> AreaType {
        self.area_type
    }

    fn segments(&self) -> &[String] {
        self.segments.as_deref().unwrap_or(&[])
    }

    fn flags(&self) -> &BTreeSet<MarkerFlag> {
        &self.flags
    }

    fn is_direct_match(&self) -> bool {
        self.segments.is_some() && self.contains.is_none() && self.regex.is_none()
    }

    fn match_segments(&self, area_type: AreaType, other: &[String]) -> Option<MarkerMatch> {
        if area_type != self.area_type {
            return None;
        }
        let ignore_case = area_type.is_case_insensitive();

        if let Some(expected) = &self.segments {
            if !segments::matches(other, expected, ignore_case) {
                return None;
            }
        }

        let joined = segments::join_segments(other);
        if let Some(needle) = &self.contains {
            let found = if ignore_case {
                joined.to_lowercase().contains(&needle.to_lowercase())
            } else {
                joined.contains(needle.as_str())
            };
            if !found {
                return None;
            }
        }
        if let Some(regex) = &self.regex {
            if !regex.is_match(&joined) {
                return None;
            }
        }

        Some(MarkerMatch {
            pkgs: self.pkgs.clone(),
            flags: self.flags.clone(),
        })
    }
}

#[derive(Default)]
struct MarkerDatabase {
    markers: Vec<Arc<ManualMarker>>,
    by_pkg: BTreeMap<PkgId, Vec<Arc<ManualMarker>>>,
}

/// Marker source backed by JSON marker groups
///
/// The package index is built on first use, expanding `regexPkgs` against the
/// packages installed at that time.
pub struct ManualMarkerSource {
    name: String,
    pkg_repo: Arc<dyn PkgRepo>,
    groups: Vec<JsonMarkerGroup>,
    database: OnceCell<MarkerDatabase>,
    by_location: Mutex<HashMap<AreaType, Vec<Arc<dyn Marker>>>>,
}

impl ManualMarkerSource {
    pub fn new(
        name: impl Into<String>,
        pkg_repo: Arc<dyn PkgRepo>,
        groups: Vec<JsonMarkerGroup>,
    ) -> Result<Self> {
        for (position, group) in groups.iter().enumerate() {
            validate_group(position + 1, group)?;
        }
        Ok(Self {
            name: name.into(),
            pkg_repo,
            groups,
            database: OnceCell::new(),
            by_location: Mutex::new(HashMap::new()),
        })
    }

    pub fn from_json(
        name: impl Into<String>,
        pkg_repo: Arc<dyn PkgRepo>,
        json: &str,
    ) -> Result<Self> {
        Self::new(name, pkg_repo, parse_marker_groups(json)?)
    }

    /// Markers shipped with the crate
    pub fn bundled(pkg_repo: Arc<dyn PkgRepo>) -> Result<Self> {
        Self::from_json("bundled", pkg_repo, BUNDLED_MARKERS)
    }

    async fn database(&self) -> Result<&MarkerDatabase> {
        self.database
            .get_or_try_init(|| async { self.build_database().await })
            .await
    }

    async fn build_database(&self) -> Result<MarkerDatabase> {
        debug!("{}: building marker database from {} groups", self.name, self.groups.len());
        let has_regex_pkgs = self.groups.iter().any(|group| group.regex_pkgs.is_some());
        let installed = if has_regex_pkgs {
            self.pkg_repo.current_pkgs().await?
        } else {
            Vec::new()
        };

        let mut database = MarkerDatabase::default();
        for group in &self.groups {
            let mut raw_pkgs: Vec<String> = Vec::new();
            let mut push_pkg = |pkg: &str| {
                if raw_pkgs.iter().any(|known| known == pkg) {
                    warn!("Package defined multiple times: {}", pkg);
                } else {
                    raw_pkgs.push(pkg.to_string());
                }
            };
            for pkg in group.pkgs.iter().flatten() {
                push_pkg(pkg);
            }
            if let Some(patterns) = &group.regex_pkgs {
                for pattern in patterns {
                    let regex = full_match(pattern, false)?;
                    for pkg in installed.iter().filter(|pkg| regex.is_match(pkg.id.name())) {
                        trace!("Regex package match: {} by {}", pkg.id, pattern);
                        push_pkg(pkg.id.name());
                    }
                }
                // Keep the markers reachable for corpse detection when nothing matched
                if raw_pkgs.is_empty() {
                    raw_pkgs.extend(patterns.iter().cloned());
                }
            }

            let pkgs: BTreeSet<PkgId> = raw_pkgs.into_iter().map(PkgId::new).collect();
            let mut markers: Vec<Arc<ManualMarker>> = Vec::new();
            for raw in &group.mrks {
                let marker = ManualMarker::compile(pkgs.clone(), raw)?;
                if markers.iter().any(|known| known.identity() == marker.identity()) {
                    warn!("Duplicate marker: {:?}", marker);
                    continue;
                }
                markers.push(Arc::new(marker));
            }

            for pkg in &pkgs {
                let entry = database.by_pkg.entry(pkg.clone()).or_default();
                if !entry.is_empty() {
                    warn!("Package '{}' is defined multiple times, merging markers", pkg);
                }
                entry.extend(markers.iter().cloned());
            }
            database.markers.extend(markers);
        }

        info!(
            "{}: marker data ready ({} pkgs, {} markers)",
            self.name,
            database.by_pkg.len(),
            database.markers.len()
        );
        Ok(database)
    }
}

#[async_trait]
impl MarkerSource for ManualMarkerSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn markers_for_location(&self, area_type: AreaType) -> Result<Vec<Arc<dyn Marker>>> {
        if let Some(cached) = self
            .by_location
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(&area_type)
        {
            return Ok(cached.clone());
        }

        let markers: Vec<Arc<dyn Marker>> = self
            .database()
            .await?
            .markers
            .iter()
            .filter(|marker| marker.area_type == area_type)
            .map(|marker| marker.clone() as Arc<dyn Marker>)
            .collect();
        trace!("{}: {} markers for {}", self.name, markers.len(), area_type);

        self.by_location
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(area_type, markers.clone());
        Ok(markers)
    }

    async fn markers_for_pkg(&self, pkg_id: &PkgId) -> Result<Vec<Arc<dyn Marker>>> {
        Ok(self
            .database()
            .await?
            .by_pkg
            .get(pkg_id)
            .map(|markers| {
                markers
                    .iter()
                    .map(|marker| marker.clone() as Arc<dyn Marker>)
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakePkgRepo;

    fn source(json: &str, repo: FakePkgRepo) -> ManualMarkerSource {
        ManualMarkerSource::from_json("test", Arc::new(repo), json).expect("valid markers")
    }

    fn segs(raw: &str) -> Segments {
        segments::to_segs(raw)
    }

    #[tokio::test]
    async fn path_markers_match_whole_segments_case_insensitively_on_public_storage() {
        let source = source(
            r#"[{"pkgs": ["com.whatsapp"], "mrks": [{"loc": "SDCARD", "path": "WhatsApp", "flags": ["keeper"]}]}]"#,
            FakePkgRepo::default(),
        );

        let matches = source
            .match_segments(AreaType::Sdcard, &segs("whatsapp"))
            .await
            .expect("match");
        assert_eq!(
            matches,
            vec![MarkerMatch::new([PkgId::new("com.whatsapp")], [MarkerFlag::Keeper])]
        );

        assert!(
            source
                .match_segments(AreaType::Sdcard, &segs("WhatsAppBackup"))
                .await
                .expect("match")
                .is_empty()
        );
        assert!(
            source
                .match_segments(AreaType::PublicData, &segs("WhatsApp"))
                .await
                .expect("match")
                .is_empty()
        );
    }

    #[tokio::test]
    async fn all_present_conditions_must_hold() {
        let source = source(
            r#"[{"pkgs": ["com.teslacoilsw.launcher"], "mrks": [
                {"loc": "SDCARD", "contains": ".novabackup", "regex": "Backup/.+?\\.novabackup"}
            ]}]"#,
            FakePkgRepo::default(),
        );

        let hit = source
            .match_segments(AreaType::Sdcard, &segs("Backup/home.novabackup"))
            .await
            .expect("match");
        assert_eq!(hit.len(), 1);

        let miss = source
            .match_segments(AreaType::Sdcard, &segs("Other/home.novabackup"))
            .await
            .expect("match");
        assert!(miss.is_empty());
    }

    #[tokio::test]
    async fn regex_pkgs_expand_against_installed_packages() {
        let repo = FakePkgRepo::default()
            .with("com.lge.theme.black")
            .with("org.example");
        let source = source(
            r#"[{"regexPkgs": ["com\\.lge\\.theme\\..+"], "mrks": [{"loc": "SDCARD", "path": "LGTheme"}]}]"#,
            repo,
        );

        let matches = source
            .match_segments(AreaType::Sdcard, &segs("LGTheme"))
            .await
            .expect("match");
        assert_eq!(matches[0].pkgs, BTreeSet::from([PkgId::new("com.lge.theme.black")]));

        let markers = source
            .markers_for_pkg(&PkgId::new("com.lge.theme.black"))
            .await
            .expect("markers");
        assert_eq!(markers.len(), 1);
        assert!(markers[0].is_direct_match());
    }

    #[tokio::test]
    async fn unmatched_regex_pkgs_keep_the_pattern_as_owner() {
        let source = source(
            r#"[{"regexPkgs": ["com\\.gone\\..+"], "mrks": [{"loc": "SDCARD", "path": "Gone"}]}]"#,
            FakePkgRepo::default(),
        );
        let matches = source
            .match_segments(AreaType::Sdcard, &segs("Gone"))
            .await
            .expect("match");
        assert_eq!(matches[0].pkgs, BTreeSet::from([PkgId::new("com\\.gone\\..+")]));
    }

    #[tokio::test]
    async fn duplicate_packages_are_merged() {
        let source = source(
            r#"[
                {"pkgs": ["com.whatsapp"], "mrks": [{"loc": "SDCARD", "path": "WhatsApp"}]},
                {"pkgs": ["com.whatsapp"], "mrks": [{"loc": "PUBLIC_MEDIA", "path": "com.whatsapp"}]}
            ]"#,
            FakePkgRepo::default(),
        );
        let markers = source
            .markers_for_pkg(&PkgId::new("com.whatsapp"))
            .await
            .expect("markers");
        assert_eq!(markers.len(), 2);
        assert_eq!(
            source
                .markers_for_location(AreaType::PublicMedia)
                .await
                .expect("markers")
                .len(),
            1
        );
    }

    #[test]
    fn invalid_groups_are_rejected() {
        let no_pkgs = r#"[{"mrks": [{"loc": "SDCARD", "path": "x"}]}]"#;
        assert!(matches!(
            parse_marker_groups(no_pkgs),
            Err(ForensicsError::InvalidMarker { index: 1, .. })
        ));

        let no_markers = r#"[{"pkgs": ["a.b"], "mrks": []}]"#;
        assert!(parse_marker_groups(no_markers).is_err());

        let no_condition = r#"[{"pkgs": ["a.b"], "mrks": [{"loc": "SDCARD", "flags": ["keeper"]}]}]"#;
        assert!(parse_marker_groups(no_condition).is_err());

        let unknown_area = r#"[{"pkgs": ["a.b"], "mrks": [{"loc": "NOWHERE", "path": "x"}]}]"#;
        assert!(matches!(
            parse_marker_groups(unknown_area),
            Err(ForensicsError::Json(_))
        ));
    }

    #[tokio::test]
    async fn bundled_markers_load() {
        let source =
            ManualMarkerSource::bundled(Arc::new(FakePkgRepo::default())).expect("bundled");
        let matches = source
            .match_segments(AreaType::Sdcard, &segs("WhatsApp"))
            .await
            .expect("match");
        assert!(
            matches
                .iter()
                .any(|m| m.pkgs.contains(&PkgId::new("com.whatsapp")))
        );
    }
}
