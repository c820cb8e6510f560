// SPDX-License-Identifier: GPL-3.0-only

use std::collections::BTreeSet;
use std::sync::{Arc, RwLock};

use sdm_contracts::PkgRepo;
use sdm_types::{AreaType, PkgId};
use tracing::{debug, info, warn};

use super::manual::ManualMarkerSource;
use super::marker::{Marker, MarkerMatch, MarkerSource};
use super::nested::default_nested_matchers;
use crate::error::Result;

/// Union of all marker sources, queried in registration order
pub struct ClutterRepo {
    sources: RwLock<Vec<Arc<dyn MarkerSource>>>,
}

impl ClutterRepo {
    pub fn new(sources: Vec<Arc<dyn MarkerSource>>) -> Self {
        Self {
            sources: RwLock::new(sources),
        }
    }

    /// Bundled manual markers followed by the nested package matchers
    pub fn with_defaults(pkg_repo: Arc<dyn PkgRepo>) -> Result<Self> {
        let mut sources: Vec<Arc<dyn MarkerSource>> =
            vec![Arc::new(ManualMarkerSource::bundled(pkg_repo)?)];
        for matcher in default_nested_matchers()? {
            sources.push(Arc::new(matcher));
        }
        Ok(Self::new(sources))
    }

    /// Adds a source after the existing ones, e.g. markers loaded at runtime
    pub fn append_source(&self, source: Arc<dyn MarkerSource>) {
        info!("Appending marker source '{}'", source.name());
        self.sources
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(source);
    }

    pub fn source_names(&self) -> Vec<String> {
        self.sources()
            .iter()
            .map(|source| source.name().to_string())
            .collect()
    }

    fn sources(&self) -> Vec<Arc<dyn MarkerSource>> {
        self.sources
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Packages cluttering `segments` below an area of `area_type`
    ///
    /// Matching is anchored at the first segment. A failing source is logged
    /// and skipped.
    pub async fn match_segments(
        &self,
        area_type: AreaType,
        segments: &[String],
    ) -> BTreeSet<MarkerMatch> {
        let mut matches = BTreeSet::new();
        for source in self.sources() {
            match source.match_segments(area_type, segments).await {
                Ok(found) => matches.extend(found),
                Err(e) => warn!("Marker source '{}' failed: {}", source.name(), e),
            }
        }
        debug!("Clutter match {}:{:?} -> {:?}", area_type, segments, matches);
        matches
    }

    pub async fn markers_for_location(&self, area_type: AreaType) -> Result<Vec<Arc<dyn Marker>>> {
        let mut markers = Vec::new();
        for source in self.sources() {
            markers.extend(source.markers_for_location(area_type).await?);
        }
        Ok(markers)
    }

    pub async fn markers_for_pkg(&self, pkg_id: &PkgId) -> Result<Vec<Arc<dyn Marker>>> {
        let mut markers = Vec::new();
        for source in self.sources() {
            markers.extend(source.markers_for_pkg(pkg_id).await?);
        }
        Ok(markers)
    }
}

#[cfg(test)]
mod tests {
    use sdm_types::MarkerFlag;
    use sdm_types::segments::to_segs;

    use super::*;
    use crate::testing::FakePkgRepo;

    fn repo() -> ClutterRepo {
        ClutterRepo::with_defaults(Arc::new(FakePkgRepo::default())).expect("repo")
    }

    #[tokio::test]
    async fn duplicate_matches_across_sources_collapse() {
        let repo = repo();
        let extra = ManualMarkerSource::from_json(
            "extra",
            Arc::new(FakePkgRepo::default()),
            r#"[{"pkgs": ["com.whatsapp"], "mrks": [{"loc": "SDCARD", "path": "WhatsApp", "flags": ["keeper"]}]}]"#,
        )
        .expect("extra");
        repo.append_source(Arc::new(extra));
        assert_eq!(repo.source_names().last().map(String::as_str), Some("extra"));

        let matches = repo.match_segments(AreaType::Sdcard, &to_segs("WhatsApp")).await;
        assert_eq!(
            matches,
            BTreeSet::from([MarkerMatch::new(
                [PkgId::new("com.whatsapp")],
                [MarkerFlag::Keeper]
            )])
        );
    }

    #[tokio::test]
    async fn matching_is_anchored_at_the_first_segment() {
        let repo = repo();
        let extra = ManualMarkerSource::from_json(
            "extra",
            Arc::new(FakePkgRepo::default()),
            r#"[{"pkgs": ["com.example.evil_looking_name"], "mrks": [{"loc": "SDCARD", "path": "com.example.evil_looking_name"}]}]"#,
        )
        .expect("extra");
        repo.append_source(Arc::new(extra));

        let nested = to_segs("not_an_app/com.example.evil_looking_name/x");
        assert!(repo.match_segments(AreaType::Sdcard, &nested[..1]).await.is_empty());
        assert!(repo.match_segments(AreaType::Sdcard, &nested).await.is_empty());
    }

    #[tokio::test]
    async fn failing_source_does_not_hide_others() {
        let broken_repo = FakePkgRepo::default();
        broken_repo.set_failing(true);
        let broken = ManualMarkerSource::from_json(
            "broken",
            Arc::new(broken_repo),
            r#"[{"regexPkgs": ["com\\.x\\..+"], "mrks": [{"loc": "SDCARD", "path": "X"}]}]"#,
        )
        .expect("broken");
        let repo = repo();
        repo.append_source(Arc::new(broken));

        let matches = repo.match_segments(AreaType::Sdcard, &to_segs("Telegram")).await;
        assert_eq!(matches.len(), 1);
    }
}
