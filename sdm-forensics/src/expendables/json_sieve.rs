// SPDX-License-Identifier: GPL-3.0-only

//! Sieves bundled as JSON
//!
//! ```json
//! {
//!   "schemaVersion": 1,
//!   "appFilter": [{
//!     "packages": ["com.test"],
//!     "fileFilter": [{"locations": ["SDCARD"], "startsWith": ["a/b"], "contains": ["c"], "patterns": ["a/b/.+"]}]
//!   }]
//! }
//! ```
//!
//! Conditions compare against the prefix-free path joined with `/`, lowercased
//! on case-insensitive areas. Every condition that is present must pass, and
//! inside a condition one entry is enough. `patterns` are full matches.

use std::collections::BTreeSet;

use regex::{Regex, RegexBuilder};
use sdm_types::segments;
use sdm_types::{AreaType, PkgId};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ForensicsError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SieveJson {
    schema_version: u32,
    app_filter: Option<Vec<AppFilterJson>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AppFilterJson {
    #[serde(default)]
    packages: Option<BTreeSet<PkgId>>,
    #[serde(default)]
    file_filter: Option<Vec<FileFilterJson>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileFilterJson {
    #[serde(default)]
    locations: Option<BTreeSet<AreaType>>,
    #[serde(default)]
    starts_with: Option<Vec<String>>,
    #[serde(default)]
    contains: Option<Vec<String>>,
    #[serde(default)]
    patterns: Option<Vec<String>>,
}

struct FileFilter {
    locations: BTreeSet<AreaType>,
    starts_with: Option<Vec<String>>,
    contains: Option<Vec<String>>,
    patterns: Option<Vec<Regex>>,
    patterns_ci: Option<Vec<Regex>>,
}

struct AppFilter {
    packages: Option<BTreeSet<PkgId>>,
    file_filters: Vec<FileFilter>,
}

fn compile_all(patterns: &[String], ignore_case: bool) -> Result<Vec<Regex>> {
    patterns
        .iter()
        .map(|pattern| -> Result<Regex> {
            Ok(RegexBuilder::new(&format!("^(?:{pattern})$"))
                .case_insensitive(ignore_case)
                .build()?)
        })
        .collect()
}

impl FileFilter {
    fn new(index: usize, json: FileFilterJson) -> Result<Self> {
        let locations = json
            .locations
            .filter(|locations| !locations.is_empty())
            .ok_or_else(|| {
                ForensicsError::invalid_sieve(format!("file filter #{index} has no locations"))
            })?;
        if json.starts_with.is_none() && json.contains.is_none() && json.patterns.is_none() {
            return Err(ForensicsError::invalid_sieve(format!(
                "file filter #{index} has no conditions"
            )));
        }
        let (patterns, patterns_ci) = match &json.patterns {
            Some(raw) => (Some(compile_all(raw, false)?), Some(compile_all(raw, true)?)),
            None => (None, None),
        };
        Ok(Self {
            locations,
            starts_with: json.starts_with,
            contains: json.contains,
            patterns,
            patterns_ci,
        })
    }

    fn matches(&self, area_type: AreaType, pfp_segs: &[String]) -> bool {
        if !self.locations.contains(&area_type) {
            return false;
        }
        let ignore_case = area_type.is_case_insensitive();
        let fold = |value: &str| {
            if ignore_case {
                value.to_lowercase()
            } else {
                value.to_string()
            }
        };
        let joined = fold(&segments::join_segments(pfp_segs));

        if let Some(prefixes) = &self.starts_with {
            if !prefixes.iter().any(|prefix| joined.starts_with(&fold(prefix))) {
                return false;
            }
        }
        if let Some(needles) = &self.contains {
            if !needles.iter().any(|needle| joined.contains(&fold(needle))) {
                return false;
            }
        }
        let patterns = if ignore_case {
            &self.patterns_ci
        } else {
            &self.patterns
        };
        if let Some(patterns) = patterns {
            if !patterns.iter().any(|regex| regex.is_match(&joined)) {
                return false;
            }
        }
        true
    }
}

/// A sieve loaded from one of the bundled JSON databases
pub struct JsonAppSieve {
    filters: Vec<AppFilter>,
}

impl JsonAppSieve {
    pub fn from_json(raw: &str) -> Result<Self> {
        let json: SieveJson = serde_json::from_str(raw)?;
        let app_filters = json
            .app_filter
            .filter(|filters| !filters.is_empty())
            .ok_or_else(|| ForensicsError::invalid_sieve("no app filters"))?;

        let mut filters = Vec::with_capacity(app_filters.len());
        for (position, app_filter) in app_filters.into_iter().enumerate() {
            let file_filters = app_filter
                .file_filter
                .filter(|filters| !filters.is_empty())
                .ok_or_else(|| {
                    ForensicsError::invalid_sieve(format!(
                        "app filter #{} has no file filters",
                        position + 1
                    ))
                })?
                .into_iter()
                .enumerate()
                .map(|(index, filter)| FileFilter::new(index + 1, filter))
                .collect::<Result<Vec<_>>>()?;
            filters.push(AppFilter {
                packages: app_filter.packages,
                file_filters,
            });
        }
        debug!(
            "Loaded sieve v{} with {} app filters",
            json.schema_version,
            filters.len()
        );
        Ok(Self { filters })
    }

    pub fn matches(&self, pkg_id: &PkgId, area_type: AreaType, pfp_segs: &[String]) -> bool {
        self.filters
            .iter()
            .filter(|filter| {
                filter
                    .packages
                    .as_ref()
                    .is_none_or(|packages| packages.contains(pkg_id))
            })
            .flat_map(|filter| &filter.file_filters)
            .any(|filter| filter.matches(area_type, pfp_segs))
    }
}

#[cfg(test)]
mod tests {
    use sdm_types::segments::to_segs;

    use super::*;

    fn check(sieve: &JsonAppSieve, area_type: AreaType, raw: &str) -> bool {
        sieve.matches(&PkgId::new("any.pkg"), area_type, &to_segs(raw))
    }

    #[test]
    fn invalid_files_are_rejected() {
        for raw in [
            "{}",
            r#"{"schemaVersion": 1}"#,
            r#"{"schemaVersion": 1, "appFilter": []}"#,
            r#"{"schemaVersion": 1, "appFilter": [{}]}"#,
            r#"{"schemaVersion": 1, "appFilter": [{"fileFilter": []}]}"#,
            r#"{"schemaVersion": 1, "appFilter": [{"fileFilter": [{"contains": ["x"]}]}]}"#,
            r#"{"schemaVersion": 1, "appFilter": [{"fileFilter": [{"locations": ["SDCARD"]}]}]}"#,
        ] {
            assert!(JsonAppSieve::from_json(raw).is_err(), "{raw}");
        }
    }

    #[test]
    fn location_and_contains() {
        let sieve = JsonAppSieve::from_json(
            r#"{"schemaVersion": 1, "appFilter": [{"fileFilter": [
                {"locations": ["SDCARD", "PRIVATE_DATA", "SYSTEM"], "contains": ["a/test/path"]}
            ]}]}"#,
        )
        .expect("sieve");
        assert!(check(&sieve, AreaType::Sdcard, "a/test/path"));
        assert!(check(&sieve, AreaType::PrivateData, "a/test/path/file"));
        assert!(check(&sieve, AreaType::System, "aaa/test/pathhhh"));
        assert!(!check(&sieve, AreaType::System, "123"));
        assert!(!check(&sieve, AreaType::PublicData, "a/test/path"));
    }

    #[test]
    fn starts_with_follows_area_casing() {
        let sieve = JsonAppSieve::from_json(
            r#"{"schemaVersion": 1, "appFilter": [{"fileFilter": [
                {"locations": ["SDCARD", "PRIVATE_DATA"], "startsWith": ["a/test/path"]}
            ]}]}"#,
        )
        .expect("sieve");
        assert!(check(&sieve, AreaType::Sdcard, "a/test/path/file"));
        assert!(check(&sieve, AreaType::Sdcard, "A/test/PATH"));
        assert!(!check(&sieve, AreaType::PrivateData, "A/test/PATH"));
        assert!(!check(&sieve, AreaType::Sdcard, "not/a/test/path"));
    }

    #[test]
    fn packages_and_patterns() {
        let sieve = JsonAppSieve::from_json(
            r#"{"schemaVersion": 1, "appFilter": [{"packages": ["com.test"], "fileFilter": [
                {"locations": ["PRIVATE_DATA"], "patterns": ["com\\.test/files/[0-9]+\\.log"]}
            ]}]}"#,
        )
        .expect("sieve");
        let segs = to_segs("com.test/files/12.log");
        assert!(sieve.matches(&PkgId::new("com.test"), AreaType::PrivateData, &segs));
        assert!(!sieve.matches(&PkgId::new("com.other"), AreaType::PrivateData, &segs));
        assert!(!sieve.matches(
            &PkgId::new("com.test"),
            AreaType::PrivateData,
            &to_segs("com.test/files/12.log.bak")
        ));
    }
}
