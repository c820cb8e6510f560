// SPDX-License-Identifier: GPL-3.0-only

use std::collections::BTreeSet;

use regex::{Regex, RegexBuilder};
use sdm_types::segments;
use sdm_types::{AreaType, PkgId};
use serde::{Deserialize, Serialize};

use super::criteria::Criterium;
use crate::error::{ForensicsError, Result};

/// One way a path can qualify
///
/// Every group that is present must pass (a `None` group is ignored); inside a
/// group one hit is enough. Exclusions veto a match.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pkg_names: Option<BTreeSet<PkgId>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub area_types: Option<BTreeSet<AreaType>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pfp_criteria: Option<Vec<Criterium>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pfp_exclusions: Option<Vec<Criterium>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pfp_regexes: Option<Vec<String>>,
}

struct CompiledConfig {
    config: MatchConfig,
    regexes: Vec<Regex>,
    /// Same patterns for the case-insensitive public areas
    regexes_ci: Vec<Regex>,
}

fn compile(pattern: &str, ignore_case: bool) -> Result<Regex> {
    Ok(RegexBuilder::new(&format!("^(?:{pattern})$"))
        .case_insensitive(ignore_case)
        .build()?)
}

impl CompiledConfig {
    fn new(mut config: MatchConfig) -> Result<Self> {
        // Empty lists constrain nothing, same as absent ones.
        if config.pfp_criteria.as_ref().is_some_and(Vec::is_empty) {
            config.pfp_criteria = None;
        }
        if config.pfp_regexes.as_ref().is_some_and(Vec::is_empty) {
            config.pfp_regexes = None;
        }
        if config.pfp_criteria.is_none() && config.pfp_regexes.is_none() {
            return Err(ForensicsError::invalid_sieve(
                "match config needs path criteria or regexes",
            ));
        }
        let patterns = config.pfp_regexes.iter().flatten();
        let regexes = patterns
            .clone()
            .map(|pattern| compile(pattern, false))
            .collect::<Result<Vec<_>>>()?;
        let regexes_ci = patterns
            .map(|pattern| compile(pattern, true))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            config,
            regexes,
            regexes_ci,
        })
    }

    fn matches(&self, pkg_id: &PkgId, area_type: AreaType, pfp_segs: &[String]) -> bool {
        let config = &self.config;
        if config
            .pkg_names
            .as_ref()
            .is_some_and(|pkgs| !pkgs.contains(pkg_id))
        {
            return false;
        }
        if config
            .area_types
            .as_ref()
            .is_some_and(|types| !types.contains(&area_type))
        {
            return false;
        }
        if config
            .pfp_criteria
            .as_ref()
            .is_some_and(|criteria| !criteria.iter().any(|c| c.matches(pfp_segs)))
        {
            return false;
        }
        if config
            .pfp_exclusions
            .as_ref()
            .is_some_and(|exclusions| exclusions.iter().any(|c| c.matches(pfp_segs)))
        {
            return false;
        }
        let regexes = if area_type.is_case_insensitive() {
            &self.regexes_ci
        } else {
            &self.regexes
        };
        if !regexes.is_empty() {
            let joined = segments::join_segments(pfp_segs);
            if !regexes.iter().any(|regex| regex.is_match(&joined)) {
                return false;
            }
        }
        true
    }
}

/// Classifies `(pkg, area, prefix-free segments)` against a set of [`MatchConfig`]s
pub struct DynamicAppSieve {
    configs: Vec<CompiledConfig>,
}

impl DynamicAppSieve {
    pub fn new(configs: Vec<MatchConfig>) -> Result<Self> {
        if configs.is_empty() {
            return Err(ForensicsError::invalid_sieve("no match configs"));
        }
        let configs = configs
            .into_iter()
            .map(CompiledConfig::new)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { configs })
    }

    pub fn matches(&self, pkg_id: &PkgId, area_type: AreaType, pfp_segs: &[String]) -> bool {
        self.configs
            .iter()
            .any(|config| config.matches(pkg_id, area_type, pfp_segs))
    }
}

#[cfg(test)]
mod tests {
    use sdm_types::segments::to_segs;

    use super::*;
    use crate::expendables::criteria::{NameCriterium, NameMode, SegmentCriterium, SegmentMode};

    fn sieve(config: MatchConfig) -> DynamicAppSieve {
        DynamicAppSieve::new(vec![config]).expect("sieve")
    }

    fn check(sieve: &DynamicAppSieve, pkg: &str, area_type: AreaType, raw: &str) -> bool {
        sieve.matches(&PkgId::new(pkg), area_type, &to_segs(raw))
    }

    fn contain(raw: &str) -> Option<Vec<Criterium>> {
        Some(vec![SegmentCriterium::new(raw, SegmentMode::contain()).into()])
    }

    #[test]
    fn underdetermined_configs_are_rejected() {
        assert!(DynamicAppSieve::new(vec![]).is_err());
        assert!(DynamicAppSieve::new(vec![MatchConfig::default()]).is_err());
        assert!(
            DynamicAppSieve::new(vec![MatchConfig {
                area_types: Some([AreaType::Sdcard].into()),
                ..Default::default()
            }])
            .is_err()
        );
    }

    #[test]
    fn empty_criteria_and_regex_lists_are_rejected() {
        let empty_regexes = MatchConfig {
            pfp_regexes: Some(vec![]),
            ..Default::default()
        };
        assert!(DynamicAppSieve::new(vec![empty_regexes]).is_err());
        let both_empty = MatchConfig {
            pkg_names: Some([PkgId::new("com.whatsapp")].into()),
            pfp_criteria: Some(vec![]),
            pfp_regexes: Some(vec![]),
            ..Default::default()
        };
        assert!(DynamicAppSieve::new(vec![both_empty]).is_err());

        // One empty list next to a usable one is fine.
        let sieve = sieve(MatchConfig {
            pfp_criteria: Some(vec![]),
            pfp_regexes: Some(vec![r"DCIM/\.thumbnails/.+".to_string()]),
            ..Default::default()
        });
        assert!(check(&sieve, "any.pkg", AreaType::Sdcard, "DCIM/.thumbnails/1.jpg"));
        assert!(!check(&sieve, "any.pkg", AreaType::Sdcard, "DCIM/Camera/photo.jpg"));
    }

    #[test]
    fn area_and_criteria_must_both_pass() {
        let sieve = sieve(MatchConfig {
            area_types: Some([AreaType::Sdcard].into()),
            pfp_criteria: contain("a/test/path"),
            ..Default::default()
        });
        assert!(!check(&sieve, "any.pkg", AreaType::PrivateData, "a/test/path"));
        assert!(check(&sieve, "any.pkg", AreaType::Sdcard, "a/test/path"));
        assert!(check(&sieve, "any.pkg", AreaType::Sdcard, "A/test/PATH"));
        assert!(!check(&sieve, "any.pkg", AreaType::Sdcard, "another/test/path"));
    }

    #[test]
    fn start_is_inclusive_and_ancestor_is_not() {
        let start = sieve(MatchConfig {
            pfp_criteria: Some(vec![
                SegmentCriterium::new("a/test/path", SegmentMode::start()).into(),
            ]),
            ..Default::default()
        });
        assert!(check(&start, "any.pkg", AreaType::Sdcard, "a/test/path"));
        assert!(check(&start, "any.pkg", AreaType::Sdcard, "a/test/path/file"));
        assert!(!check(&start, "any.pkg", AreaType::Sdcard, "not/a/test/path"));

        let ancestor = sieve(MatchConfig {
            pfp_criteria: Some(vec![
                SegmentCriterium::new("a/test/path", SegmentMode::ancestor()).into(),
            ]),
            ..Default::default()
        });
        assert!(!check(&ancestor, "any.pkg", AreaType::Sdcard, "a/test/path"));
        assert!(check(&ancestor, "any.pkg", AreaType::Sdcard, "a/test/path/file"));
    }

    #[test]
    fn pkg_names_and_exclusions() {
        let sieve = sieve(MatchConfig {
            pkg_names: Some([PkgId::new("com.test")].into()),
            pfp_criteria: Some(vec![
                SegmentCriterium::new("cache", SegmentMode::ancestor()).into(),
            ]),
            pfp_exclusions: Some(vec![NameCriterium::new(".nomedia", NameMode::Equal).into()]),
            ..Default::default()
        });
        assert!(check(&sieve, "com.test", AreaType::Sdcard, "cache/file"));
        assert!(!check(&sieve, "com.other", AreaType::Sdcard, "cache/file"));
        assert!(!check(&sieve, "com.test", AreaType::Sdcard, "cache/.nomedia"));
    }

    #[test]
    fn regexes_are_full_matches() {
        let sieve = sieve(MatchConfig {
            pfp_regexes: Some(vec![r"com\.test/files/[0-9]+\.tmp".into()]),
            ..Default::default()
        });
        assert!(check(&sieve, "com.test", AreaType::PrivateData, "com.test/files/123.tmp"));
        assert!(!check(&sieve, "com.test", AreaType::PrivateData, "com.test/files/123.tmp/x"));
        assert!(!check(&sieve, "com.test", AreaType::PrivateData, "x/com.test/files/1.tmp"));

        let public = DynamicAppSieve::new(vec![MatchConfig {
            pfp_regexes: Some(vec![r"com\.test/cache/.+".into()]),
            ..Default::default()
        }])
        .expect("sieve");
        assert!(check(&public, "com.test", AreaType::PublicData, "COM.TEST/Cache/file"));
    }

    #[test]
    fn any_config_may_match() {
        let sieve = DynamicAppSieve::new(vec![
            MatchConfig {
                area_types: Some([AreaType::Sdcard].into()),
                pfp_criteria: contain("one"),
                ..Default::default()
            },
            MatchConfig {
                area_types: Some([AreaType::PublicMedia].into()),
                pfp_criteria: contain("two"),
                ..Default::default()
            },
        ])
        .expect("sieve");
        assert!(check(&sieve, "p", AreaType::Sdcard, "one"));
        assert!(check(&sieve, "p", AreaType::PublicMedia, "x/two"));
        assert!(!check(&sieve, "p", AreaType::Sdcard, "two"));
    }
}
