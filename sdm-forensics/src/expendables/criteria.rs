// SPDX-License-Identifier: GPL-3.0-only

//! Path criteria used by the sieves
//!
//! ```json
//! {"segments": ["a", "b"], "mode": {"type": "START", "ignoreCase": true, "allowPartial": false}}
//! ```
//!
//! `ignoreCase` defaults to `true`, `allowPartial` to `false`.

use sdm_types::segments::{self, Segments};
use serde::{Deserialize, Serialize};

fn yes() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SegmentMode {
    /// Strict prefix: the criterium's path itself does not match
    Ancestor {
        #[serde(rename = "ignoreCase", default = "yes")]
        ignore_case: bool,
    },
    /// Inclusive prefix
    Start {
        #[serde(rename = "ignoreCase", default = "yes")]
        ignore_case: bool,
        #[serde(rename = "allowPartial", default)]
        allow_partial: bool,
    },
    Contain {
        #[serde(rename = "ignoreCase", default = "yes")]
        ignore_case: bool,
        #[serde(rename = "allowPartial", default)]
        allow_partial: bool,
    },
    End {
        #[serde(rename = "ignoreCase", default = "yes")]
        ignore_case: bool,
        #[serde(rename = "allowPartial", default)]
        allow_partial: bool,
    },
    Equal {
        #[serde(rename = "ignoreCase", default = "yes")]
        ignore_case: bool,
    },
    /// The run of segments starting at `index` (counted from the end when `backwards`)
    Specific {
        index: usize,
        #[serde(default)]
        backwards: bool,
        #[serde(rename = "ignoreCase", default = "yes")]
        ignore_case: bool,
    },
}

impl SegmentMode {
    pub fn ancestor() -> Self {
        Self::Ancestor { ignore_case: true }
    }

    pub fn start() -> Self {
        Self::Start {
            ignore_case: true,
            allow_partial: false,
        }
    }

    pub fn contain() -> Self {
        Self::Contain {
            ignore_case: true,
            allow_partial: false,
        }
    }

    pub fn end() -> Self {
        Self::End {
            ignore_case: true,
            allow_partial: false,
        }
    }

    pub fn equal() -> Self {
        Self::Equal { ignore_case: true }
    }

    pub fn is_ignore_case(&self) -> bool {
        match *self {
            Self::Ancestor { ignore_case }
            | Self::Start { ignore_case, .. }
            | Self::Contain { ignore_case, .. }
            | Self::End { ignore_case, .. }
            | Self::Equal { ignore_case }
            | Self::Specific { ignore_case, .. } => ignore_case,
        }
    }

    pub fn case_sensitive(self) -> Self {
        self.with_ignore_case(false)
    }

    pub fn with_ignore_case(mut self, value: bool) -> Self {
        match &mut self {
            Self::Ancestor { ignore_case }
            | Self::Start { ignore_case, .. }
            | Self::Contain { ignore_case, .. }
            | Self::End { ignore_case, .. }
            | Self::Equal { ignore_case }
            | Self::Specific { ignore_case, .. } => *ignore_case = value,
        }
        self
    }

    pub fn partial(mut self) -> Self {
        match &mut self {
            Self::Start { allow_partial, .. }
            | Self::Contain { allow_partial, .. }
            | Self::End { allow_partial, .. } => *allow_partial = true,
            Self::Ancestor { .. } | Self::Equal { .. } | Self::Specific { .. } => {}
        }
        self
    }
}

/// Matches a relative path against a run of segments
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentCriterium {
    pub segments: Segments,
    pub mode: SegmentMode,
}

impl SegmentCriterium {
    pub fn new(raw: &str, mode: SegmentMode) -> Self {
        Self {
            segments: segments::to_segs(raw),
            mode,
        }
    }

    pub fn matches(&self, target: &[String]) -> bool {
        let needle = &self.segments;
        match self.mode {
            SegmentMode::Ancestor { ignore_case } => {
                segments::is_ancestor_of(needle, target, ignore_case)
            }
            SegmentMode::Start {
                ignore_case,
                allow_partial,
            } => segments::starts_with(target, needle, ignore_case, allow_partial),
            SegmentMode::Contain {
                ignore_case,
                allow_partial,
            } => segments::contains(target, needle, ignore_case, allow_partial),
            SegmentMode::End {
                ignore_case,
                allow_partial,
            } => segments::ends_with(target, needle, ignore_case, allow_partial),
            SegmentMode::Equal { ignore_case } => segments::matches(target, needle, ignore_case),
            SegmentMode::Specific {
                index,
                backwards,
                ignore_case,
            } => {
                let start = if backwards {
                    match target.len().checked_sub(index + needle.len()) {
                        Some(start) => start,
                        None => return false,
                    }
                } else {
                    index
                };
                target
                    .get(start..start + needle.len())
                    .is_some_and(|run| segments::matches(run, needle, ignore_case))
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NameMode {
    Start,
    Contain,
    End,
    Equal,
}

/// Matches the last segment of a relative path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameCriterium {
    pub name: String,
    pub mode: NameMode,
    #[serde(rename = "ignoreCase", default = "yes")]
    pub ignore_case: bool,
}

impl NameCriterium {
    pub fn new(name: impl Into<String>, mode: NameMode) -> Self {
        Self {
            name: name.into(),
            mode,
            ignore_case: true,
        }
    }

    pub fn matches(&self, target: &[String]) -> bool {
        let Some(last) = target.last() else {
            return false;
        };
        let (value, name) = if self.ignore_case {
            (last.to_lowercase(), self.name.to_lowercase())
        } else {
            (last.clone(), self.name.clone())
        };
        match self.mode {
            NameMode::Start => value.starts_with(&name),
            NameMode::Contain => value.contains(&name),
            NameMode::End => value.ends_with(&name),
            NameMode::Equal => value == name,
        }
    }
}

/// A criterium or a combination of criteria
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Criterium {
    Segments(SegmentCriterium),
    Name(NameCriterium),
    Operator(CriteriaOperator),
}

impl Criterium {
    pub fn matches(&self, target: &[String]) -> bool {
        match self {
            Self::Segments(criterium) => criterium.matches(target),
            Self::Name(criterium) => criterium.matches(target),
            Self::Operator(operator) => operator.matches(target),
        }
    }
}

impl From<SegmentCriterium> for Criterium {
    fn from(criterium: SegmentCriterium) -> Self {
        Self::Segments(criterium)
    }
}

impl From<NameCriterium> for Criterium {
    fn from(criterium: NameCriterium) -> Self {
        Self::Name(criterium)
    }
}

impl From<CriteriaOperator> for Criterium {
    fn from(operator: CriteriaOperator) -> Self {
        Self::Operator(operator)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", content = "criteria", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CriteriaOperator {
    And(Vec<Criterium>),
    Or(Vec<Criterium>),
}

impl CriteriaOperator {
    pub fn matches(&self, target: &[String]) -> bool {
        match self {
            Self::And(criteria) => criteria.iter().all(|criterium| criterium.matches(target)),
            Self::Or(criteria) => criteria.iter().any(|criterium| criterium.matches(target)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check(raw: &str, mode: SegmentMode, target: &str) -> bool {
        SegmentCriterium::new(raw, mode).matches(&segments::to_segs(target))
    }

    #[test]
    fn ancestor_is_exclusive() {
        assert!(!check("def", SegmentMode::ancestor(), "abc/def"));
        assert!(check("abc", SegmentMode::ancestor(), "abc/def"));
        assert!(!check("abc/def", SegmentMode::ancestor(), "abc/def"));
        assert!(!check("abc", SegmentMode::ancestor().case_sensitive(), "ABC/def"));
        assert!(check("abc", SegmentMode::ancestor(), "ABC/def"));
    }

    #[test]
    fn start_contain_and_end() {
        assert!(check("abc", SegmentMode::start(), "abc/def"));
        assert!(!check("ab", SegmentMode::start(), "abc/def"));
        assert!(check("abc/d", SegmentMode::start().partial(), "abc/def"));
        assert!(check("abc", SegmentMode::contain(), "abc/def"));
        assert!(!check("bc/de", SegmentMode::contain(), "abc/def"));
        assert!(check("bc/de", SegmentMode::contain().partial(), "abc/def"));
        assert!(!check("def", SegmentMode::contain().case_sensitive(), "abc/DEF/ghi"));
        assert!(check("def/ghi", SegmentMode::end(), "abc/def/ghi"));
        assert!(!check("abc/def", SegmentMode::end(), "abc/def/ghi"));
        assert!(check("ef/ghi", SegmentMode::end().partial(), "abc/def/ghi"));
    }

    #[test]
    fn equal_respects_trailing_separators() {
        assert!(!check("abc/def/", SegmentMode::equal(), "abc/def"));
        assert!(check("abc/def", SegmentMode::equal(), "abc/DEF"));
        assert!(!check("abc/def", SegmentMode::equal().case_sensitive(), "abc/DEF"));
    }

    #[test]
    fn specific_positions() {
        let forwards = SegmentMode::Specific {
            index: 1,
            backwards: false,
            ignore_case: true,
        };
        assert!(check("def", forwards.clone(), "abc/def/ghi"));
        assert!(!check("abc", forwards, "abc/def/ghi"));

        let backwards = SegmentMode::Specific {
            index: 0,
            backwards: true,
            ignore_case: true,
        };
        assert!(check("def/ghi", backwards.clone(), "abc/def/ghi"));
        assert!(!check("abc/def/ghi/jkl", backwards, "abc/def/ghi"));
    }

    #[test]
    fn names_match_the_last_segment() {
        let target = segments::to_segs("WhatsApp/Media/.nomedia");
        assert!(NameCriterium::new(".nomedia", NameMode::Equal).matches(&target));
        assert!(NameCriterium::new(".NOMEDIA", NameMode::Equal).matches(&target));
        assert!(NameCriterium::new("media", NameMode::End).matches(&target));
        assert!(!NameCriterium::new("Media", NameMode::Start).matches(&target));
    }

    #[test]
    fn operators_combine() {
        let target = segments::to_segs("abc/def/ghi");
        let and = CriteriaOperator::And(vec![
            SegmentCriterium::new("abc", SegmentMode::ancestor()).into(),
            NameCriterium::new("gh", NameMode::Start).into(),
        ]);
        assert!(and.matches(&target));
        let or = CriteriaOperator::Or(vec![
            SegmentCriterium::new("xyz", SegmentMode::ancestor()).into(),
            NameCriterium::new("ghi", NameMode::Equal).into(),
        ]);
        assert!(or.matches(&target));
    }

    #[test]
    fn mode_json_defaults() {
        let parsed: SegmentCriterium =
            serde_json::from_str(r#"{"segments": ["a", "b"], "mode": {"type": "START"}}"#)
                .expect("parse");
        assert_eq!(
            parsed,
            SegmentCriterium {
                segments: vec!["a".into(), "b".into()],
                mode: SegmentMode::start(),
            }
        );

        let json = serde_json::to_value(SegmentCriterium::new(
            "a/b",
            SegmentMode::ancestor().case_sensitive(),
        ))
        .expect("serialize");
        assert_eq!(
            json,
            serde_json::json!({"segments": ["a", "b"], "mode": {"type": "ANCESTOR", "ignoreCase": false}})
        );
    }
}
