// SPDX-License-Identifier: GPL-3.0-only

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::segments::{self, Segments};

/// Absolute, normalized local filesystem path
///
/// Always starts with `/`, never ends with one (except the root itself) and
/// never contains empty segments. Comparisons are segment based so that
/// `/data/app` is not treated as an ancestor of `/data/application`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct LocalPath(String);

impl LocalPath {
    pub fn new(raw: impl AsRef<str>) -> Self {
        let joined = raw
            .as_ref()
            .split('/')
            .filter(|segment| !segment.is_empty())
            .collect::<Vec<_>>()
            .join("/");
        Self(format!("/{joined}"))
    }

    pub fn root() -> Self {
        Self("/".to_string())
    }

    /// Build a path from a base and any number of (possibly nested) parts
    pub fn build<I, S>(base: &LocalPath, parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut raw = base.0.clone();
        for part in parts {
            raw.push('/');
            raw.push_str(part.as_ref());
        }
        Self::new(raw)
    }

    pub fn child(&self, part: impl AsRef<str>) -> Self {
        Self::build(self, [part])
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_path(&self) -> &Path {
        Path::new(&self.0)
    }

    pub fn segments(&self) -> Segments {
        self.0
            .split('/')
            .filter(|segment| !segment.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Number of segments; `/` has depth 0
    pub fn depth(&self) -> usize {
        self.0.split('/').filter(|segment| !segment.is_empty()).count()
    }

    pub fn name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or_default()
    }

    pub fn parent(&self) -> Option<LocalPath> {
        if self.depth() == 0 {
            return None;
        }
        let mut segments = self.segments();
        segments.pop();
        Some(Self::new(segments.join("/")))
    }

    /// Strict ancestor check; a path is not its own ancestor
    pub fn is_ancestor_of(&self, other: &LocalPath) -> bool {
        segments::is_ancestor_of(&self.segments(), &other.segments(), false)
    }

    pub fn is_ancestor_or_same(&self, other: &LocalPath) -> bool {
        self == other || self.is_ancestor_of(other)
    }

    /// Segments of `self` below `prefix`, or `None` if `prefix` is not an ancestor
    pub fn remove_prefix(&self, prefix: &LocalPath) -> Option<Segments> {
        if !prefix.is_ancestor_of(self) {
            return None;
        }
        Some(self.segments().split_off(prefix.depth()))
    }
}

impl From<String> for LocalPath {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<&str> for LocalPath {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<LocalPath> for String {
    fn from(value: LocalPath) -> Self {
        value.0
    }
}

impl From<&Path> for LocalPath {
    fn from(value: &Path) -> Self {
        Self::new(value.to_string_lossy())
    }
}

impl AsRef<Path> for LocalPath {
    fn as_ref(&self) -> &Path {
        self.as_path()
    }
}

impl std::fmt::Display for LocalPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
