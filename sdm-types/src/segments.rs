// SPDX-License-Identifier: GPL-3.0-only

//! Path segment helpers
//!
//! Forensics and sieve matching work on relative paths split into segments
//! (`"abc/def"` -> `["abc", "def"]`). The comparisons here are the building
//! blocks for clutter markers and segment criteria.

/// A relative path split on `/`
pub type Segments = Vec<String>;

/// Split a raw relative path on `/`, keeping empty segments (`"a/"` -> `["a", ""]`)
pub fn to_segs(raw: &str) -> Segments {
    raw.split('/').map(str::to_string).collect()
}

pub fn join_segments(segments: &[String]) -> String {
    segments.join("/")
}

pub fn lowercase(segments: &[String]) -> Segments {
    segments.iter().map(|s| s.to_lowercase()).collect()
}

fn fold(value: &str, ignore_case: bool) -> String {
    if ignore_case {
        value.to_lowercase()
    } else {
        value.to_string()
    }
}

pub fn segment_eq(a: &str, b: &str, ignore_case: bool) -> bool {
    if ignore_case {
        a.to_lowercase() == b.to_lowercase()
    } else {
        a == b
    }
}

fn segment_starts_with(value: &str, prefix: &str, ignore_case: bool) -> bool {
    fold(value, ignore_case).starts_with(&fold(prefix, ignore_case))
}

fn segment_ends_with(value: &str, suffix: &str, ignore_case: bool) -> bool {
    fold(value, ignore_case).ends_with(&fold(suffix, ignore_case))
}

fn segment_contains(value: &str, needle: &str, ignore_case: bool) -> bool {
    fold(value, ignore_case).contains(&fold(needle, ignore_case))
}

/// Both sides have the same length and every segment is equal
pub fn matches(segments: &[String], other: &[String], ignore_case: bool) -> bool {
    segments.len() == other.len()
        && segments
            .iter()
            .zip(other)
            .all(|(a, b)| segment_eq(a, b, ignore_case))
}

/// `ancestor` is a strict prefix of `other` (exclusive: equal paths are not ancestors)
pub fn is_ancestor_of(ancestor: &[String], other: &[String], ignore_case: bool) -> bool {
    ancestor.len() < other.len() && starts_with(other, ancestor, ignore_case, false)
}

/// `segments` begins with `prefix` (inclusive)
///
/// With `allow_partial` the last prefix segment only has to be a string prefix
/// of the corresponding segment.
pub fn starts_with(
    segments: &[String],
    prefix: &[String],
    ignore_case: bool,
    allow_partial: bool,
) -> bool {
    if prefix.len() > segments.len() {
        return false;
    }
    if prefix.is_empty() {
        return true;
    }

    let last = prefix.len() - 1;
    prefix.iter().enumerate().all(|(index, expected)| {
        let actual = &segments[index];
        if allow_partial && index == last {
            segment_starts_with(actual, expected, ignore_case)
        } else {
            segment_eq(actual, expected, ignore_case)
        }
    })
}

/// `segments` ends with `suffix`
///
/// With `allow_partial` the first suffix segment only has to be a string suffix
/// of the corresponding segment.
pub fn ends_with(
    segments: &[String],
    suffix: &[String],
    ignore_case: bool,
    allow_partial: bool,
) -> bool {
    if suffix.len() > segments.len() {
        return false;
    }
    if suffix.is_empty() {
        return true;
    }

    let offset = segments.len() - suffix.len();
    suffix.iter().enumerate().all(|(index, expected)| {
        let actual = &segments[offset + index];
        if allow_partial && index == 0 {
            segment_ends_with(actual, expected, ignore_case)
        } else {
            segment_eq(actual, expected, ignore_case)
        }
    })
}

/// `needle` appears as a consecutive run inside `segments`
///
/// With `allow_partial` the outer segments of the run may be cut: the first one
/// has to end with, the last one has to start with the needle's outer segments.
/// A single-segment needle then only needs to be a substring of any segment.
pub fn contains(
    segments: &[String],
    needle: &[String],
    ignore_case: bool,
    allow_partial: bool,
) -> bool {
    if needle.is_empty() {
        return true;
    }
    if needle.len() > segments.len() {
        return false;
    }

    if allow_partial && needle.len() == 1 {
        return segments
            .iter()
            .any(|segment| segment_contains(segment, &needle[0], ignore_case));
    }

    let last = needle.len() - 1;
    (0..=segments.len() - needle.len()).any(|start| {
        needle.iter().enumerate().all(|(index, expected)| {
            let actual = &segments[start + index];
            match index {
                0 if allow_partial => segment_ends_with(actual, expected, ignore_case),
                i if allow_partial && i == last => {
                    segment_starts_with(actual, expected, ignore_case)
                }
                _ => segment_eq(actual, expected, ignore_case),
            }
        })
    })
}
