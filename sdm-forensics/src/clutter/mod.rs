// SPDX-License-Identifier: GPL-3.0-only

//! Clutter database: which packages leave which folders behind

pub mod manual;
pub mod marker;
pub mod nested;
pub mod repo;

pub use manual::{JsonMarker, JsonMarkerGroup, ManualMarkerSource, parse_marker_groups};
pub use marker::{Marker, MarkerMatch, MarkerSource};
pub use nested::{NestedPackageMatcher, default_nested_matchers};
pub use repo::ClutterRepo;
