// SPDX-License-Identifier: GPL-3.0-only

//! Storage forensics core
//!
//! - [`areas`]: discovery of the device's storage areas through ordered,
//!   two-pass [`sdm_contracts::DataAreaModule`]s
//! - [`clutter`]: the clutter database mapping relative paths to packages
//! - [`csi`]: path to area to owner attribution ([`FileForensics`])
//! - [`expendables`]: filters classifying attributed paths as safe to delete

pub mod areas;
pub mod clutter;
pub mod csi;
pub mod error;
pub mod expendables;

#[cfg(test)]
pub(crate) mod testing;

pub use areas::{AreaSnapshot, DiscoveryPass, ModuleFailure, StorageAreaManager};
pub use clutter::{ClutterRepo, Marker, MarkerMatch, MarkerSource};
pub use csi::{ClutterCheck, FileForensics, OwnerInfo, OwnerState};
pub use error::{ForensicsError, Result};
pub use expendables::{DynamicAppSieve, FilterRegistry, JsonAppSieve, MatchConfig};
