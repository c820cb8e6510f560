// SPDX-License-Identifier: GPL-3.0-only

//! Storage area discovery

pub mod manager;
pub mod modules;

pub use manager::{
    AreaSnapshot, DiscoveryPass, ModuleFailure, StorageAreaManager, dedup_areas,
    enforce_unique_primary,
};
pub use modules::default_modules;
