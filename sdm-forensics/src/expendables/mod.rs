// SPDX-License-Identifier: GPL-3.0-only

//! Classification of attributed paths as safe-to-delete residue
//!
//! Filters are consulted in a fixed order and each can be switched off from
//! settings. Callers must still gate unattended deletion on
//! [`crate::OwnerInfo::is_eligible_for_unattended_deletion`].

pub mod criteria;
mod delete;
mod filters;
mod json_sieve;
mod registry;
mod sieve;

pub use criteria::{
    CriteriaOperator, Criterium, NameCriterium, NameMode, SegmentCriterium, SegmentMode,
};
pub use delete::delete_all;
pub use filters::{AdvertisementFilter, HiddenFilter, WhatsAppSentFilter, default_filters};
pub use json_sieve::JsonAppSieve;
pub use registry::FilterRegistry;
pub use sieve::{DynamicAppSieve, MatchConfig};
