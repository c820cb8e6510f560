// SPDX-License-Identifier: GPL-3.0-only

//! Canonical domain models for the storage forensics core
//!
//! This crate defines the value types shared by every layer:
//!
//! - **sdm-shell**: `ShellOpsCmd` / `ShellOpsResult` cross the privilege boundary
//! - **sdm-sys**: `LocalPath`, `LookupInfo` and `GatewayMode` for filesystem access
//! - **sdm-forensics**: `StorageArea`, `AreaInfo`, `Owner` and `CsiResult`
//!
//! All types are plain data and serializable so they can be handed to a
//! root or ADB host process without hidden state.

pub mod area;
pub mod file;
pub mod forensics;
pub mod path;
pub mod pkg;
pub mod segments;
pub mod shell;
pub mod user;

pub use area::{AreaFlag, AreaType, StorageArea};
pub use file::{FileType, GatewayMode, LookupInfo};
pub use forensics::{AreaInfo, CsiResult};
pub use path::LocalPath;
pub use pkg::{InstalledPkg, MarkerFlag, Owner, PkgId};
pub use segments::Segments;
pub use shell::{ShellMode, ShellOpsCmd, ShellOpsResult};
pub use user::UserHandle;
