// SPDX-License-Identifier: GPL-3.0-only

pub mod areas;
pub mod csi;
pub mod expendables;
pub mod gateway;
pub mod pkgs;
pub mod platform;
pub mod shell;

pub use areas::DataAreaModule;
pub use csi::{CsiProcessor, CsiSubProcessor};
pub use expendables::{ExpendableMatch, ExpendablesFilter, ProcessResult};
pub use gateway::LocalGateway;
pub use pkgs::PkgRepo;
pub use platform::PlatformCapabilities;
pub use shell::{PrivilegeProbe, ShellExecutor};
