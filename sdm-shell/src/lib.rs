// SPDX-License-Identifier: GPL-3.0-only

//! Interactive shell sessions for the storage forensics core
//!
//! A [`ShellSession`] wraps one long-lived `sh`, `su` or `adb shell` process
//! and runs command batches through it, delimiting each batch with a unique
//! end marker on both output streams. [`SharedShell`] lazily opens a session
//! and shares it between concurrent callers through leases. [`ShellOps`]
//! routes commands to the shared shell of a [`sdm_types::ShellMode`] and
//! answers whether root or ADB can be used right now.

pub mod error;
pub mod launcher;
pub mod ops;
pub mod process;
pub mod session;
pub mod shared;

pub use error::{Result, ShellError};
pub use launcher::ShellLauncher;
pub use ops::{ShellConfig, ShellOps};
pub use process::{ShellPipes, ShellProcess};
pub use session::ShellSession;
pub use shared::{SharedShell, ShellLease};
