// SPDX-License-Identifier: GPL-3.0-only

use std::path::PathBuf;

use sdm_types::ShellMode;
use tracing::debug;
use which::which;

use crate::error::{Result, ShellError};

/// Program and arguments that start an interactive shell reading from stdin
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellLauncher {
    pub mode: ShellMode,
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl ShellLauncher {
    /// Unprivileged shell, `sh` by default
    pub fn plain(sh_binary: &str) -> Result<Self> {
        let program = resolve(ShellMode::Normal, sh_binary)?;
        Ok(Self {
            mode: ShellMode::Normal,
            program,
            args: Vec::new(),
        })
    }

    /// Root shell through `su`
    pub fn root(su_binary: &str) -> Result<Self> {
        let program = resolve(ShellMode::Root, su_binary)?;
        Ok(Self {
            mode: ShellMode::Root,
            program,
            args: Vec::new(),
        })
    }

    /// `adb shell`, pinned to one device when a serial is given
    pub fn adb(serial: Option<&str>) -> Result<Self> {
        let program = resolve(ShellMode::Adb, "adb")?;
        let mut args = Vec::new();
        if let Some(serial) = serial {
            args.push("-s".to_string());
            args.push(serial.to_string());
        }
        args.push("shell".to_string());
        Ok(Self {
            mode: ShellMode::Adb,
            program,
            args,
        })
    }
}

impl std::fmt::Display for ShellLauncher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

fn resolve(mode: ShellMode, binary: &str) -> Result<PathBuf> {
    let program = which(binary)
        .map_err(|e| ShellError::unavailable(mode, format!("{binary} not found: {e}")))?;
    debug!("Resolved {} shell binary to {:?}", mode, program);
    Ok(program)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_launcher_resolves_sh() {
        let launcher = ShellLauncher::plain("sh").expect("sh on PATH");
        assert_eq!(launcher.mode, ShellMode::Normal);
        assert!(launcher.args.is_empty());
        assert!(launcher.program.is_absolute());
    }

    #[test]
    fn missing_binary_is_unavailable() {
        let error = ShellLauncher::root("definitely-not-a-su-binary").expect_err("missing su");
        assert!(matches!(
            error,
            ShellError::Unavailable {
                mode: ShellMode::Root,
                ..
            }
        ));
    }
}
