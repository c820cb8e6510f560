// SPDX-License-Identifier: GPL-3.0-only

use serde::{Deserialize, Serialize};

/// Privilege backend a shell command is routed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ShellMode {
    Normal,
    Root,
    Adb,
}

impl std::fmt::Display for ShellMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Normal => write!(f, "NORMAL"),
            Self::Root => write!(f, "ROOT"),
            Self::Adb => write!(f, "ADB"),
        }
    }
}

/// Ordered list of literal shell command lines, executed in one invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShellOpsCmd {
    pub cmds: Vec<String>,
}

impl ShellOpsCmd {
    pub fn new<I, S>(cmds: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            cmds: cmds.into_iter().map(Into::into).collect(),
        }
    }

    pub fn single(cmd: impl Into<String>) -> Self {
        Self {
            cmds: vec![cmd.into()],
        }
    }
}

/// Fully captured result of a [`ShellOpsCmd`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShellOpsResult {
    pub exit_code: i32,
    pub output: Vec<String>,
    pub errors: Vec<String>,
}

impl ShellOpsResult {
    pub fn is_success(&self) -> bool {
        self.exit_code == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shell_values_roundtrip_as_plain_fields() {
        let cmd = ShellOpsCmd::new(["echo a", "echo b >&2"]);
        let json = serde_json::to_string(&cmd).expect("serialize cmd");
        assert_eq!(json, r#"{"cmds":["echo a","echo b >&2"]}"#);

        let result = ShellOpsResult {
            exit_code: 1,
            output: vec!["a".to_string()],
            errors: vec!["b".to_string()],
        };
        let json = serde_json::to_string(&result).expect("serialize result");
        let parsed: ShellOpsResult = serde_json::from_str(&json).expect("deserialize result");
        assert_eq!(parsed, result);
        assert!(!parsed.is_success());
    }
}
