// SPDX-License-Identifier: GPL-3.0-only

//! Installed packages as listed by `pm list packages -f`
//!
//! ```text
//! package:/data/app/~~Yw3g==/com.example-Lk9A==/base.apk=com.example
//! package:/system/priv-app/Settings/Settings.apk=com.android.settings
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use sdm_contracts::{PkgRepo, ShellExecutor, StorageError};
use sdm_types::{InstalledPkg, LocalPath, PkgId, ShellMode, ShellOpsCmd, UserHandle};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::SysError;

/// Code location of an apk: its directory for split-style installs, the apk otherwise
fn source_of(apk: LocalPath) -> LocalPath {
    let name = apk.name().to_string();
    match apk.parent() {
        Some(parent) if name == "base.apk" || name == format!("{}.apk", parent.name()) => parent,
        _ => apk,
    }
}

/// Parses `pm list packages -f` output for one user, skipping unrecognised lines
pub fn parse_pm_listing<S: AsRef<str>>(lines: &[S], user: UserHandle) -> Vec<InstalledPkg> {
    lines
        .iter()
        .filter_map(|line| {
            let line = line.as_ref().trim();
            let entry = line.strip_prefix("package:")?;
            // Paths may contain '=' (base64 suffixes), the name never does
            let (apk, name) = entry.rsplit_once('=')?;
            if apk.is_empty() || name.is_empty() {
                debug!("Skipping pm line {:?}", line);
                return None;
            }
            Some(InstalledPkg {
                id: PkgId::new(name),
                user_handle: user,
                source_dir: Some(source_of(LocalPath::new(apk))),
            })
        })
        .collect()
}

/// Package list read through the unprivileged shell, cached until [`Self::reload`]
pub struct PmPkgRepo {
    shell: Arc<dyn ShellExecutor>,
    users: Vec<UserHandle>,
    cache: Mutex<Option<Arc<Vec<InstalledPkg>>>>,
}

impl PmPkgRepo {
    pub fn new(shell: Arc<dyn ShellExecutor>, users: Vec<UserHandle>) -> Self {
        Self {
            shell,
            users,
            cache: Mutex::new(None),
        }
    }

    pub async fn reload(&self) {
        *self.cache.lock().await = None;
    }

    async fn list_user(&self, user: UserHandle) -> Result<Vec<InstalledPkg>, StorageError> {
        let command = format!("pm list packages -f --user {user}");
        let result = self
            .shell
            .execute(ShellOpsCmd::single(command.clone()), ShellMode::Normal)
            .await?;
        if !result.is_success() {
            return Err(SysError::UnexpectedOutput {
                command,
                output: result.errors.join("\n"),
            }
            .into());
        }
        Ok(parse_pm_listing(&result.output, user))
    }
}

#[async_trait]
impl PkgRepo for PmPkgRepo {
    async fn current_pkgs(&self) -> Result<Vec<InstalledPkg>, StorageError> {
        let mut cache = self.cache.lock().await;
        if let Some(pkgs) = cache.as_ref() {
            return Ok(pkgs.as_ref().clone());
        }

        let mut pkgs = Vec::new();
        for (index, user) in self.users.iter().enumerate() {
            match self.list_user(*user).await {
                Ok(listed) => pkgs.extend(listed),
                // Secondary users may be locked or stopped
                Err(e) if index > 0 => warn!("Failed to list packages of user {}: {}", user, e),
                Err(e) => return Err(e),
            }
        }
        debug!("{} packages installed across {} users", pkgs.len(), self.users.len());
        *cache = Some(Arc::new(pkgs.clone()));
        Ok(pkgs)
    }
}

/// Fixed package list
pub struct StaticPkgRepo(pub Vec<InstalledPkg>);

impl StaticPkgRepo {
    /// From a `pm list packages -f` listing saved off a device
    pub fn from_listing(listing: &str, user: UserHandle) -> Self {
        let lines: Vec<&str> = listing.lines().collect();
        Self(parse_pm_listing(&lines, user))
    }
}

#[async_trait]
impl PkgRepo for StaticPkgRepo {
    async fn current_pkgs(&self) -> Result<Vec<InstalledPkg>, StorageError> {
        Ok(self.0.clone())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use sdm_types::ShellOpsResult;

    use super::*;

    #[test]
    fn listing_lines_are_parsed() {
        let pkgs = parse_pm_listing(
            &[
                "package:/data/app/~~Yw3g==/com.example-Lk9A==/base.apk=com.example",
                "package:/system/priv-app/Settings/Settings.apk=com.android.settings",
                "package:/data/app/com.legacy-1.apk=com.legacy",
                "WARNING: linker: something",
                "package:=broken",
            ],
            UserHandle(10),
        );
        assert_eq!(pkgs.len(), 3);
        assert_eq!(pkgs[0].id, PkgId::new("com.example"));
        assert_eq!(pkgs[0].user_handle, UserHandle(10));
        assert_eq!(
            pkgs[0].source_dir,
            Some(LocalPath::new("/data/app/~~Yw3g==/com.example-Lk9A=="))
        );
        assert_eq!(
            pkgs[1].source_dir,
            Some(LocalPath::new("/system/priv-app/Settings"))
        );
        assert_eq!(
            pkgs[2].source_dir,
            Some(LocalPath::new("/data/app/com.legacy-1.apk"))
        );
    }

    struct FakePm {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ShellExecutor for FakePm {
        async fn execute(
            &self,
            cmd: ShellOpsCmd,
            mode: ShellMode,
        ) -> Result<ShellOpsResult, StorageError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            assert_eq!(mode, ShellMode::Normal);
            let output = if cmd.cmds[0].ends_with("--user 0") {
                vec!["package:/data/app/a-1/base.apk=com.a".to_string()]
            } else {
                vec!["package:/data/app/b-1/base.apk=com.b".to_string()]
            };
            Ok(ShellOpsResult {
                exit_code: 0,
                output,
                errors: Vec::new(),
            })
        }
    }

    #[tokio::test]
    async fn listings_are_cached_per_reload() {
        let shell = Arc::new(FakePm {
            calls: AtomicUsize::new(0),
        });
        let repo = PmPkgRepo::new(shell.clone(), vec![UserHandle(0), UserHandle(10)]);

        let pkgs = repo.current_pkgs().await.expect("pkgs");
        assert_eq!(pkgs.len(), 2);
        assert!(
            repo.is_installed(&PkgId::new("com.b"), Some(UserHandle(10)))
                .await
                .expect("installed")
        );
        assert!(
            !repo
                .is_installed(&PkgId::new("com.b"), Some(UserHandle(0)))
                .await
                .expect("installed")
        );
        assert_eq!(shell.calls.load(Ordering::SeqCst), 2);

        repo.reload().await;
        repo.current_pkgs().await.expect("pkgs");
        assert_eq!(shell.calls.load(Ordering::SeqCst), 4);
    }
}
