// SPDX-License-Identifier: GPL-3.0-only

//! Owner heuristics shared by the processors that treat a directory name as a
//! package name

use std::sync::Arc;

use sdm_contracts::{PkgRepo, StorageError};
use sdm_types::{AreaInfo, CsiResult, Owner, PkgId, UserHandle};
use tracing::trace;

use crate::clutter::ClutterRepo;

const EXTERNAL_PREFIX: &str = ".external.";
const LGE_THEME_PREFIX: &str = "com.lge.theme.";

/// Undo the usual tricks apps use to hide a package folder
///
/// `.external.<pkg>` and a leading `_` or `.` are stripped. With `lge_themes`,
/// `com.lge.theme.<name>.<suffix>` maps back to the theme package.
pub(crate) fn clean_dir_name(name: &str, lge_themes: bool) -> Option<String> {
    if let Some(stripped) = name.strip_prefix(EXTERNAL_PREFIX) {
        return Some(stripped.to_string());
    }
    if let Some(stripped) = name.strip_prefix('_').or_else(|| name.strip_prefix('.')) {
        return Some(stripped.to_string());
    }
    if lge_themes {
        return lge_theme_pkg(name);
    }
    None
}

fn is_pkg_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '-'
}

fn lge_theme_pkg(name: &str) -> Option<String> {
    let rest = name.strip_prefix(LGE_THEME_PREFIX)?;
    let (theme, suffix) = rest.split_at(rest.find('.')?);
    if theme.is_empty() || !theme.chars().all(is_pkg_char) {
        return None;
    }
    if suffix.len() < 2 || !suffix.chars().all(|c| c == '.' || is_pkg_char(c)) {
        return None;
    }
    Some(format!("{LGE_THEME_PREFIX}{theme}"))
}

/// The first directory below the area, when it names an installed package
pub(crate) async fn installed_dir_owner(
    pkg_repo: &dyn PkgRepo,
    area_info: &AreaInfo,
    user: Option<UserHandle>,
) -> Result<Option<Owner>, StorageError> {
    let Some(dir_name) = area_info.first_dir_element() else {
        return Ok(None);
    };
    let pkg_id = PkgId::new(dir_name);
    if !pkg_repo.is_installed(&pkg_id, user).await? {
        return Ok(None);
    }
    Ok(Some(match user {
        Some(user) => Owner::for_user(pkg_id, user),
        None => Owner::new(pkg_id),
    }))
}

/// Directory-name based attribution
///
/// In order: the directory name as an installed package, its cleaned form as
/// an installed package, clutter markers for the directory, and finally the
/// (cleaned) name itself. `user` scopes both the installed check and the
/// produced owners; `None` means any user.
pub(crate) struct DirNameOwners {
    pub(crate) pkg_repo: Arc<dyn PkgRepo>,
    pub(crate) clutter: Arc<ClutterRepo>,
    pub(crate) lge_themes: bool,
}

impl DirNameOwners {
    pub(crate) async fn find(
        &self,
        area_info: &AreaInfo,
        user: Option<UserHandle>,
    ) -> Result<CsiResult, StorageError> {
        let Some(dir_name) = area_info.first_dir_element() else {
            return Ok(CsiResult::default());
        };
        let owner = |pkg_id: PkgId| match user {
            Some(user) => Owner::for_user(pkg_id, user),
            None => Owner::new(pkg_id),
        };

        let installed = installed_dir_owner(self.pkg_repo.as_ref(), area_info, user).await?;
        if let Some(installed) = installed {
            return Ok(CsiResult::new([installed]));
        }

        let cleaned = clean_dir_name(&dir_name, self.lge_themes);
        if let Some(cleaned) = &cleaned {
            let hidden_pkg = PkgId::new(cleaned.as_str());
            if self.pkg_repo.is_installed(&hidden_pkg, user).await? {
                trace!("{} is hiding {}", dir_name, hidden_pkg);
                return Ok(CsiResult::new([owner(hidden_pkg)]));
            }
        }

        // Not the usual layout any more: every possible owner protects against false corpses
        let matches = self
            .clutter
            .match_segments(area_info.area_type(), std::slice::from_ref(&dir_name))
            .await;
        if !matches.is_empty() {
            return Ok(CsiResult::new(
                matches.iter().flat_map(|found| found.to_owners(user)),
            ));
        }

        Ok(CsiResult::new([owner(PkgId::new(
            cleaned.unwrap_or(dir_name),
        ))]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hidden_names_are_cleaned() {
        assert_eq!(
            clean_dir_name(".external.com.plexapp.android", false).as_deref(),
            Some("com.plexapp.android")
        );
        assert_eq!(clean_dir_name("_com.test", false).as_deref(), Some("com.test"));
        assert_eq!(clean_dir_name(".com.test", false).as_deref(), Some("com.test"));
        assert_eq!(clean_dir_name("com.test", false), None);
    }

    #[test]
    fn lge_theme_overlays_map_to_the_theme() {
        let name = "com.lge.theme.highcontrast.com.android.settings";
        assert_eq!(
            clean_dir_name(name, true).as_deref(),
            Some("com.lge.theme.highcontrast")
        );
        assert_eq!(clean_dir_name(name, false), None);
        assert_eq!(clean_dir_name("com.lge.theme.highcontrast", true), None);
        assert_eq!(clean_dir_name("com.lge.theme.bad!.x", true), None);
    }
}
