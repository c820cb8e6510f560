// SPDX-License-Identifier: GPL-3.0-only

use std::sync::Arc;

use sdm_contracts::{CsiProcessor, CsiSubProcessor, PkgRepo};
use sdm_types::{AreaInfo, AreaType, CsiResult, LocalPath, MarkerFlag, Owner};
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{ForensicsError, Result};

/// Owner plus whether it is still installed; `None` when that can't be confirmed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OwnerState {
    pub owner: Owner,
    pub installed: Option<bool>,
}

/// Full forensic verdict for one path
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OwnerInfo {
    pub target: LocalPath,
    pub area_info: Option<AreaInfo>,
    pub owners: Vec<OwnerState>,
    pub has_known_unknown_owner: bool,
}

impl OwnerInfo {
    fn unknown(target: LocalPath) -> Self {
        Self {
            target,
            area_info: None,
            owners: Vec::new(),
            has_known_unknown_owner: false,
        }
    }

    fn any_flag(&self, flag: MarkerFlag) -> bool {
        self.owners.iter().any(|state| state.owner.has_flag(flag))
    }

    pub fn is_keeper(&self) -> bool {
        self.any_flag(MarkerFlag::Keeper)
    }

    pub fn is_common(&self) -> bool {
        self.any_flag(MarkerFlag::Common)
    }

    pub fn installed_owners(&self) -> impl Iterator<Item = &Owner> {
        self.owners
            .iter()
            .filter(|state| state.installed == Some(true))
            .map(|state| &state.owner)
    }

    /// Every owner is confirmed uninstalled and nothing marks the data as shared or worth keeping
    pub fn is_corpse(&self) -> bool {
        self.area_info.is_some()
            && !self.owners.is_empty()
            && !self.has_known_unknown_owner
            && !self.is_keeper()
            && !self.is_common()
            && self
                .owners
                .iter()
                .all(|state| state.installed == Some(false))
    }

    /// Gate for deleting without asking the user
    ///
    /// An unknown area, no owners at all, a known-unknown owner or a keeper
    /// marker all block unattended deletion.
    pub fn is_eligible_for_unattended_deletion(&self) -> bool {
        self.area_info.is_some()
            && !self.owners.is_empty()
            && !self.has_known_unknown_owner
            && !self.is_keeper()
    }
}

/// Path to area to owner attribution over an ordered list of processors
pub struct FileForensics {
    processors: Vec<Arc<dyn CsiProcessor>>,
    sub_processors: Vec<Arc<dyn CsiSubProcessor>>,
    pkg_repo: Arc<dyn PkgRepo>,
}

impl FileForensics {
    pub fn new(
        processors: Vec<Arc<dyn CsiProcessor>>,
        sub_processors: Vec<Arc<dyn CsiSubProcessor>>,
        pkg_repo: Arc<dyn PkgRepo>,
    ) -> Self {
        Self {
            processors,
            sub_processors,
            pkg_repo,
        }
    }

    pub fn processor_names(&self) -> Vec<&'static str> {
        self.processors.iter().map(|processor| processor.name()).collect()
    }

    /// First processor, in registration order, with jurisdiction over `area_type`
    pub fn route_for(&self, area_type: AreaType) -> Option<&Arc<dyn CsiProcessor>> {
        self.processors
            .iter()
            .find(|processor| processor.has_jurisdiction(area_type))
    }

    /// Map `target` onto the area containing it
    ///
    /// When several processors claim the path the longest prefix wins; equal
    /// prefixes go to the earlier registered processor.
    pub async fn identify_area(&self, target: &LocalPath) -> Option<AreaInfo> {
        let mut claims: Vec<(&'static str, AreaInfo)> = Vec::new();
        for processor in &self.processors {
            match processor.identify_area(target).await {
                Ok(Some(area_info)) => claims.push((processor.name(), area_info)),
                Ok(None) => {}
                Err(e) => warn!("{} failed to identify {}: {}", processor.name(), target, e),
            }
        }

        if claims.len() > 1 {
            warn!(
                "Ambiguous area for {}: {:?}",
                target,
                claims
                    .iter()
                    .map(|(name, info)| format!("{name}={}@{}", info.area_type(), info.prefix))
                    .collect::<Vec<_>>()
            );
        }

        let mut best: Option<(&'static str, AreaInfo)> = None;
        for (name, area_info) in claims {
            let deeper = best
                .as_ref()
                .is_none_or(|(_, current)| area_info.prefix.depth() > current.prefix.depth());
            if deeper {
                best = Some((name, area_info));
            }
        }

        let (name, area_info) = best?;
        debug!("{} identified {} as {}", name, target, area_info.data_area);
        Some(area_info)
    }

    /// Owners of an identified path
    ///
    /// The processor with jurisdiction runs first, then every sub-processor
    /// with jurisdiction. Failures of individual heuristics are logged and
    /// skipped.
    pub async fn find_owners(&self, area_info: &AreaInfo) -> Result<CsiResult> {
        let area_type = area_info.area_type();
        let processor = self
            .route_for(area_type)
            .ok_or(ForensicsError::NoJurisdiction(area_type))?;

        let mut result = match processor.find_owners(area_info).await {
            Ok(result) => result,
            Err(e) => {
                warn!("{} failed on {}: {}", processor.name(), area_info.file, e);
                CsiResult::default()
            }
        };

        for sub in &self.sub_processors {
            if !sub.has_jurisdiction(area_type) {
                continue;
            }
            match sub.process(area_info).await {
                Ok(found) => result = result.merge(found),
                Err(e) => warn!("{} failed on {}: {}", sub.name(), area_info.file, e),
            }
        }

        debug!("Owners of {}: {:?}", area_info.file, result);
        Ok(result)
    }

    /// Identify, attribute and check installation state in one go
    pub async fn find_owners_for(&self, target: &LocalPath) -> Result<OwnerInfo> {
        let Some(area_info) = self.identify_area(target).await else {
            debug!("No area for {}", target);
            return Ok(OwnerInfo::unknown(target.clone()));
        };

        let result = self.find_owners(&area_info).await?;
        let mut owners = Vec::with_capacity(result.owners.len());
        for owner in result.owners {
            let installed = match self
                .pkg_repo
                .is_installed(&owner.pkg_id, owner.user_handle)
                .await
            {
                Ok(installed) => Some(installed),
                Err(e) => {
                    warn!("Can't confirm whether {} is installed: {}", owner.pkg_id, e);
                    None
                }
            };
            owners.push(OwnerState { owner, installed });
        }

        Ok(OwnerInfo {
            target: target.clone(),
            area_info: Some(area_info),
            owners,
            has_known_unknown_owner: result.has_known_unknown_owner,
        })
    }
}
