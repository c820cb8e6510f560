// SPDX-License-Identifier: GPL-3.0-only

//! `DALVIK_DEX`: compiled dex and oat files
//!
//! Cache file names encode the source path with `@` as separator, e.g.
//! `data@app@com.test-1@base.apk@classes.dex`. Owners are found by turning the
//! name back into candidate source locations and matching those against the
//! installed packages' code paths.

use std::sync::Arc;

use async_trait::async_trait;
use sdm_contracts::{CsiProcessor, LocalGateway, PkgRepo, PlatformCapabilities, StorageError};
use sdm_types::{AreaInfo, AreaType, CsiResult, GatewayMode, LocalPath, Owner};
use tracing::{debug, trace, warn};

use crate::areas::StorageAreaManager;
use crate::error::ForensicsError;

const POSTFIX_EXTENSIONS: [&str; 5] = [
    "@classes.dex",
    "@classes.odex",
    "@classes.dex.art",
    "@classes.oat",
    "@classes.vdex",
];
const DEX_EXTENSIONS: [&str; 5] = [".dex", ".odex", ".oat", ".art", ".vdex"];
const SOURCE_EXTENSIONS: [&str; 3] = [".apk", ".jar", ".zip"];

/// Areas whose contents get compiled into the dalvik cache
const SOURCE_AREA_TYPES: [AreaType; 3] =
    [AreaType::AppApp, AreaType::SystemApp, AreaType::SystemPrivApp];

/// Strip the compiled postfix from a cache file name
///
/// `x.jar@classes.dex` and `x.apk.odex` become `x.jar` / `x.apk`, or `x` with
/// `remove_extension`. Names without a known postfix are returned unchanged.
fn remove_postfix(file_name: &str, remove_extension: bool) -> String {
    let mut cutoff = POSTFIX_EXTENSIONS
        .iter()
        .find(|ext| file_name.ends_with(*ext))
        .map(|ext| file_name.len() - ext.len());

    if cutoff.is_none() {
        cutoff = DEX_EXTENSIONS.iter().find_map(|dex| {
            let index = file_name.rfind(dex)?;
            let without = &file_name[..index];
            SOURCE_EXTENSIONS
                .iter()
                .any(|ext| without.ends_with(ext))
                .then_some(index)
        });
    }

    let Some(cutoff) = cutoff else {
        return file_name.to_string();
    };
    let mut result = &file_name[..cutoff];
    if remove_extension {
        if let Some(dot) = result.rfind('.') {
            result = &result[..dot];
        }
    }
    result.to_string()
}

fn file_name_to_path(file_name: &str) -> LocalPath {
    LocalPath::new(file_name.replace('@', "/"))
}

fn push_unique(candidates: &mut Vec<LocalPath>, candidate: LocalPath) {
    if !candidates.contains(&candidate) {
        candidates.push(candidate);
    }
}

/// Possible source locations of a dalvik cache file
pub struct DalvikCandidateGenerator {
    areas: Arc<StorageAreaManager>,
    platform: Arc<dyn PlatformCapabilities>,
}

impl DalvikCandidateGenerator {
    pub fn new(areas: Arc<StorageAreaManager>, platform: Arc<dyn PlatformCapabilities>) -> Self {
        Self { areas, platform }
    }

    async fn source_paths(&self) -> Vec<LocalPath> {
        let snapshot = self.areas.snapshot().await;
        let mut paths = Vec::new();
        for area_type in SOURCE_AREA_TYPES {
            for area in snapshot.of_type(area_type) {
                push_unique(&mut paths, area.path.clone());
            }
        }
        for area in snapshot.of_type(AreaType::System) {
            push_unique(&mut paths, area.path.child("framework"));
        }
        paths
    }

    /// Candidates in decreasing likelihood, without duplicates
    pub async fn candidates(&self, dex_file: &LocalPath) -> Vec<LocalPath> {
        let name = dex_file.name();
        let mut candidates = Vec::new();

        // system@framework@boot.oat -> /system/framework/boot.oat
        push_unique(&mut candidates, file_name_to_path(name));

        // data@app@com.test.apk@classes.dex -> /data/app/com.test.apk
        let without_postfix = file_name_to_path(&remove_postfix(name, false));
        push_unique(&mut candidates, without_postfix.clone());

        // data@app@com.test.apk@classes.dex -> /data/app/com.test.{apk,jar,zip}
        let without_extension = file_name_to_path(&remove_postfix(name, true));
        let extension_parent = without_extension.parent().unwrap_or_else(LocalPath::root);
        for ext in SOURCE_EXTENSIONS {
            push_unique(
                &mut candidates,
                extension_parent.child(format!("{}{ext}", without_extension.name())),
            );
        }

        let sources = self.source_paths().await;

        // dalvik-cache/arm64/system@framework@boot.oat -> /system/framework/arm64/boot.oat
        let dex_segments = dex_file.segments();
        for arch in self.platform.cpu_arch_folders() {
            if !dex_segments.contains(&arch) {
                continue;
            }
            let postfix_parent = without_postfix.parent().unwrap_or_else(LocalPath::root);
            push_unique(
                &mut candidates,
                LocalPath::build(&postfix_parent, [arch.as_str(), without_postfix.name()]),
            );
            for source in &sources {
                push_unique(
                    &mut candidates,
                    LocalPath::build(source, [arch.as_str(), without_postfix.name()]),
                );
            }
        }

        for source in &sources {
            // Same name, different storage
            push_unique(&mut candidates, source.child(name));
            push_unique(&mut candidates, source.child(without_postfix.name()));
            // Webview.apk@classes.dex -> Webview/base.apk
            push_unique(
                &mut candidates,
                LocalPath::build(source, [without_extension.name(), "base.apk"]),
            );
            // Webview.dex -> Webview/Webview.apk
            push_unique(
                &mut candidates,
                LocalPath::build(source, [without_extension.name(), without_postfix.name()]),
            );
            for ext in SOURCE_EXTENSIONS {
                push_unique(
                    &mut candidates,
                    source.child(format!("{}{ext}", without_extension.name())),
                );
            }
        }

        trace!("{} candidates for {}: {:?}", candidates.len(), dex_file, candidates);
        candidates
    }
}

/// A package's code path explains a candidate
fn source_matches(source: &LocalPath, candidate: &LocalPath) -> bool {
    if source.is_ancestor_or_same(candidate) {
        return true;
    }
    // `source` may point at the apk inside the package directory
    source.name().ends_with(".apk") && source.parent().as_ref() == Some(candidate)
}

pub struct DalvikDexCsi {
    areas: Arc<StorageAreaManager>,
    pkg_repo: Arc<dyn PkgRepo>,
    gateway: Arc<dyn LocalGateway>,
    generator: DalvikCandidateGenerator,
}

impl DalvikDexCsi {
    pub fn new(
        areas: Arc<StorageAreaManager>,
        platform: Arc<dyn PlatformCapabilities>,
        pkg_repo: Arc<dyn PkgRepo>,
        gateway: Arc<dyn LocalGateway>,
    ) -> Self {
        Self {
            generator: DalvikCandidateGenerator::new(areas.clone(), platform),
            areas,
            pkg_repo,
            gateway,
        }
    }
}

#[async_trait]
impl CsiProcessor for DalvikDexCsi {
    fn name(&self) -> &'static str {
        "dalvik-dex"
    }

    fn has_jurisdiction(&self, area_type: AreaType) -> bool {
        area_type == AreaType::DalvikDex
    }

    async fn identify_area(&self, target: &LocalPath) -> Result<Option<AreaInfo>, StorageError> {
        let snapshot = self.areas.snapshot().await;
        Ok(snapshot
            .of_type(AreaType::DalvikDex)
            .find(|area| area.path.is_ancestor_of(target))
            .map(|area| AreaInfo {
                data_area: area.clone(),
                file: target.clone(),
                prefix: area.path.clone(),
                is_blacklist_location: true,
            }))
    }

    async fn find_owners(&self, area_info: &AreaInfo) -> Result<CsiResult, StorageError> {
        if !self.has_jurisdiction(area_info.area_type()) {
            return Err(ForensicsError::WrongJurisdiction {
                processor: self.name(),
                area_type: area_info.area_type(),
            }
            .into());
        }

        let candidates = self.generator.candidates(&area_info.file).await;
        let pkgs = self.pkg_repo.current_pkgs().await?;
        let owners: Vec<Owner> = pkgs
            .iter()
            .filter(|pkg| {
                pkg.source_dir.as_ref().is_some_and(|source| {
                    candidates
                        .iter()
                        .any(|candidate| source_matches(source, candidate))
                })
            })
            .map(|pkg| Owner::for_user(pkg.id.clone(), pkg.user_handle))
            .collect();
        if !owners.is_empty() {
            return Ok(CsiResult::new(owners));
        }

        // Boot images and framework jars exist without belonging to a package
        for candidate in &candidates {
            match self.gateway.exists(candidate, GatewayMode::Auto).await {
                Ok(true) => {
                    debug!("{} has a source without package: {}", area_info.file, candidate);
                    return Ok(CsiResult::known_unknown());
                }
                Ok(false) => {}
                Err(e) => warn!("Failed to check candidate {}: {}", candidate, e),
            }
        }
        Ok(CsiResult::default())
    }
}
