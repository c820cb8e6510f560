// SPDX-License-Identifier: GPL-3.0-only

use std::fs;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use sdm_contracts::{LocalGateway, PkgRepo, PlatformCapabilities};
use sdm_forensics::areas::default_modules;
use sdm_forensics::clutter::ManualMarkerSource;
use sdm_forensics::csi::{default_processors, default_sub_processors};
use sdm_forensics::expendables::default_filters;
use sdm_forensics::{ClutterRepo, FileForensics, FilterRegistry, StorageAreaManager};
use sdm_shell::ShellOps;
use sdm_sys::{HostPlatform, PmPkgRepo, ShellGateway, StaticPkgRepo};
use sdm_types::AreaType;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::settings::{Settings, derive_watch};

/// Fully wired core: one instance of every service, in their fixed orders
pub struct CoreRegistry {
    shell_ops: Arc<ShellOps>,
    platform: Arc<dyn PlatformCapabilities>,
    areas: Arc<StorageAreaManager>,
    clutter: Arc<ClutterRepo>,
    forensics: FileForensics,
    filters: FilterRegistry,
}

impl CoreRegistry {
    /// Builds the core from the current settings
    ///
    /// Shell configuration and the enabled filters keep following `settings`
    /// until `scope` is cancelled.
    pub fn build(
        settings: watch::Receiver<Arc<Settings>>,
        scope: CancellationToken,
    ) -> Result<Self> {
        let snapshot = settings.borrow().clone();

        let shell_config = derive_watch(settings.clone(), scope.clone(), Settings::shell_config);
        let shell_ops = Arc::new(ShellOps::new(shell_config, scope.clone()));
        let gateway: Arc<dyn LocalGateway> =
            Arc::new(ShellGateway::new(shell_ops.clone(), shell_ops.clone()));
        let platform: Arc<dyn PlatformCapabilities> =
            Arc::new(HostPlatform::detect(&snapshot.platform_config()));

        let pkg_repo: Arc<dyn PkgRepo> = match &snapshot.areas.packages_file {
            Some(path) => {
                let listing = fs::read_to_string(path)
                    .with_context(|| format!("Failed to read package listing {}", path.display()))?;
                let repo = StaticPkgRepo::from_listing(&listing, platform.current_user());
                info!("Loaded {} packages from {}", repo.0.len(), path.display());
                Arc::new(repo)
            }
            None => Arc::new(PmPkgRepo::new(shell_ops.clone(), platform.all_users())),
        };

        let areas = Arc::new(StorageAreaManager::new(default_modules(
            platform.clone(),
            gateway.clone(),
        )));

        let clutter = Arc::new(ClutterRepo::with_defaults(pkg_repo.clone())?);
        for path in &snapshot.clutter.extra_marker_files {
            let json = fs::read_to_string(path)
                .with_context(|| format!("Failed to read marker file {}", path.display()))?;
            let source = ManualMarkerSource::from_json(
                path.display().to_string(),
                pkg_repo.clone(),
                &json,
            )
            .with_context(|| format!("Invalid marker file {}", path.display()))?;
            clutter.append_source(Arc::new(source));
        }

        let forensics = FileForensics::new(
            default_processors(
                areas.clone(),
                platform.clone(),
                pkg_repo.clone(),
                gateway.clone(),
                clutter.clone(),
            ),
            default_sub_processors(clutter.clone()),
            pkg_repo,
        );

        let enabled = derive_watch(settings, scope, |settings| settings.expendables.enabled());
        let filters = FilterRegistry::new(default_filters(gateway.clone()), enabled);

        debug!(
            "Registry: modules={:?}, processors={:?}, markers={:?}, filters={:?}",
            areas.module_names(),
            forensics.processor_names(),
            clutter.source_names(),
            filters.identifiers()
        );

        Ok(Self {
            shell_ops,
            platform,
            areas,
            clutter,
            forensics,
            filters,
        })
    }

    /// Fails when an area type has no CSI processor to route it to
    pub fn check_routes<'a>(
        &self,
        area_types: impl IntoIterator<Item = &'a AreaType>,
    ) -> Result<()> {
        for area_type in area_types {
            if self.forensics.route_for(*area_type).is_none() {
                return Err(anyhow!(
                    "Missing required CSI routing for area type: {:?}",
                    area_type
                ));
            }
        }
        Ok(())
    }

    /// Discovers areas and verifies every discovered type can be routed
    pub async fn start(&self) -> Result<()> {
        self.check_routes(&AreaType::ALL)?;
        let snapshot = self.areas.snapshot().await;
        self.check_routes(snapshot.areas.iter().map(|area| &area.area_type))?;
        info!(
            "Discovered {} storage areas ({} module failures) on api {}",
            snapshot.areas.len(),
            snapshot.failures.len(),
            self.platform.api_level()
        );
        self.filters.initialize_enabled().await?;
        Ok(())
    }

    pub fn shell_ops(&self) -> &Arc<ShellOps> {
        &self.shell_ops
    }

    pub fn areas(&self) -> &Arc<StorageAreaManager> {
        &self.areas
    }

    pub fn clutter(&self) -> &Arc<ClutterRepo> {
        &self.clutter
    }

    pub fn forensics(&self) -> &FileForensics {
        &self.forensics
    }

    pub fn filters(&self) -> &FilterRegistry {
        &self.filters
    }
}
