// SPDX-License-Identifier: GPL-3.0-only

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::future::join_all;
use sdm_contracts::{DataAreaModule, StorageError};
use sdm_types::{AreaFlag, AreaType, StorageArea, UserHandle};
use serde::Serialize;
use tokio::sync::{Mutex, watch};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscoveryPass {
    First,
    Second,
}

/// A module that failed during discovery and contributed nothing for that pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModuleFailure {
    pub module: &'static str,
    pub pass: DiscoveryPass,
    pub error: StorageError,
}

/// One published discovery result, replaced wholesale on every reload
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AreaSnapshot {
    pub generation: u64,
    pub areas: Vec<StorageArea>,
    pub failures: Vec<ModuleFailure>,
}

impl AreaSnapshot {
    pub fn of_type(&self, area_type: AreaType) -> impl Iterator<Item = &StorageArea> {
        self.areas
            .iter()
            .filter(move |area| area.area_type == area_type)
    }
}

/// Owns the current set of storage areas
///
/// Modules run in registration order. Concurrent reloads race, and only the
/// most recently triggered one publishes.
pub struct StorageAreaManager {
    modules: Vec<Arc<dyn DataAreaModule>>,
    generation: AtomicU64,
    state: watch::Sender<Option<Arc<AreaSnapshot>>>,
    first_load: Mutex<()>,
}

impl StorageAreaManager {
    pub fn new(modules: Vec<Arc<dyn DataAreaModule>>) -> Self {
        let (state, _) = watch::channel(None);
        Self {
            modules,
            generation: AtomicU64::new(0),
            state,
            first_load: Mutex::new(()),
        }
    }

    pub fn module_names(&self) -> Vec<&'static str> {
        self.modules.iter().map(|module| module.name()).collect()
    }

    /// Latest published snapshot, if discovery ran at least once
    pub fn latest(&self) -> Option<Arc<AreaSnapshot>> {
        self.state.borrow().clone()
    }

    /// Receiver that immediately holds the latest snapshot and sees every later one
    pub async fn subscribe(&self) -> watch::Receiver<Option<Arc<AreaSnapshot>>> {
        self.snapshot().await;
        self.state.subscribe()
    }

    /// Current areas, discovering them on first use
    pub async fn current_areas(&self) -> Vec<StorageArea> {
        self.snapshot().await.areas.clone()
    }

    pub async fn snapshot(&self) -> Arc<AreaSnapshot> {
        if let Some(snapshot) = self.latest() {
            return snapshot;
        }
        let _guard = self.first_load.lock().await;
        if let Some(snapshot) = self.latest() {
            return snapshot;
        }
        self.reload().await
    }

    /// Runs a full discovery
    ///
    /// The result is published only if no newer reload was triggered in the
    /// meantime; a superseded caller still gets the snapshot it computed.
    pub async fn reload(&self) -> Arc<AreaSnapshot> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        info!("Discovering storage areas (generation {})", generation);

        let snapshot = Arc::new(self.discover(generation).await);

        let published = self.state.send_if_modified(|current| {
            if self.generation.load(Ordering::SeqCst) != generation {
                return false;
            }
            *current = Some(snapshot.clone());
            true
        });
        if published {
            info!(
                "Published {} storage areas (generation {}, {} module failures)",
                snapshot.areas.len(),
                generation,
                snapshot.failures.len()
            );
        } else {
            debug!("Discovery generation {} was superseded", generation);
        }
        snapshot
    }

    async fn discover(&self, generation: u64) -> AreaSnapshot {
        let mut failures = Vec::new();

        let first_results = join_all(self.modules.iter().map(|module| async move {
            (module.name(), module.first_pass().await)
        }))
        .await;
        let mut first_pass = Vec::new();
        for (module, result) in first_results {
            match result {
                Ok(areas) => {
                    debug!("{} first pass: {} areas", module, areas.len());
                    first_pass.extend(areas);
                }
                Err(error) => {
                    warn!("{} failed during first pass: {}", module, error);
                    failures.push(ModuleFailure {
                        module,
                        pass: DiscoveryPass::First,
                        error,
                    });
                }
            }
        }
        let first_pass = dedup_areas(first_pass);

        let second_results = join_all(self.modules.iter().map(|module| {
            let first_pass = &first_pass;
            async move { (module.name(), module.second_pass(first_pass).await) }
        }))
        .await;
        let mut areas = first_pass.clone();
        for (module, result) in second_results {
            match result {
                Ok(derived) => {
                    debug!("{} second pass: {} areas", module, derived.len());
                    areas.extend(derived);
                }
                Err(error) => {
                    warn!("{} failed during second pass: {}", module, error);
                    failures.push(ModuleFailure {
                        module,
                        pass: DiscoveryPass::Second,
                        error,
                    });
                }
            }
        }

        AreaSnapshot {
            generation,
            areas: enforce_unique_primary(dedup_areas(areas)),
            failures,
        }
    }
}

/// Keeps the first area per `(type, user, path)`, merging the flags of later duplicates
pub fn dedup_areas(areas: Vec<StorageArea>) -> Vec<StorageArea> {
    let mut result: Vec<StorageArea> = Vec::with_capacity(areas.len());
    let mut index = HashMap::new();
    for area in areas {
        let key = (area.area_type, area.user_handle, area.path.clone());
        match index.get(&key) {
            Some(&position) => {
                debug!("Dropping duplicate area {}", area);
                let kept: &mut StorageArea = &mut result[position];
                kept.flags.extend(area.flags);
            }
            None => {
                index.insert(key, result.len());
                result.push(area);
            }
        }
    }
    result
}

/// Only the first PRIMARY per `(type, user)` keeps the flag
pub fn enforce_unique_primary(mut areas: Vec<StorageArea>) -> Vec<StorageArea> {
    let mut seen: HashSet<(AreaType, UserHandle)> = HashSet::new();
    for area in areas.iter_mut().filter(|area| area.is_primary()) {
        if !seen.insert((area.area_type, area.user_handle)) {
            warn!(
                "Multiple PRIMARY areas for {} user {}, demoting {}",
                area.area_type, area.user_handle, area.path
            );
            area.flags.remove(&AreaFlag::Primary);
        }
    }
    areas
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;
    use sdm_contracts::{LocalGateway, StorageErrorKind};
    use sdm_types::{GatewayMode, LocalPath};

    use super::*;
    use crate::testing::{FakeGateway, StaticAreas, area, primary};

    /// Derives `<A>/probe-child` as a SYSTEM area when `<A>/probe` exists
    struct ProbeModule {
        gateway: FakeGateway,
    }

    #[async_trait]
    impl DataAreaModule for ProbeModule {
        fn name(&self) -> &'static str {
            "probe"
        }

        async fn second_pass(
            &self,
            first_pass: &[StorageArea],
        ) -> Result<Vec<StorageArea>, StorageError> {
            let mut derived = Vec::new();
            for parent in first_pass {
                let probe = parent.path.child("probe");
                if self.gateway.exists(&probe, GatewayMode::Normal).await? {
                    derived.push(StorageArea::new(
                        AreaType::System,
                        parent.path.child("probe-child"),
                        parent.user_handle,
                    ));
                }
            }
            Ok(derived)
        }
    }

    struct FailingModule;

    #[async_trait]
    impl DataAreaModule for FailingModule {
        fn name(&self) -> &'static str {
            "failing"
        }

        async fn first_pass(&self) -> Result<Vec<StorageArea>, StorageError> {
            Err(StorageError::new(StorageErrorKind::Unavailable, "boom"))
        }
    }

    /// Returns a fresh area per call, slowly on the first call
    struct SlowModule {
        calls: AtomicU64,
    }

    #[async_trait]
    impl DataAreaModule for SlowModule {
        fn name(&self) -> &'static str {
            "slow"
        }

        async fn first_pass(&self) -> Result<Vec<StorageArea>, StorageError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call == 0 {
                tokio::time::sleep(Duration::from_millis(200)).await;
            }
            Ok(vec![area(AreaType::Data, &format!("/data-{call}"))])
        }
    }

    fn manager(gateway: &FakeGateway) -> StorageAreaManager {
        StorageAreaManager::new(vec![
            Arc::new(StaticAreas(vec![area(AreaType::Data, "/a")])),
            Arc::new(ProbeModule {
                gateway: gateway.clone(),
            }),
        ])
    }

    #[tokio::test]
    async fn second_pass_only_derives_confirmed_areas() {
        let gateway = FakeGateway::default();
        let areas = manager(&gateway).current_areas().await;
        assert_eq!(areas, vec![area(AreaType::Data, "/a")]);

        gateway.add_file("/a/probe");
        let areas = manager(&gateway).current_areas().await;
        assert_eq!(
            areas,
            vec![
                area(AreaType::Data, "/a"),
                area(AreaType::System, "/a/probe-child")
            ]
        );
    }

    #[tokio::test]
    async fn failing_module_is_reported_but_does_not_block_others() {
        let manager = StorageAreaManager::new(vec![
            Arc::new(FailingModule),
            Arc::new(StaticAreas(vec![area(AreaType::Data, "/a")])),
        ]);

        let snapshot = manager.snapshot().await;
        assert_eq!(snapshot.areas, vec![area(AreaType::Data, "/a")]);
        assert_eq!(snapshot.failures.len(), 1);
        assert_eq!(snapshot.failures[0].module, "failing");
        assert_eq!(snapshot.failures[0].pass, DiscoveryPass::First);
    }

    #[tokio::test]
    async fn duplicates_are_merged_and_primary_is_unique() {
        let manager = StorageAreaManager::new(vec![
            Arc::new(StaticAreas(vec![
                primary(AreaType::Sdcard, "/storage/emulated/0"),
                area(AreaType::Sdcard, "/storage/emulated/0"),
                primary(AreaType::Sdcard, "/storage/1A2B-3C4D"),
            ])),
            Arc::new(StaticAreas(vec![area(AreaType::Sdcard, "/storage/emulated/0")])),
        ]);

        let areas = manager.current_areas().await;
        assert_eq!(areas.len(), 2);
        assert!(areas[0].is_primary());
        assert_eq!(areas[0].path, LocalPath::new("/storage/emulated/0"));
        assert!(!areas[1].is_primary());

        let keys: HashSet<_> = areas.iter().map(|area| area.key()).collect();
        assert_eq!(keys.len(), areas.len());
    }

    #[tokio::test]
    async fn newest_reload_wins() {
        let manager = Arc::new(StorageAreaManager::new(vec![Arc::new(SlowModule {
            calls: AtomicU64::new(0),
        })]));

        let slow = {
            let manager = manager.clone();
            tokio::spawn(async move { manager.reload().await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        let fast = manager.reload().await;
        let superseded = slow.await.expect("join");

        assert_eq!(superseded.generation, 1);
        assert_eq!(fast.generation, 2);
        let latest = manager.latest().expect("published");
        assert_eq!(latest.generation, 2);
        assert_eq!(latest.areas, vec![area(AreaType::Data, "/data-1")]);
    }

    #[tokio::test]
    async fn subscribers_replay_latest_and_see_reloads() {
        let gateway = FakeGateway::default();
        let manager = manager(&gateway);

        let mut rx = manager.subscribe().await;
        assert_eq!(rx.borrow_and_update().as_ref().map(|s| s.generation), Some(1));

        gateway.add_file("/a/probe");
        manager.reload().await;
        rx.changed().await.expect("changed");
        let snapshot = rx.borrow().clone().expect("snapshot");
        assert_eq!(snapshot.generation, 2);
        assert_eq!(snapshot.of_type(AreaType::System).count(), 1);
    }
}
