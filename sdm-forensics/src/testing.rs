// SPDX-License-Identifier: GPL-3.0-only

//! In-memory fakes for the contracts the forensics core depends on

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use sdm_contracts::{
    DataAreaModule, LocalGateway, PkgRepo, PlatformCapabilities, StorageError, StorageErrorKind,
};
use sdm_types::{
    AreaFlag, AreaType, FileType, GatewayMode, InstalledPkg, LocalPath, LookupInfo, PkgId,
    StorageArea, UserHandle,
};

use crate::areas::StorageAreaManager;

#[derive(Default)]
struct FakeFs {
    entries: BTreeMap<LocalPath, FileType>,
    unreadable: BTreeSet<LocalPath>,
    read_only: Vec<(LocalPath, GatewayMode)>,
    failing_deletes: BTreeSet<LocalPath>,
    root: bool,
    adb: bool,
    deleted: Vec<LocalPath>,
}

/// Filesystem tree held in memory, with per-mode write and root/ADB switches
#[derive(Clone, Default)]
pub(crate) struct FakeGateway {
    fs: Arc<Mutex<FakeFs>>,
}

impl FakeGateway {
    pub(crate) fn with_root(self) -> Self {
        self.fs.lock().unwrap().root = true;
        self
    }

    pub(crate) fn with_adb(self) -> Self {
        self.fs.lock().unwrap().adb = true;
        self
    }

    pub(crate) fn add_dir(&self, path: &str) -> &Self {
        self.insert(LocalPath::new(path), FileType::Directory);
        self
    }

    pub(crate) fn add_file(&self, path: &str) -> &Self {
        self.insert(LocalPath::new(path), FileType::File);
        self
    }

    fn insert(&self, path: LocalPath, file_type: FileType) {
        let mut fs = self.fs.lock().unwrap();
        let mut parent = path.parent();
        while let Some(dir) = parent {
            parent = dir.parent();
            fs.entries.entry(dir).or_insert(FileType::Directory);
        }
        fs.entries.insert(path, file_type);
    }

    pub(crate) fn deny_read(&self, path: &str) {
        self.fs.lock().unwrap().unreadable.insert(LocalPath::new(path));
    }

    /// Creating files below `path` fails in `mode`
    pub(crate) fn deny_write(&self, path: &str, mode: GatewayMode) {
        self.fs
            .lock()
            .unwrap()
            .read_only
            .push((LocalPath::new(path), mode));
    }

    pub(crate) fn fail_delete(&self, path: &str) {
        self.fs
            .lock()
            .unwrap()
            .failing_deletes
            .insert(LocalPath::new(path));
    }

    pub(crate) fn contains(&self, path: &str) -> bool {
        self.fs
            .lock()
            .unwrap()
            .entries
            .contains_key(&LocalPath::new(path))
    }

    pub(crate) fn deleted(&self) -> Vec<LocalPath> {
        self.fs.lock().unwrap().deleted.clone()
    }

    fn check_mode(&self, mode: GatewayMode) -> Result<(), StorageError> {
        let fs = self.fs.lock().unwrap();
        match mode {
            GatewayMode::Root if !fs.root => Err(StorageError::unsupported("root not available")),
            GatewayMode::Adb if !fs.adb => Err(StorageError::unsupported("adb not available")),
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl LocalGateway for FakeGateway {
    async fn exists(&self, path: &LocalPath, mode: GatewayMode) -> Result<bool, StorageError> {
        self.check_mode(mode)?;
        Ok(self.fs.lock().unwrap().entries.contains_key(path))
    }

    async fn can_read(&self, path: &LocalPath, mode: GatewayMode) -> Result<bool, StorageError> {
        self.check_mode(mode)?;
        let fs = self.fs.lock().unwrap();
        Ok(fs.entries.contains_key(path) && !fs.unreadable.contains(path))
    }

    async fn list_files(
        &self,
        path: &LocalPath,
        mode: GatewayMode,
    ) -> Result<Vec<LocalPath>, StorageError> {
        self.check_mode(mode)?;
        let fs = self.fs.lock().unwrap();
        if !fs.entries.contains_key(path) {
            return Err(StorageError::not_found(path.to_string()));
        }
        Ok(fs
            .entries
            .keys()
            .filter(|entry| entry.parent().as_ref() == Some(path))
            .cloned()
            .collect())
    }

    async fn lookup(
        &self,
        path: &LocalPath,
        mode: GatewayMode,
    ) -> Result<LookupInfo, StorageError> {
        self.check_mode(mode)?;
        let fs = self.fs.lock().unwrap();
        let file_type = fs
            .entries
            .get(path)
            .copied()
            .ok_or_else(|| StorageError::not_found(path.to_string()))?;
        Ok(LookupInfo {
            path: path.clone(),
            file_type,
            size: 0,
            modified_at: None,
        })
    }

    async fn create_file(&self, path: &LocalPath, mode: GatewayMode) -> Result<(), StorageError> {
        self.check_mode(mode)?;
        let denied = self
            .fs
            .lock()
            .unwrap()
            .read_only
            .iter()
            .any(|(dir, denied_mode)| *denied_mode == mode && dir.is_ancestor_of(path));
        if denied {
            return Err(StorageError::new(
                StorageErrorKind::PermissionDenied,
                path.to_string(),
            ));
        }
        self.insert(path.clone(), FileType::File);
        Ok(())
    }

    async fn delete(
        &self,
        path: &LocalPath,
        mode: GatewayMode,
        _recursive: bool,
    ) -> Result<(), StorageError> {
        self.check_mode(mode)?;
        let mut fs = self.fs.lock().unwrap();
        if fs.failing_deletes.contains(path) {
            // Children go first, the failing entry itself survives
            fs.entries.retain(|entry, _| !path.is_ancestor_of(entry));
            return Err(StorageError::new(
                StorageErrorKind::PermissionDenied,
                path.to_string(),
            ));
        }
        fs.entries
            .retain(|entry, _| !path.is_ancestor_or_same(entry));
        fs.deleted.push(path.clone());
        Ok(())
    }

    async fn has_root(&self) -> bool {
        self.fs.lock().unwrap().root
    }

    async fn has_adb(&self) -> bool {
        self.fs.lock().unwrap().adb
    }
}

#[derive(Clone, Default)]
pub(crate) struct FakePkgRepo {
    pkgs: Arc<Mutex<Vec<InstalledPkg>>>,
    failing: Arc<Mutex<bool>>,
}

impl FakePkgRepo {
    pub(crate) fn with(self, name: &str) -> Self {
        self.with_source(name, UserHandle::SYSTEM, None)
    }

    pub(crate) fn with_source(self, name: &str, user: UserHandle, source: Option<&str>) -> Self {
        self.pkgs.lock().unwrap().push(InstalledPkg {
            id: PkgId::new(name),
            user_handle: user,
            source_dir: source.map(LocalPath::new),
        });
        self
    }

    pub(crate) fn set_failing(&self, failing: bool) {
        *self.failing.lock().unwrap() = failing;
    }
}

#[async_trait]
impl PkgRepo for FakePkgRepo {
    async fn current_pkgs(&self) -> Result<Vec<InstalledPkg>, StorageError> {
        if *self.failing.lock().unwrap() {
            return Err(StorageError::new(
                StorageErrorKind::Unavailable,
                "package manager died",
            ));
        }
        Ok(self.pkgs.lock().unwrap().clone())
    }
}

#[derive(Debug, Clone)]
pub(crate) struct FakePlatform {
    pub(crate) api_level: u32,
    pub(crate) users: Vec<UserHandle>,
    pub(crate) secondary: Vec<LocalPath>,
}

impl Default for FakePlatform {
    fn default() -> Self {
        Self {
            api_level: 34,
            users: vec![UserHandle::SYSTEM],
            secondary: Vec::new(),
        }
    }
}

impl PlatformCapabilities for FakePlatform {
    fn api_level(&self) -> u32 {
        self.api_level
    }

    fn current_user(&self) -> UserHandle {
        self.users[0]
    }

    fn all_users(&self) -> Vec<UserHandle> {
        self.users.clone()
    }

    fn cpu_arch_folders(&self) -> Vec<String> {
        vec!["arm64".to_string(), "arm".to_string()]
    }

    fn data_dir(&self) -> LocalPath {
        LocalPath::new("/data")
    }

    fn download_cache_dir(&self) -> LocalPath {
        LocalPath::new("/cache")
    }

    fn system_dirs(&self) -> Vec<LocalPath> {
        vec![LocalPath::new("/system"), LocalPath::new("/vendor")]
    }

    fn public_primary_storage(&self, user: UserHandle) -> Option<LocalPath> {
        Some(LocalPath::new(format!("/storage/emulated/{}", user.id())))
    }

    fn public_secondary_storage(&self, _user: UserHandle) -> Vec<LocalPath> {
        self.secondary.clone()
    }
}

/// First pass module publishing a fixed set of areas
pub(crate) struct StaticAreas(pub(crate) Vec<StorageArea>);

#[async_trait]
impl DataAreaModule for StaticAreas {
    fn name(&self) -> &'static str {
        "static"
    }

    async fn first_pass(&self) -> Result<Vec<StorageArea>, StorageError> {
        Ok(self.0.clone())
    }
}

pub(crate) fn area(area_type: AreaType, path: &str) -> StorageArea {
    StorageArea::new(area_type, LocalPath::new(path), UserHandle::SYSTEM)
}

pub(crate) fn primary(area_type: AreaType, path: &str) -> StorageArea {
    area(area_type, path).with_flags([AreaFlag::Primary])
}

pub(crate) fn manager_with(areas: Vec<StorageArea>) -> Arc<StorageAreaManager> {
    Arc::new(StorageAreaManager::new(vec![Arc::new(StaticAreas(areas))]))
}
