//! Data Provider Manager
//!
//! Owns the storage root, maps provider ids to backing files and keeps the
//! per-provider bookkeeping the resource rules depend on:
//! - reference count (live [`ProviderLease`]s)
//! - open readers and the single writer
//!
//! Deleting or relocating a provider is refused while it is referenced or
//! has open streams.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;
use walkdir::WalkDir;

use crate::config::StorageConfig;
use crate::data::manifest::{ManifestEntry, ProviderManifest, MANIFEST_FILE_NAME};
use crate::data::provider::{
    DataProvider, ProviderId, ProviderLease, ProviderReader, ProviderWriter,
};
use crate::error::{Result, TalkbookError};

/// Bookkeeping for one provider.
#[derive(Debug)]
struct ProviderEntry {
    file_name: String,
    /// Directory currently holding the file. Differs from the store root
    /// only after a partially failed relocation.
    location: PathBuf,
    mime_type: String,
    created_at: DateTime<Utc>,
    size_hint: Option<u64>,
    references: usize,
    readers: usize,
    writer: bool,
    /// Last lease went away while streams were open
    pending_delete: bool,
}

impl ProviderEntry {
    fn path(&self) -> PathBuf {
        self.location.join(&self.file_name)
    }

    fn has_open_streams(&self) -> bool {
        self.readers > 0 || self.writer
    }

    fn busy(&self, id: &ProviderId) -> TalkbookError {
        TalkbookError::ProviderBusy {
            id: id.clone(),
            readers: self.readers,
            writer: self.writer,
        }
    }
}

#[derive(Debug)]
struct ManagerState {
    root: PathBuf,
    config: StorageConfig,
    providers: BTreeMap<ProviderId, ProviderEntry>,
}

impl ManagerState {
    fn entry(&self, id: &ProviderId) -> Result<&ProviderEntry> {
        self.providers
            .get(id)
            .ok_or_else(|| TalkbookError::ProviderNotFound { id: id.clone() })
    }

    fn entry_mut(&mut self, id: &ProviderId) -> Result<&mut ProviderEntry> {
        self.providers
            .get_mut(id)
            .ok_or_else(|| TalkbookError::ProviderNotFound { id: id.clone() })
    }

    /// Remove the backing file and forget the provider.
    fn remove(&mut self, id: &ProviderId) -> Result<()> {
        if let Some(entry) = self.providers.get(id) {
            let path = entry.path();
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(TalkbookError::FileWriteError { path, source: e }),
            }
            self.providers.remove(id);
            debug!(provider = %id, "deleted data provider");
        }
        Ok(())
    }

    /// Delete a provider that is no longer referenced once its streams close.
    fn collect_if_unused(&mut self, id: &ProviderId) {
        let ready = self
            .providers
            .get(id)
            .map(|e| e.pending_delete && e.references == 0 && !e.has_open_streams())
            .unwrap_or(false);
        if ready {
            if let Err(e) = self.remove(id) {
                warn!(provider = %id, error = %e, "failed to delete unreferenced provider");
            }
        }
    }

    fn manifest(&self) -> ProviderManifest {
        let providers = self
            .providers
            .iter()
            .map(|(id, entry)| {
                (
                    id.clone(),
                    ManifestEntry {
                        file_name: entry.file_name.clone(),
                        mime_type: entry.mime_type.clone(),
                        created_at: entry.created_at,
                        location: (entry.location != self.root).then(|| entry.location.clone()),
                    },
                )
            })
            .collect();
        ProviderManifest { providers }
    }
}

/// Outcome of one provider in a relocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelocationFailure {
    pub id: ProviderId,
    pub error: String,
}

/// Which providers a [`DataProviderManager::relocate`] call moved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelocationReport {
    pub new_root: PathBuf,
    /// Files were copied (old files kept) rather than moved
    pub copied: bool,
    pub relocated: Vec<ProviderId>,
    /// Already at the new root, e.g. from an earlier partial attempt
    pub skipped: Vec<ProviderId>,
    pub failed: Vec<RelocationFailure>,
}

impl RelocationReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

impl fmt::Display for RelocationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} relocated, {} skipped, {} failed to {}",
            self.relocated.len(),
            self.skipped.len(),
            self.failed.len(),
            self.new_root.display()
        )?;
        for failure in &self.failed {
            write!(f, "; {}: {}", failure.id, failure.error)?;
        }
        Ok(())
    }
}

/// File-backed blob store.
///
/// Cloning yields another handle to the same store.
#[derive(Clone)]
pub struct DataProviderManager {
    inner: Arc<Mutex<ManagerState>>,
}

impl DataProviderManager {
    /// Create a manager over `root`, creating the directory if needed.
    pub fn new(root: &Path, config: StorageConfig) -> Result<Self> {
        if !root.exists() {
            fs::create_dir_all(root).map_err(|e| TalkbookError::DirectoryCreateError {
                path: root.to_path_buf(),
                source: e,
            })?;
        }

        Ok(DataProviderManager {
            inner: Arc::new(Mutex::new(ManagerState {
                root: root.to_path_buf(),
                config,
                providers: BTreeMap::new(),
            })),
        })
    }

    /// Reopen a store, registering every provider listed in its manifest.
    pub fn open(root: &Path, config: StorageConfig) -> Result<Self> {
        let manager = Self::new(root, config)?;
        let manifest = ProviderManifest::load(root)?;
        {
            let mut state = manager.state();
            for (id, entry) in manifest.providers {
                state.providers.insert(
                    id,
                    ProviderEntry {
                        file_name: entry.file_name,
                        location: entry.location.unwrap_or_else(|| root.to_path_buf()),
                        mime_type: entry.mime_type,
                        created_at: entry.created_at,
                        size_hint: None,
                        references: 0,
                        readers: 0,
                        writer: false,
                        pending_delete: false,
                    },
                );
            }
            info!(
                root = %root.display(),
                providers = state.providers.len(),
                "opened data provider store"
            );
        }
        Ok(manager)
    }

    fn state(&self) -> MutexGuard<'_, ManagerState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn same_store(&self, other: &DataProviderManager) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn root(&self) -> PathBuf {
        self.state().root.clone()
    }

    pub fn config(&self) -> StorageConfig {
        self.state().config.clone()
    }

    /// Allocate a new, empty backing file.
    ///
    /// `size_hint` sizes the write buffer of the provider's output streams.
    pub fn create_provider(
        &self,
        mime_type: &str,
        size_hint: Option<u64>,
    ) -> Result<DataProvider> {
        let mut state = self.state();
        let id = ProviderId::from(Uuid::new_v4().simple().to_string());
        let file_name = format!("{}.{}", id, state.config.file_extension);
        let location = state.root.clone();
        let path = location.join(&file_name);

        File::create(&path).map_err(|e| TalkbookError::FileWriteError {
            path: path.clone(),
            source: e,
        })?;

        state.providers.insert(
            id.clone(),
            ProviderEntry {
                file_name,
                location,
                mime_type: mime_type.to_string(),
                created_at: Utc::now(),
                size_hint,
                references: 0,
                readers: 0,
                writer: false,
                pending_delete: false,
            },
        );
        debug!(provider = %id, mime_type, "created data provider");

        Ok(DataProvider::new(id, self.clone()))
    }

    /// Look up a provider by id.
    pub fn provider(&self, id: &ProviderId) -> Option<DataProvider> {
        if self.state().providers.contains_key(id) {
            Some(DataProvider::new(id.clone(), self.clone()))
        } else {
            None
        }
    }

    /// Every provider currently registered.
    pub fn managed_providers(&self) -> Vec<DataProvider> {
        self.state()
            .providers
            .keys()
            .map(|id| DataProvider::new(id.clone(), self.clone()))
            .collect()
    }

    /// Open a reader on `provider` positioned at `byte_offset`.
    ///
    /// # Errors
    /// * `ProviderBusy` - if a writer is open on the provider
    /// * `ProviderNotFound` - if the provider was deleted
    pub fn get_input_stream(
        &self,
        provider: &DataProvider,
        byte_offset: u64,
    ) -> Result<ProviderReader> {
        let mut state = self.state();
        let id = provider.id();
        let entry = state.entry_mut(id)?;
        if entry.writer {
            return Err(entry.busy(id));
        }

        let path = entry.path();
        let mut file = File::open(&path).map_err(|e| TalkbookError::FileReadError {
            path: path.clone(),
            source: e,
        })?;
        file.seek(SeekFrom::Start(byte_offset))?;

        entry.readers += 1;
        Ok(ProviderReader::new(id.clone(), self.clone(), BufReader::new(file)))
    }

    /// Open the exclusive writer on `provider`, truncating its content.
    ///
    /// # Errors
    /// * `ProviderBusy` - if any reader or another writer is open
    pub fn get_output_stream(&self, provider: &DataProvider) -> Result<ProviderWriter> {
        let mut state = self.state();
        let capacity = state.config.copy_buffer_size;
        let id = provider.id();
        let entry = state.entry_mut(id)?;
        if entry.has_open_streams() {
            return Err(entry.busy(id));
        }

        let path = entry.path();
        let file = OpenOptions::new()
            .write(true)
            .truncate(true)
            .create(true)
            .open(&path)
            .map_err(|e| TalkbookError::FileWriteError {
                path: path.clone(),
                source: e,
            })?;

        let capacity = match entry.size_hint {
            Some(hint) => capacity.min(usize::try_from(hint).unwrap_or(usize::MAX)).max(1),
            None => capacity.max(1),
        };
        entry.writer = true;
        Ok(ProviderWriter::new(
            id.clone(),
            self.clone(),
            BufWriter::with_capacity(capacity, file),
        ))
    }

    /// Delete `provider` and its backing file.
    ///
    /// # Errors
    /// * `ProviderReferenced` - if any audio object still holds a lease
    /// * `ProviderBusy` - if any stream is open on it
    pub fn delete_provider(&self, provider: &DataProvider) -> Result<()> {
        let mut state = self.state();
        let id = provider.id();
        let entry = state.entry(id)?;
        if entry.references > 0 {
            return Err(TalkbookError::ProviderReferenced {
                id: id.clone(),
                references: entry.references,
            });
        }
        if entry.has_open_streams() {
            return Err(entry.busy(id));
        }
        state.remove(id)
    }

    /// Take a counted reference on `provider`.
    pub fn lease(&self, provider: &DataProvider) -> Result<ProviderLease> {
        let mut state = self.state();
        let entry = state.entry_mut(provider.id())?;
        entry.references += 1;
        entry.pending_delete = false;
        Ok(ProviderLease::new(provider.clone()))
    }

    pub fn reference_count(&self, provider: &DataProvider) -> Result<usize> {
        Ok(self.state().entry(provider.id())?.references)
    }

    /// Number of open readers and whether a writer is open.
    pub fn open_streams(&self, provider: &DataProvider) -> Result<(usize, bool)> {
        let state = self.state();
        let entry = state.entry(provider.id())?;
        Ok((entry.readers, entry.writer))
    }

    pub fn provider_path(&self, provider: &DataProvider) -> Result<PathBuf> {
        Ok(self.state().entry(provider.id())?.path())
    }

    pub fn provider_mime_type(&self, provider: &DataProvider) -> Result<String> {
        Ok(self.state().entry(provider.id())?.mime_type.clone())
    }

    pub fn provider_len(&self, provider: &DataProvider) -> Result<u64> {
        let path = self.provider_path(provider)?;
        let metadata =
            fs::metadata(&path).map_err(|e| TalkbookError::FileReadError { path, source: e })?;
        Ok(metadata.len())
    }

    pub(crate) fn retain(&self, id: &ProviderId) {
        if let Some(entry) = self.state().providers.get_mut(id) {
            entry.references += 1;
        }
    }

    pub(crate) fn release(&self, id: &ProviderId) {
        let mut state = self.state();
        let delete_unreferenced = state.config.delete_unreferenced;
        if let Some(entry) = state.providers.get_mut(id) {
            entry.references = entry.references.saturating_sub(1);
            if entry.references == 0 && delete_unreferenced {
                entry.pending_delete = true;
            }
        }
        state.collect_if_unused(id);
    }

    pub(crate) fn close_reader(&self, id: &ProviderId) {
        let mut state = self.state();
        if let Some(entry) = state.providers.get_mut(id) {
            entry.readers = entry.readers.saturating_sub(1);
        }
        state.collect_if_unused(id);
    }

    pub(crate) fn close_writer(&self, id: &ProviderId) {
        let mut state = self.state();
        if let Some(entry) = state.providers.get_mut(id) {
            entry.writer = false;
        }
        state.collect_if_unused(id);
    }

    /// Move (or copy) every backing file to `new_root`.
    ///
    /// Refused up front if any provider has an open stream. Otherwise each
    /// file is processed independently: providers that made it are recorded
    /// at the new location even when others fail, so calling `relocate`
    /// again with the same root only retries the failures.
    ///
    /// # Errors
    /// * `ProviderBusy` - naming the first provider with open streams
    /// * `DirectoryCreateError` - if `new_root` cannot be created
    /// * `RelocationFailed` - with the full report if any file failed
    pub fn relocate(&self, new_root: &Path, copy_data: bool) -> Result<RelocationReport> {
        let mut state = self.state();

        if let Some((id, entry)) = state.providers.iter().find(|(_, e)| e.has_open_streams()) {
            return Err(entry.busy(id));
        }

        fs::create_dir_all(new_root).map_err(|e| TalkbookError::DirectoryCreateError {
            path: new_root.to_path_buf(),
            source: e,
        })?;

        let old_root = state.root.clone();
        let mut report = RelocationReport {
            new_root: new_root.to_path_buf(),
            copied: copy_data,
            relocated: Vec::new(),
            skipped: Vec::new(),
            failed: Vec::new(),
        };

        for (id, entry) in state.providers.iter_mut() {
            if entry.location.as_path() == new_root {
                report.skipped.push(id.clone());
                continue;
            }

            let from = entry.path();
            let to = new_root.join(&entry.file_name);
            // Moved by an earlier attempt whose record was lost
            if !copy_data && !from.exists() && to.exists() {
                entry.location = new_root.to_path_buf();
                report.skipped.push(id.clone());
                continue;
            }

            let outcome = if copy_data {
                fs::copy(&from, &to).map(|_| ())
            } else {
                move_file(&from, &to)
            };

            match outcome {
                Ok(()) => {
                    entry.location = new_root.to_path_buf();
                    report.relocated.push(id.clone());
                }
                Err(e) => {
                    warn!(provider = %id, error = %e, "failed to relocate provider");
                    report.failed.push(RelocationFailure {
                        id: id.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        let old_manifest = old_root.join(MANIFEST_FILE_NAME);
        if !report.is_complete() {
            // Record where the moved providers now live so a later session
            // retries only the failures
            if old_manifest.exists() {
                if let Err(e) = state.manifest().save(&old_root) {
                    warn!(
                        path = %old_manifest.display(),
                        error = %e,
                        "failed to record partial relocation"
                    );
                }
            }
            return Err(TalkbookError::RelocationFailed { report });
        }

        state.root = new_root.to_path_buf();
        if old_manifest.exists() {
            state.manifest().save(new_root)?;
            if !copy_data {
                if let Err(e) = fs::remove_file(&old_manifest) {
                    warn!(
                        path = %old_manifest.display(),
                        error = %e,
                        "failed to remove old manifest"
                    );
                }
            }
        }

        info!(
            from = %old_root.display(),
            to = %new_root.display(),
            relocated = report.relocated.len(),
            copied = copy_data,
            "relocated data provider store"
        );
        Ok(report)
    }

    /// Persist the id→file registry to the storage root.
    pub fn save_manifest(&self) -> Result<()> {
        let state = self.state();
        state.manifest().save(&state.root)
    }

    /// Delete every provider that no audio object references and that has
    /// no open stream. Returns the deleted ids.
    pub fn sweep_unreferenced(&self) -> Result<Vec<ProviderId>> {
        let mut state = self.state();
        let unused: Vec<ProviderId> = state
            .providers
            .iter()
            .filter(|(_, e)| e.references == 0 && !e.has_open_streams())
            .map(|(id, _)| id.clone())
            .collect();

        for id in &unused {
            state.remove(id)?;
        }
        if !unused.is_empty() {
            info!(count = unused.len(), "swept unreferenced providers");
        }
        Ok(unused)
    }

    /// Delete files in the storage root that belong to no provider.
    /// The manifest is left alone. Returns the deleted paths.
    pub fn sweep_orphan_files(&self) -> Result<Vec<PathBuf>> {
        let state = self.state();
        let known: HashSet<&str> = state
            .providers
            .values()
            .map(|e| e.file_name.as_str())
            .collect();

        let mut removed = Vec::new();
        for entry in WalkDir::new(&state.root)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
        {
            let name = entry.file_name().to_string_lossy();
            if name == MANIFEST_FILE_NAME || known.contains(name.as_ref()) {
                continue;
            }

            let path = entry.path().to_path_buf();
            fs::remove_file(&path).map_err(|e| TalkbookError::FileWriteError {
                path: path.clone(),
                source: e,
            })?;
            removed.push(path);
        }

        if !removed.is_empty() {
            info!(count = removed.len(), "removed orphan files");
        }
        Ok(removed)
    }
}

impl fmt::Debug for DataProviderManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state();
        f.debug_struct("DataProviderManager")
            .field("root", &state.root)
            .field("providers", &state.providers.len())
            .finish()
    }
}

/// Rename, falling back to copy-then-delete across file systems.
fn move_file(from: &Path, to: &Path) -> io::Result<()> {
    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(_) => {
            fs::copy(from, to)?;
            fs::remove_file(from)
        }
    }
}
