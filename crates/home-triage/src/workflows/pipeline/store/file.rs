use super::{
    EnrichmentCollection, EnrichmentStore, LockOutcome, RepositoryError, WorkItemCollection,
    WorkItemStore,
};
use crate::config::StoreConfig;
use crate::workflows::evaluation::domain::{AddressKey, EnrichmentRecord};
use crate::workflows::pipeline::phase::WorkItem;
use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

static BACKUP_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Whether a write copies the current file into the backup directory first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backup {
    Take,
    /// Lock bookkeeping only; not worth a restore point.
    Skip,
}

/// What a read-modify-write closure decided.
#[derive(Debug)]
pub enum Change<R> {
    Write(R),
    Keep(R),
}

/// A JSON document persisted with snapshot-then-atomic-rename semantics.
///
/// Writers serialize on an exclusive `fs2` lock over a sidecar `.lock` file, so
/// separate processes sharing a data directory never interleave a
/// read-modify-write. Each write goes to its own temp file, is fsynced, and is
/// renamed over the target; a failure at any step leaves the previous file
/// untouched. Readers take no lock since the target is only replaced by rename.
#[derive(Debug)]
pub struct JsonFile<T> {
    path: PathBuf,
    backup_dir: PathBuf,
    max_backups: usize,
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonFile<T>
where
    T: Serialize + DeserializeOwned + Default,
{
    pub fn new(
        path: impl Into<PathBuf>,
        backup_dir: impl Into<PathBuf>,
        max_backups: usize,
    ) -> Self {
        Self {
            path: path.into(),
            backup_dir: backup_dir.into(),
            max_backups,
            _marker: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A missing file loads as the empty document.
    pub fn load(&self) -> Result<T, RepositoryError> {
        match fs::read(&self.path) {
            Ok(bytes) => self.parse(&self.path, &bytes),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(T::default()),
            Err(source) => Err(io_error(&self.path, source)),
        }
    }

    /// Load, change, and save under the writer lock.
    pub fn update<R, F>(&self, backup: Backup, change: F) -> Result<R, RepositoryError>
    where
        F: FnOnce(&mut T) -> Result<Change<R>, RepositoryError>,
    {
        let _lock = self.lock_exclusive()?;
        let mut value = self.load()?;
        match change(&mut value)? {
            Change::Write(result) => {
                self.commit(&value, backup)?;
                Ok(result)
            }
            Change::Keep(result) => Ok(result),
        }
    }

    /// Backups for this document, oldest first.
    pub fn backups(&self) -> Result<Vec<PathBuf>, RepositoryError> {
        let entries = match fs::read_dir(&self.backup_dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => return Err(io_error(&self.backup_dir, source)),
        };

        let prefix = format!("{}-", self.stem());
        let mut backups = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| io_error(&self.backup_dir, source))?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.starts_with(&prefix) && name.ends_with(".json") {
                backups.push(entry.path());
            }
        }
        backups.sort();
        Ok(backups)
    }

    /// Roll back to `backup`, or the newest backup when `None`. The current file
    /// is snapshotted first so the rollback itself can be undone.
    pub fn restore(&self, backup: Option<&Path>) -> Result<PathBuf, RepositoryError> {
        let _lock = self.lock_exclusive()?;
        let chosen = match backup {
            Some(path) => path.to_path_buf(),
            None => self
                .backups()?
                .pop()
                .ok_or_else(|| RepositoryError::NoBackup(self.backup_dir.clone()))?,
        };

        let bytes = fs::read(&chosen).map_err(|source| io_error(&chosen, source))?;
        self.parse(&chosen, &bytes)?;
        self.snapshot()?;
        self.write_atomic(&bytes)?;

        info!(path = %self.path.display(), backup = %chosen.display(), "restored from backup");
        Ok(chosen)
    }

    fn commit(&self, value: &T, backup: Backup) -> Result<(), RepositoryError> {
        let bytes = serde_json::to_vec_pretty(value).map_err(|source| RepositoryError::Corrupt {
            path: self.path.clone(),
            source,
        })?;
        if backup == Backup::Take {
            self.snapshot()?;
        }
        self.write_atomic(&bytes)
    }

    fn parse(&self, path: &Path, bytes: &[u8]) -> Result<T, RepositoryError> {
        serde_json::from_slice(bytes).map_err(|source| RepositoryError::Corrupt {
            path: path.to_path_buf(),
            source,
        })
    }

    fn stem(&self) -> String {
        self.path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| "store".to_string())
    }

    fn sibling(&self, suffix: &str) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_else(|| OsString::from("store"));
        name.push(suffix);
        self.path.with_file_name(name)
    }

    fn ensure_parent(&self) -> Result<(), RepositoryError> {
        if let Some(parent) = self.path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| io_error(parent, source))?;
        }
        Ok(())
    }

    /// Held until the returned handle is dropped.
    fn lock_exclusive(&self) -> Result<File, RepositoryError> {
        self.ensure_parent()?;
        let lock_path = self.sibling(".lock");
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)
            .map_err(|source| io_error(&lock_path, source))?;
        file.lock_exclusive()
            .map_err(|source| io_error(&lock_path, source))?;
        Ok(file)
    }

    fn snapshot(&self) -> Result<(), RepositoryError> {
        if !self.path.exists() {
            return Ok(());
        }

        fs::create_dir_all(&self.backup_dir)
            .map_err(|source| io_error(&self.backup_dir, source))?;
        let sequence = BACKUP_SEQUENCE.fetch_add(1, Ordering::Relaxed);
        let name = format!(
            "{}-{}-{:06}.json",
            self.stem(),
            Utc::now().format("%Y%m%dT%H%M%S%.6f"),
            sequence % 1_000_000
        );
        let target = self.backup_dir.join(name);
        fs::copy(&self.path, &target).map_err(|source| io_error(&target, source))?;
        debug!(backup = %target.display(), "snapshotted store file");

        self.prune()
    }

    fn prune(&self) -> Result<(), RepositoryError> {
        let backups = self.backups()?;
        let excess = backups.len().saturating_sub(self.max_backups);
        for stale in backups.into_iter().take(excess) {
            if let Err(err) = fs::remove_file(&stale) {
                warn!(backup = %stale.display(), error = %err, "failed to prune backup");
            }
        }
        Ok(())
    }

    fn write_atomic(&self, bytes: &[u8]) -> Result<(), RepositoryError> {
        self.ensure_parent()?;

        let temp = self.sibling(&format!(".{}.tmp", Uuid::new_v4().simple()));
        let result = File::create(&temp)
            .and_then(|mut file| {
                file.write_all(bytes)?;
                file.sync_all()
            })
            .and_then(|()| fs::rename(&temp, &self.path));

        if let Err(source) = result {
            if temp.is_file() {
                let _ = fs::remove_file(&temp);
            }
            return Err(io_error(&temp, source));
        }
        Ok(())
    }
}

fn io_error(path: &Path, source: std::io::Error) -> RepositoryError {
    RepositoryError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Work items in `work_items.json` under the configured data directory.
#[derive(Debug)]
pub struct FileWorkItemStore {
    file: JsonFile<WorkItemCollection>,
    stale_lock: Duration,
}

impl FileWorkItemStore {
    pub fn new(config: &StoreConfig) -> Self {
        Self {
            file: JsonFile::new(
                config.work_items_path(),
                config.backup_dir(),
                config.max_backups,
            ),
            stale_lock: config.stale_lock,
        }
    }

    pub fn restore_from_backup(&self, backup: Option<&Path>) -> Result<PathBuf, RepositoryError> {
        self.file.restore(backup)
    }

    pub fn backups(&self) -> Result<Vec<PathBuf>, RepositoryError> {
        self.file.backups()
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }
}

impl WorkItemStore for FileWorkItemStore {
    fn load_all(&self) -> Result<WorkItemCollection, RepositoryError> {
        self.file.load()
    }

    fn fetch(&self, key: &AddressKey) -> Result<Option<WorkItem>, RepositoryError> {
        Ok(self.load_all()?.get(key).cloned())
    }

    fn save(&self, item: &WorkItem) -> Result<(), RepositoryError> {
        self.file.update(Backup::Take, |collection| {
            collection.upsert(item, Utc::now(), self.stale_lock)?;
            Ok(Change::Write(()))
        })
    }

    fn acquire_lock(
        &self,
        key: &AddressKey,
        holder: &str,
        now: DateTime<Utc>,
    ) -> Result<LockOutcome, RepositoryError> {
        self.file.update(Backup::Skip, |collection| {
            let outcome = collection.acquire_lock(key, holder, now, self.stale_lock)?;
            Ok(if outcome.is_acquired() {
                Change::Write(outcome)
            } else {
                Change::Keep(outcome)
            })
        })
    }

    fn release_lock(&self, key: &AddressKey, holder: &str) -> Result<(), RepositoryError> {
        self.file.update(Backup::Skip, |collection| {
            Ok(if collection.release_lock(key, holder, Utc::now()) {
                Change::Write(())
            } else {
                Change::Keep(())
            })
        })
    }
}

/// Enrichment records in `enrichment_data.json` under the configured data directory.
#[derive(Debug)]
pub struct FileEnrichmentStore {
    file: JsonFile<EnrichmentCollection>,
}

impl FileEnrichmentStore {
    pub fn new(config: &StoreConfig) -> Self {
        Self {
            file: JsonFile::new(
                config.enrichment_path(),
                config.backup_dir(),
                config.max_backups,
            ),
        }
    }

    pub fn restore_from_backup(&self, backup: Option<&Path>) -> Result<PathBuf, RepositoryError> {
        self.file.restore(backup)
    }

    pub fn backups(&self) -> Result<Vec<PathBuf>, RepositoryError> {
        self.file.backups()
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }
}

impl EnrichmentStore for FileEnrichmentStore {
    fn load_all(&self) -> Result<Vec<EnrichmentRecord>, RepositoryError> {
        Ok(self.file.load()?.records)
    }

    fn fetch(&self, key: &AddressKey) -> Result<Option<EnrichmentRecord>, RepositoryError> {
        Ok(self.file.load()?.get(key).cloned())
    }

    fn save(&self, record: &EnrichmentRecord) -> Result<(), RepositoryError> {
        self.file.update(Backup::Take, |collection| {
            collection.upsert(record);
            Ok(Change::Write(()))
        })
    }
}
