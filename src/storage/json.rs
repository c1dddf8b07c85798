use std::{
    fs::{self, File, OpenOptions, rename, write},
    path::{Path, PathBuf},
    thread,
    time::{Duration, Instant},
};

use fs2::FileExt;
use log::{debug, warn};
use serde_json::{Value, to_string_pretty};
use uuid::Uuid;

use crate::{
    config::Config,
    models::store::{CURRENT_VERSION, Store},
    storage::{Batch, KeyValueStore, StorageError},
};

const LOCK_RETRY_INTERVAL: Duration = Duration::from_millis(10);

/// Whole keyspace in one JSON document. Writers take an exclusive lock on a
/// sibling `.lock` file, replace the document through a temp file and keep
/// the last few versions under `backups/`.
pub struct JsonFileStore {
    path: PathBuf,
    lock_timeout: Duration,
    keep_backups: usize,
}

impl JsonFileStore {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            lock_timeout: Duration::from_secs(5),
            keep_backups: 5,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self {
            path: config.store_path.clone(),
            lock_timeout: config.lock_timeout,
            keep_backups: config.backups,
        }
    }

    pub fn with_lock_timeout(mut self, lock_timeout: Duration) -> Self {
        self.lock_timeout = lock_timeout;
        self
    }

    pub fn with_backups(mut self, keep_backups: usize) -> Self {
        self.keep_backups = keep_backups;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<Store, StorageError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Store::default()),
            Err(e) => {
                return Err(StorageError::LoadFailed {
                    path: self.path.clone(),
                    source: e,
                });
            }
        };

        let data: Value = serde_json::from_str(&content).map_err(|e| self.parse_failed(e))?;

        let version = data
            .get("version")
            .and_then(Value::as_u64)
            .map_or(CURRENT_VERSION, |v| v as u32);
        if version > CURRENT_VERSION {
            return Err(StorageError::FutureVersion(version));
        }

        serde_json::from_value(data).map_err(|e| self.parse_failed(e))
    }

    fn save(&self, store: &Store) -> Result<(), StorageError> {
        let json =
            to_string_pretty(store).map_err(|e| StorageError::SerializeFailed { source: e })?;

        let temp_path = PathBuf::from(format!("{}.tmp.{}", self.path.display(), Uuid::new_v4()));
        write(&temp_path, json).map_err(|e| StorageError::SaveFailed {
            path: temp_path.clone(),
            source: e,
        })?;

        self.create_backup()?;
        self.cleanup_old_backups();

        rename(&temp_path, &self.path).map_err(|e| StorageError::SaveFailed {
            path: self.path.clone(),
            source: e,
        })
    }

    fn lock(&self) -> Result<File, StorageError> {
        let lock_file_path = self.path.with_extension("lock");
        let lock_file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_file_path)
            .map_err(|e| StorageError::SaveFailed {
                path: lock_file_path.clone(),
                source: e,
            })?;

        let deadline = Instant::now() + self.lock_timeout;
        loop {
            match lock_file.try_lock_exclusive() {
                Ok(()) => return Ok(lock_file),
                Err(e) if e.raw_os_error() == fs2::lock_contended_error().raw_os_error() => {
                    if Instant::now() >= deadline {
                        return Err(StorageError::Unavailable(format!(
                            "'{}' is locked by another writer (waited {:?})",
                            lock_file_path.display(),
                            self.lock_timeout
                        )));
                    }
                    thread::sleep(LOCK_RETRY_INTERVAL);
                }
                Err(e) => {
                    return Err(StorageError::SaveFailed {
                        path: lock_file_path,
                        source: e,
                    });
                }
            }
        }
    }

    fn create_backup(&self) -> Result<(), StorageError> {
        if self.keep_backups == 0 || !self.path.exists() {
            return Ok(());
        }

        let backups_dir = self.backup_dir();
        fs::create_dir_all(&backups_dir).map_err(|e| StorageError::BackupFailed {
            path: backups_dir.clone(),
            source: e,
        })?;

        let backup_path = self.backup_path();
        fs::copy(&self.path, &backup_path).map_err(|e| StorageError::BackupFailed {
            path: backup_path,
            source: e,
        })?;
        Ok(())
    }

    // Failing to prune old backups never blocks a save. With backups disabled
    // the ones already on disk are left alone.
    fn cleanup_old_backups(&self) {
        if self.keep_backups == 0 {
            return;
        }

        let backup_dir = self.backup_dir();
        let entries = match fs::read_dir(&backup_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return,
            Err(e) => {
                warn!("cannot list backups in {}: {e}", backup_dir.display());
                return;
            }
        };

        let mut file_entries = entries
            .flatten()
            .filter(|entry| entry.metadata().map(|m| m.is_file()).unwrap_or(false))
            .map(|entry| entry.path())
            .collect::<Vec<_>>();
        file_entries.sort();

        let excess = file_entries.len().saturating_sub(self.keep_backups);
        for file_path in &file_entries[..excess] {
            if let Err(e) = fs::remove_file(file_path) {
                warn!("cannot remove old backup {}: {e}", file_path.display());
            }
        }
    }

    fn backup_dir(&self) -> PathBuf {
        let parent_store_path = self.path.parent().unwrap_or(Path::new("."));
        parent_store_path.join("backups")
    }

    fn backup_path(&self) -> PathBuf {
        let file_name = self
            .path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "store.json".to_string());
        let stamp = jiff::Timestamp::now().as_microsecond();
        self.backup_dir().join(format!("{file_name}.{stamp}"))
    }

    fn parse_failed(&self, source: serde_json::Error) -> StorageError {
        StorageError::ParseFailed {
            path: self.path.clone(),
            source,
        }
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        Ok(self.load()?.records.remove(key))
    }

    fn list_set(&self, set: &str) -> Result<Vec<String>, StorageError> {
        Ok(self.load()?.members(set))
    }

    fn apply(&self, batch: Batch) -> Result<(), StorageError> {
        if batch.is_empty() {
            return Ok(());
        }

        let lock_file = self.lock()?;
        let writes = batch.len();

        let mut store = self.load()?;
        store.apply(batch)?;
        self.save(&store)?;

        lock_file.unlock().map_err(|e| StorageError::SaveFailed {
            path: self.path.clone(),
            source: e,
        })?;

        debug!("applied {writes} writes to {}", self.path.display());
        Ok(())
    }
}
