use std::path::PathBuf;
use std::time::Duration;

pub const STORE_PATH_ENV: &str = "TDO_TIMER_STORE";
pub const LOCK_TIMEOUT_ENV: &str = "TDO_TIMER_LOCK_TIMEOUT_MS";

pub const DEFAULT_LOCK_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_BACKUPS: usize = 5;

/// Process-level settings for opening the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub store_path: PathBuf,
    pub lock_timeout: Duration,
    pub backups: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store_path: default_store_path(),
            lock_timeout: Duration::from_millis(DEFAULT_LOCK_TIMEOUT_MS),
            backups: DEFAULT_BACKUPS,
        }
    }
}

impl Config {
    pub fn new(store_path: Option<PathBuf>, lock_timeout_ms: u64, backups: usize) -> Self {
        Self {
            store_path: store_path.unwrap_or_else(default_store_path),
            lock_timeout: Duration::from_millis(lock_timeout_ms),
            backups,
        }
    }

    /// Create the directory holding the store file if it doesn't exist.
    pub fn ensure_data_dir(&self) -> std::io::Result<()> {
        match self.store_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => std::fs::create_dir_all(parent),
            _ => Ok(()),
        }
    }
}

/// `<local data dir>/tdo-timer/store.json`, or `./tdo-timer/store.json` when
/// the platform has no data dir.
pub fn default_store_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tdo-timer")
        .join("store.json")
}
