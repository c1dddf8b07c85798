use log::debug;
use serde_json::Value;
use thiserror::Error;

use crate::{
    storage::{KeyValueStore, StorageError, decode},
    validation::{FieldErrors, validate_work_time},
};

pub const WORK_TIME_GOAL_KEY: &str = "work_time_goal";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Invalid setting: {0}")]
    Validation(FieldErrors),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Workspace-wide single-value settings.
pub struct SettingsStore<'a, S: ?Sized> {
    kv: &'a S,
}

impl<'a, S: KeyValueStore + ?Sized> SettingsStore<'a, S> {
    pub fn new(kv: &'a S) -> Self {
        Self { kv }
    }

    /// Daily work-time goal in minutes, 0 when never set.
    pub fn work_time_goal(&self) -> Result<f64, SettingsError> {
        match self.kv.get(WORK_TIME_GOAL_KEY)? {
            Some(value) => Ok(decode(WORK_TIME_GOAL_KEY, value)?),
            None => Ok(0.0),
        }
    }

    pub fn set_work_time_goal(&self, minutes: f64) -> Result<f64, SettingsError> {
        validate_work_time(minutes).map_err(SettingsError::Validation)?;
        self.kv.set(WORK_TIME_GOAL_KEY, Value::from(minutes))?;

        debug!("work time goal set to {minutes} minutes");
        Ok(minutes)
    }
}
