use std::path::PathBuf;

use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use thiserror::Error;

pub mod json;
pub mod memory;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Store is unavailable: {0}")]
    Unavailable(String),

    #[error("Failed to load store from '{path}': {source}")]
    LoadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse JSON from '{path}': {source}")]
    ParseFailed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to save store to '{path}': {source}")]
    SaveFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize record: {source}")]
    SerializeFailed {
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to create backup at '{path}': {source}")]
    BackupFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Record '{key}' could not be decoded: {source}")]
    Decode {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Record '{key}' was modified concurrently")]
    Conflict { key: String },

    #[error(
        "Store file was created by a newer version of tdo-timer (version {0}). Please upgrade to open this file."
    )]
    FutureVersion(u32),
}

impl StorageError {
    /// Whether the caller may reasonably issue the same operation again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Conflict { .. })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    Set { key: String, value: Value },
    Delete { key: String },
    AddToSet { set: String, member: String },
    RemoveFromSet { set: String, member: String },
}

/// A group of writes applied all-or-nothing by a [`KeyValueStore`].
///
/// Expectations are checked before any write lands: each one names a key and
/// the value it must still hold (`None` meaning "absent"). A single mismatch
/// rejects the whole batch with [`StorageError::Conflict`].
#[derive(Debug, Clone, Default)]
pub struct Batch {
    expectations: Vec<(String, Option<Value>)>,
    ops: Vec<WriteOp>,
}

impl Batch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn expect(&mut self, key: &str, current: Option<Value>) -> &mut Self {
        self.expectations.push((key.to_string(), current));
        self
    }

    pub fn set(&mut self, key: &str, value: Value) -> &mut Self {
        self.ops.push(WriteOp::Set {
            key: key.to_string(),
            value,
        });
        self
    }

    /// Serialize `record` and queue it under `key`.
    pub fn put<T: Serialize>(&mut self, key: &str, record: &T) -> Result<&mut Self, StorageError> {
        let value = encode(record)?;
        Ok(self.set(key, value))
    }

    pub fn delete(&mut self, key: &str) -> &mut Self {
        self.ops.push(WriteOp::Delete {
            key: key.to_string(),
        });
        self
    }

    pub fn add_to_set(&mut self, set: &str, member: &str) -> &mut Self {
        self.ops.push(WriteOp::AddToSet {
            set: set.to_string(),
            member: member.to_string(),
        });
        self
    }

    pub fn remove_from_set(&mut self, set: &str, member: &str) -> &mut Self {
        self.ops.push(WriteOp::RemoveFromSet {
            set: set.to_string(),
            member: member.to_string(),
        });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.expectations.is_empty() && self.ops.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn into_parts(self) -> (Vec<(String, Option<Value>)>, Vec<WriteOp>) {
        (self.expectations, self.ops)
    }
}

/// Outbound contract of the core: opaque JSON records by key plus
/// membership sets used as indexes.
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Result<Option<Value>, StorageError>;
    fn list_set(&self, set: &str) -> Result<Vec<String>, StorageError>;
    fn apply(&self, batch: Batch) -> Result<(), StorageError>;

    fn set(&self, key: &str, value: Value) -> Result<(), StorageError> {
        let mut batch = Batch::new();
        batch.set(key, value);
        self.apply(batch)
    }

    fn delete(&self, key: &str) -> Result<(), StorageError> {
        let mut batch = Batch::new();
        batch.delete(key);
        self.apply(batch)
    }

    fn add_to_set(&self, set: &str, member: &str) -> Result<(), StorageError> {
        let mut batch = Batch::new();
        batch.add_to_set(set, member);
        self.apply(batch)
    }

    fn remove_from_set(&self, set: &str, member: &str) -> Result<(), StorageError> {
        let mut batch = Batch::new();
        batch.remove_from_set(set, member);
        self.apply(batch)
    }
}

pub fn encode<T: Serialize>(record: &T) -> Result<Value, StorageError> {
    serde_json::to_value(record).map_err(|e| StorageError::SerializeFailed { source: e })
}

pub fn decode<T: DeserializeOwned>(key: &str, value: Value) -> Result<T, StorageError> {
    serde_json::from_value(value).map_err(|e| StorageError::Decode {
        key: key.to_string(),
        source: e,
    })
}

/// Read and decode a record, keeping the raw value around so the caller can
/// use it as a compare-and-set expectation when writing back.
pub fn load_record<T, S>(kv: &S, key: &str) -> Result<Option<(T, Value)>, StorageError>
where
    T: DeserializeOwned,
    S: KeyValueStore + ?Sized,
{
    match kv.get(key)? {
        Some(raw) => {
            let record = decode(key, raw.clone())?;
            Ok(Some((record, raw)))
        }
        None => Ok(None),
    }
}
