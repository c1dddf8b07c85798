use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::storage::{Batch, StorageError, WriteOp};

/// Current schema version
pub const CURRENT_VERSION: u32 = 1;

fn current_version() -> u32 {
    CURRENT_VERSION
}

/// The whole keyspace of a store: records by key and the index sets.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Store {
    #[serde(default = "current_version")]
    pub version: u32,
    #[serde(default)]
    pub records: BTreeMap<String, Value>,
    #[serde(default)]
    pub sets: BTreeMap<String, BTreeSet<String>>,
}

impl Default for Store {
    fn default() -> Self {
        Self {
            version: CURRENT_VERSION,
            records: BTreeMap::new(),
            sets: BTreeMap::new(),
        }
    }
}

impl Store {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.records.get(key)
    }

    pub fn members(&self, set: &str) -> Vec<String> {
        self.sets
            .get(set)
            .map(|members| members.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Check every expectation, then apply every write. Nothing changes when
    /// an expectation fails.
    pub fn apply(&mut self, batch: Batch) -> Result<(), StorageError> {
        let (expectations, ops) = batch.into_parts();

        for (key, expected) in &expectations {
            if self.records.get(key) != expected.as_ref() {
                return Err(StorageError::Conflict { key: key.clone() });
            }
        }

        for op in ops {
            match op {
                WriteOp::Set { key, value } => {
                    self.records.insert(key, value);
                }
                WriteOp::Delete { key } => {
                    self.records.remove(&key);
                }
                WriteOp::AddToSet { set, member } => {
                    self.sets.entry(set).or_default().insert(member);
                }
                WriteOp::RemoveFromSet { set, member } => {
                    if let Some(members) = self.sets.get_mut(&set) {
                        members.remove(&member);
                        if members.is_empty() {
                            self.sets.remove(&set);
                        }
                    }
                }
            }
        }

        Ok(())
    }
}
