// src/store/mod.rs

//! Durable state: per-scope trigger state and accumulated upload records.
//!
//! Both live behind small traits so the engine never cares whether it talks
//! to files on disk or to process memory. Reads are expected to be strongly
//! consistent; writes of a [`RunStateRecord`] replace the whole record.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::Result;
use crate::types::{ObjectPath, TaskName, TriggerState};

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

/// All trigger state of one run scope.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunStateRecord {
    pub scope_key: String,

    /// Incremented by every committed round. Used only to detect (and log)
    /// overlapping rounds; the store never rejects a write because of it.
    #[serde(default)]
    pub version: u64,

    #[serde(default)]
    pub tasks: BTreeMap<TaskName, TriggerState>,
}

impl RunStateRecord {
    pub fn empty(scope_key: impl Into<String>) -> Self {
        Self {
            scope_key: scope_key.into(),
            version: 0,
            tasks: BTreeMap::new(),
        }
    }
}

/// A single upload notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadRecord {
    pub upload_path: ObjectPath,
    pub upload_time: DateTime<Utc>,
}

impl UploadRecord {
    pub fn new(upload_path: impl Into<ObjectPath>, upload_time: DateTime<Utc>) -> Self {
        Self {
            upload_path: upload_path.into(),
            upload_time,
        }
    }
}

/// Key-value access to [`RunStateRecord`]s.
pub trait RunStateStore: Send + Sync + fmt::Debug {
    /// Strongly-consistent read. A missing record is returned empty.
    fn get(&self, scope_key: &str) -> Result<RunStateRecord>;

    /// Overwrite the whole record.
    fn put(&self, record: &RunStateRecord) -> Result<()>;
}

/// Append-only log of upload records with explicit removal.
pub trait UploadStore: Send + Sync + fmt::Debug {
    /// Append records. Must not read existing records first, so that
    /// concurrent writers never interfere.
    fn append(&self, records: &[UploadRecord]) -> Result<()>;

    /// Every record currently stored.
    fn scan(&self) -> Result<Vec<UploadRecord>>;

    /// Remove records whose path is in `paths` and whose time is not later
    /// than `up_to`. Returns the number of records removed.
    fn remove(&self, paths: &[ObjectPath], up_to: DateTime<Utc>) -> Result<usize>;
}

/// Whether `record` is covered by a removal of `paths` up to `up_to`.
pub(crate) fn is_consumed(record: &UploadRecord, paths: &[ObjectPath], up_to: DateTime<Utc>) -> bool {
    record.upload_time <= up_to && paths.iter().any(|p| *p == record.upload_path)
}
