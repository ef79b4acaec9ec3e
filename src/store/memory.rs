// src/store/memory.rs

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::errors::{Result, TriggerError};
use crate::store::{is_consumed, RunStateRecord, RunStateStore, UploadRecord, UploadStore};
use crate::types::ObjectPath;

#[derive(Debug, Default)]
struct Inner {
    records: HashMap<String, RunStateRecord>,
    uploads: Vec<UploadRecord>,
}

/// Stores everything in memory only.
///
/// Cloning shares the underlying state, so a test can keep a handle and
/// inspect what the engine wrote.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| TriggerError::StorageError("memory store mutex poisoned".to_string()))
    }
}

impl RunStateStore for MemoryStore {
    fn get(&self, scope_key: &str) -> Result<RunStateRecord> {
        let inner = self.lock()?;
        Ok(inner
            .records
            .get(scope_key)
            .cloned()
            .unwrap_or_else(|| RunStateRecord::empty(scope_key)))
    }

    fn put(&self, record: &RunStateRecord) -> Result<()> {
        let mut inner = self.lock()?;
        let stored_version = inner
            .records
            .get(&record.scope_key)
            .map(|r| r.version)
            .unwrap_or(0);
        if stored_version + 1 != record.version {
            warn!(
                scope_key = %record.scope_key,
                stored_version,
                new_version = record.version,
                "overwriting run state written by an overlapping round"
            );
        }
        inner.records.insert(record.scope_key.clone(), record.clone());
        debug!(scope_key = %record.scope_key, version = record.version, "stored run state (memory)");
        Ok(())
    }
}

impl UploadStore for MemoryStore {
    fn append(&self, records: &[UploadRecord]) -> Result<()> {
        let mut inner = self.lock()?;
        inner.uploads.extend_from_slice(records);
        Ok(())
    }

    fn scan(&self) -> Result<Vec<UploadRecord>> {
        Ok(self.lock()?.uploads.clone())
    }

    fn remove(&self, paths: &[ObjectPath], up_to: DateTime<Utc>) -> Result<usize> {
        let mut inner = self.lock()?;
        let initial_len = inner.uploads.len();
        inner.uploads.retain(|r| !is_consumed(r, paths, up_to));
        let removed = initial_len - inner.uploads.len();
        if removed > 0 {
            info!(removed, "removed drained upload records (memory)");
        }
        Ok(removed)
    }
}
