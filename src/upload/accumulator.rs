// src/upload/accumulator.rs

use std::collections::BTreeSet;

use blake3::Hasher;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{debug, info};

use crate::errors::Result;
use crate::store::{UploadRecord, UploadStore};
use crate::types::ObjectPath;

/// A drained set of uploads that has been quiet for longer than the window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SettledBatch {
    /// Distinct paths, sorted.
    pub paths: Vec<ObjectPath>,
    /// Time of the newest record in the batch.
    pub latest: DateTime<Utc>,
    /// blake3 hex digest of the sorted path set.
    pub fingerprint: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrainOutcome {
    /// No records at all.
    Empty,
    /// Uploads are still arriving; nothing to do yet.
    Pending { latest: DateTime<Utc> },
    Settled(SettledBatch),
}

/// Stable fingerprint of a path set, independent of input order and
/// duplicates.
pub fn batch_fingerprint<'a>(paths: impl IntoIterator<Item = &'a ObjectPath>) -> String {
    let sorted: BTreeSet<&ObjectPath> = paths.into_iter().collect();
    let mut hasher = Hasher::new();
    for path in sorted {
        hasher.update(path.as_bytes());
        hasher.update(b"\n");
    }
    hasher.finalize().to_hex().to_string()
}

/// Durable, debounced collection of upload notifications.
#[derive(Debug, Clone, Copy)]
pub struct UploadAccumulator<'a> {
    store: &'a dyn UploadStore,
}

impl<'a> UploadAccumulator<'a> {
    pub fn new(store: &'a dyn UploadStore) -> Self {
        Self { store }
    }

    /// Append one record per path, all stamped `now`. No deduplication.
    pub fn record(&self, paths: &[ObjectPath], now: DateTime<Utc>) -> Result<Vec<UploadRecord>> {
        let records: Vec<UploadRecord> = paths.iter().map(|p| UploadRecord::new(p.clone(), now)).collect();
        if records.is_empty() {
            debug!("no upload paths to record");
            return Ok(records);
        }
        self.store.append(&records)?;
        info!(count = records.len(), paths = ?paths, "recorded uploads");
        Ok(records)
    }

    /// Return the settled path set once nothing was uploaded for longer
    /// than `window`. Never removes anything.
    pub fn drain(&self, window: Duration, now: DateTime<Utc>) -> Result<DrainOutcome> {
        let records = self.store.scan()?;
        let Some(latest) = records.iter().map(|r| r.upload_time).max() else {
            debug!("no upload records to drain");
            return Ok(DrainOutcome::Empty);
        };

        if now - latest <= window {
            info!(
                records = records.len(),
                latest = %latest,
                window_seconds = window.num_seconds(),
                "uploads not settled yet"
            );
            return Ok(DrainOutcome::Pending { latest });
        }

        let paths: Vec<ObjectPath> = records
            .into_iter()
            .map(|r| r.upload_path)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let fingerprint = batch_fingerprint(&paths);
        info!(paths = paths.len(), %fingerprint, "uploads settled");
        Ok(DrainOutcome::Settled(SettledBatch {
            paths,
            latest,
            fingerprint,
        }))
    }

    /// Remove the records consumed by `batch`. Records that arrived after
    /// the batch's newest record are kept, even for the same path.
    pub fn clear(&self, batch: &SettledBatch) -> Result<usize> {
        let removed = self.store.remove(&batch.paths, batch.latest)?;
        info!(removed, fingerprint = %batch.fingerprint, "cleared drained uploads");
        Ok(removed)
    }
}
