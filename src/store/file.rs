// src/store/file.rs

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::errors::{Result, TriggerError};
use crate::fs::FileSystem;
use crate::store::{is_consumed, RunStateRecord, RunStateStore, UploadRecord, UploadStore};
use crate::types::ObjectPath;

/// Directory (below the store root) holding one JSON file per run scope.
pub const RUN_STATE_DIR: &str = "run-state";

/// Directory (below the store root) holding one JSON file per append batch.
pub const UPLOADS_DIR: &str = "uploads";

/// Stores records as JSON files below a root directory.
///
/// ```text
/// <root>/run-state/<scope_key>.json
/// <root>/uploads/<timestamp>-<uuid>.json
/// ```
///
/// Every upload append creates its own file, so concurrent notification
/// deliveries never rewrite each other's records.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
    fs: Arc<dyn FileSystem>,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>, fs: Arc<dyn FileSystem>) -> Self {
        Self {
            root: root.into(),
            fs,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn run_state_path(&self, scope_key: &str) -> PathBuf {
        self.root
            .join(RUN_STATE_DIR)
            .join(format!("{}.json", file_safe(scope_key)))
    }

    fn uploads_dir(&self) -> PathBuf {
        self.root.join(UPLOADS_DIR)
    }

    /// Write via a temporary sibling and rename, so readers never observe a
    /// half-written file.
    fn write_replace(&self, path: &Path, contents: &[u8]) -> anyhow::Result<()> {
        let tmp = path.with_extension(format!("tmp-{}", Uuid::new_v4().simple()));
        self.fs.write(&tmp, contents)?;
        self.fs.rename(&tmp, path)
    }

    fn read_upload_file(&self, path: &Path) -> anyhow::Result<Vec<UploadRecord>> {
        let contents = self.fs.read_to_string(path)?;
        serde_json::from_str(&contents).with_context(|| format!("parsing upload file {:?}", path))
    }

    fn upload_files(&self) -> anyhow::Result<Vec<PathBuf>> {
        let mut files: Vec<PathBuf> = self
            .fs
            .read_dir(&self.uploads_dir())?
            .into_iter()
            .filter(|p| p.extension().is_some_and(|ext| ext == "json") && self.fs.is_file(p))
            .collect();
        files.sort();
        Ok(files)
    }
}

/// Map a scope key onto a single file name component, one-to-one.
///
/// ASCII letters, digits, `-` and `_` are kept; every other byte is written
/// as `%XX`, so distinct keys never share a file.
fn file_safe(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for byte in key.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'_') {
            out.push(char::from(byte));
        } else {
            out.push_str(&format!("%{byte:02X}"));
        }
    }
    out
}

impl RunStateStore for FileStore {
    fn get(&self, scope_key: &str) -> Result<RunStateRecord> {
        let path = self.run_state_path(scope_key);
        if !self.fs.exists(&path) {
            debug!(scope_key = %scope_key, "no stored run state; starting empty");
            return Ok(RunStateRecord::empty(scope_key));
        }

        let contents = self.fs.read_to_string(&path).map_err(TriggerError::storage)?;
        let record: RunStateRecord = serde_json::from_str(&contents).map_err(|e| {
            TriggerError::StorageError(format!("corrupt run state at {:?}: {e}", path))
        })?;
        if record.scope_key != scope_key {
            return Err(TriggerError::StorageError(format!(
                "run state at {:?} belongs to scope '{}', not '{scope_key}'",
                path, record.scope_key
            )));
        }
        Ok(record)
    }

    fn put(&self, record: &RunStateRecord) -> Result<()> {
        let path = self.run_state_path(&record.scope_key);

        if self.fs.exists(&path) {
            if let Ok(stored) = self.get(&record.scope_key) {
                if stored.version + 1 != record.version {
                    warn!(
                        scope_key = %record.scope_key,
                        stored_version = stored.version,
                        new_version = record.version,
                        "overwriting run state written by an overlapping round"
                    );
                }
            }
        }

        let json = serde_json::to_vec_pretty(record)?;
        self.write_replace(&path, &json)
            .with_context(|| format!("writing run state for {:?}", record.scope_key))
            .map_err(TriggerError::storage)?;
        info!(scope_key = %record.scope_key, version = record.version, "stored run state (file)");
        Ok(())
    }
}

impl UploadStore for FileStore {
    fn append(&self, records: &[UploadRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        let name = format!(
            "{}-{}.json",
            Utc::now().format("%Y%m%dT%H%M%S%.6fZ"),
            Uuid::new_v4().simple()
        );
        let path = self.uploads_dir().join(name);
        let json = serde_json::to_vec(records)?;
        self.write_replace(&path, &json)
            .context("appending upload records")
            .map_err(TriggerError::storage)?;
        debug!(path = ?path, count = records.len(), "appended upload records (file)");
        Ok(())
    }

    fn scan(&self) -> Result<Vec<UploadRecord>> {
        let mut records = Vec::new();
        for path in self.upload_files().map_err(TriggerError::storage)? {
            records.extend(self.read_upload_file(&path).map_err(TriggerError::storage)?);
        }
        Ok(records)
    }

    fn remove(&self, paths: &[ObjectPath], up_to: DateTime<Utc>) -> Result<usize> {
        let mut removed = 0;
        for file in self.upload_files().map_err(TriggerError::storage)? {
            let records = self.read_upload_file(&file).map_err(TriggerError::storage)?;
            let initial_len = records.len();
            let remaining: Vec<UploadRecord> = records
                .into_iter()
                .filter(|r| !is_consumed(r, paths, up_to))
                .collect();
            if remaining.len() == initial_len {
                continue;
            }
            removed += initial_len - remaining.len();

            let result = if remaining.is_empty() {
                self.fs.remove_file(&file)
            } else {
                serde_json::to_vec(&remaining)
                    .map_err(anyhow::Error::from)
                    .and_then(|json| self.write_replace(&file, &json))
            };
            result
                .with_context(|| format!("removing drained records from {:?}", file))
                .map_err(TriggerError::storage)?;
        }
        if removed > 0 {
            info!(removed, "removed drained upload records (file)");
        }
        Ok(removed)
    }
}
