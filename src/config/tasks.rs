// src/config/tasks.rs

//! Per-task configuration lookup.
//!
//! A task without a loadable config is simply absent: the caller logs it and
//! leaves it out of the round.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, warn};

use crate::config::model::TaskConfig;
use crate::fs::FileSystem;
use crate::types::TaskName;

/// Resolve static configuration for a task by name.
pub trait TaskConfigLoader: Send + Sync + fmt::Debug {
    fn load(&self, task: &str) -> Option<TaskConfig>;
}

/// Tasks declared inline as `[task.<name>]`.
#[derive(Debug, Clone, Default)]
pub struct InlineTaskConfigs {
    tasks: BTreeMap<TaskName, TaskConfig>,
}

impl InlineTaskConfigs {
    pub fn new(tasks: BTreeMap<TaskName, TaskConfig>) -> Self {
        Self { tasks }
    }
}

impl TaskConfigLoader for InlineTaskConfigs {
    fn load(&self, task: &str) -> Option<TaskConfig> {
        self.tasks.get(task).cloned()
    }
}

/// Tasks stored as `<dir>/<task>.json`, one file per task.
#[derive(Debug, Clone)]
pub struct DirTaskConfigs {
    dir: PathBuf,
    fs: Arc<dyn FileSystem>,
}

impl DirTaskConfigs {
    pub fn new(dir: impl Into<PathBuf>, fs: Arc<dyn FileSystem>) -> Self {
        Self {
            dir: dir.into(),
            fs,
        }
    }

    pub fn path_for(&self, task: &str) -> PathBuf {
        self.dir.join(format!("{task}.json"))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl TaskConfigLoader for DirTaskConfigs {
    fn load(&self, task: &str) -> Option<TaskConfig> {
        let path = self.path_for(task);
        info!(task = %task, path = ?path, "loading task config file");

        let contents = match self.fs.read_to_string(&path) {
            Ok(c) => c,
            Err(err) => {
                warn!(task = %task, path = ?path, error = %err, "unable to load task config file");
                return None;
            }
        };

        match serde_json::from_str::<TaskConfig>(&contents) {
            Ok(cfg) => Some(cfg),
            Err(err) => {
                warn!(task = %task, path = ?path, error = %err, "unable to parse task config file");
                None
            }
        }
    }
}

/// Consult several loaders in order; first hit wins.
#[derive(Debug, Default)]
pub struct LayeredTaskConfigs {
    layers: Vec<Box<dyn TaskConfigLoader>>,
}

impl LayeredTaskConfigs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_layer(mut self, layer: impl TaskConfigLoader + 'static) -> Self {
        self.layers.push(Box::new(layer));
        self
    }
}

impl TaskConfigLoader for LayeredTaskConfigs {
    fn load(&self, task: &str) -> Option<TaskConfig> {
        self.layers.iter().find_map(|layer| layer.load(task))
    }
}
