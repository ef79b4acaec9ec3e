// src/engine/context.rs

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::config::model::ConfigFile;
use crate::config::tasks::{DirTaskConfigs, InlineTaskConfigs, LayeredTaskConfigs, TaskConfigLoader};
use crate::dispatch::{CommandEngine, Dispatcher, LogEngine, WorkflowEngine};
use crate::engine::clock::{Clock, SystemClock};
use crate::errors::{Result, TriggerError};
use crate::fs::{FileSystem, RealFileSystem};
use crate::policy::PolicyRegistry;
use crate::store::{FileStore, MemoryStore, RunStateStore, UploadStore};
use crate::types::{DispatchBackend, StoreBackend};
use crate::upload::TriggerMatcher;

/// Everything a request handler needs, passed explicitly.
#[derive(Clone)]
pub struct EngineContext {
    pub config: Arc<ConfigFile>,
    pub run_state: Arc<dyn RunStateStore>,
    pub uploads: Arc<dyn UploadStore>,
    pub tasks: Arc<dyn TaskConfigLoader>,
    pub policies: Arc<PolicyRegistry>,
    pub matcher: Arc<TriggerMatcher>,
    pub dispatcher: Dispatcher,
    pub clock: Arc<dyn Clock>,
    /// Log instead of dispatching, never advance trigger state and keep
    /// drained upload records.
    pub dry_run: bool,
}

impl std::fmt::Debug for EngineContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineContext")
            .field("run_scope_key", &self.config.engine().run_scope_key)
            .field("policies", &self.policies)
            .field("dispatcher", &self.dispatcher)
            .field("dry_run", &self.dry_run)
            .finish()
    }
}

impl EngineContext {
    /// Wire production collaborators from a validated config.
    pub fn from_config(config: ConfigFile, dry_run: bool) -> Result<Self> {
        let fs: Arc<dyn FileSystem> = Arc::new(RealFileSystem);

        let (run_state, uploads): (Arc<dyn RunStateStore>, Arc<dyn UploadStore>) = match config.store().backend {
            StoreBackend::File => {
                let store = Arc::new(FileStore::new(config.store().path.clone(), fs.clone()));
                info!(root = ?store.root(), "using file store");
                (store.clone(), store)
            }
            StoreBackend::Memory => {
                info!("using memory store");
                let store = Arc::new(MemoryStore::new());
                (store.clone(), store)
            }
        };

        let engine: Arc<dyn WorkflowEngine> = match (dry_run, config.dispatch().backend) {
            (true, _) | (false, DispatchBackend::Log) => Arc::new(LogEngine),
            (false, DispatchBackend::Command) => {
                let cmd = config.dispatch().command.clone().ok_or_else(|| {
                    TriggerError::ConfigError("[dispatch].command is required when backend = \"command\"".to_string())
                })?;
                Arc::new(CommandEngine::new(cmd))
            }
        };
        let dispatcher = Dispatcher::new(engine, Duration::from_secs(config.dispatch().timeout_seconds));

        let tasks = task_loader(&config, fs);

        Self::new(config, run_state, uploads, tasks, dispatcher, Arc::new(SystemClock), dry_run)
    }

    /// Assemble a context from explicit collaborators, with the built-in
    /// policies registered.
    pub fn new(
        config: ConfigFile,
        run_state: Arc<dyn RunStateStore>,
        uploads: Arc<dyn UploadStore>,
        tasks: Arc<dyn TaskConfigLoader>,
        dispatcher: Dispatcher,
        clock: Arc<dyn Clock>,
        dry_run: bool,
    ) -> Result<Self> {
        let matcher = TriggerMatcher::new(&config.upload().trigger)?;
        let policies = PolicyRegistry::with_builtins();
        debug!(policies = ?policies.names().collect::<Vec<_>>(), "registered policies");
        Ok(Self {
            config: Arc::new(config),
            run_state,
            uploads,
            tasks,
            policies: Arc::new(policies),
            matcher: Arc::new(matcher),
            dispatcher,
            clock,
            dry_run,
        })
    }

    /// Replace the policy registry, e.g. to add deployment-specific policies.
    pub fn with_policies(mut self, policies: PolicyRegistry) -> Self {
        self.policies = Arc::new(policies);
        self
    }
}

/// Inline `[task.<name>]` entries first, then `task_config_dir` if set.
pub fn task_loader(config: &ConfigFile, fs: Arc<dyn FileSystem>) -> Arc<dyn TaskConfigLoader> {
    let mut layered = LayeredTaskConfigs::new().with_layer(InlineTaskConfigs::new(config.tasks().clone()));
    if let Some(dir) = config.engine().task_config_dir.as_ref() {
        layered = layered.with_layer(DirTaskConfigs::new(dir.clone(), fs));
    }
    Arc::new(layered)
}
