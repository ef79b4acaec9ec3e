pub mod builders;
pub mod fake_engine;

use std::sync::{Arc, Once};
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use tracing_subscriber::{fmt, EnvFilter};

use runtrigger::config::tasks::TaskConfigLoader;
use runtrigger::config::{ConfigFile, InlineTaskConfigs};
use runtrigger::dispatch::Dispatcher;
use runtrigger::engine::{EngineContext, FixedClock, TriggerEngine};
use runtrigger::fs::mock::MockFileSystem;
use runtrigger::store::{FileStore, MemoryStore, RunStateStore, UploadStore};

use crate::fake_engine::FakeEngine;

static INIT: Once = Once::new();

/// Initialise tracing for tests.
///
/// - Uses `with_test_writer()`, so logs are captured per-test.
/// - The Rust test harness only prints captured output for **failing** tests
///   (unless you run with `-- --nocapture`).
///
/// Enable levels with e.g.:
/// `RUST_LOG=debug cargo test`
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        fmt()
            .with_env_filter(filter)
            .with_test_writer() // print only for failing tests unless --nocapture
            .with_target(true)
            .init();
    });
}

/// Run a future with a 5-second timeout.
#[allow(dead_code)]
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: std::future::Future<Output = T>,
{
    tokio::time::timeout(std::time::Duration::from_secs(5), f)
        .await
        .expect("Test timed out after 5 seconds")
}

/// 2024-01-01T12:00:00Z
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
}

/// An engine over in-memory collaborators, with handles to inspect them.
pub struct Harness {
    pub engine: TriggerEngine,
    pub store: MemoryStore,
    pub workflows: FakeEngine,
    pub clock: FixedClock,
}

impl Harness {
    /// Inline task configs only, clock at [`t0`].
    pub fn new(config: ConfigFile) -> Self {
        let tasks: Arc<dyn TaskConfigLoader> = Arc::new(InlineTaskConfigs::new(config.tasks().clone()));
        Self::with_loader(config, tasks, false)
    }

    pub fn dry_run(config: ConfigFile) -> Self {
        let tasks: Arc<dyn TaskConfigLoader> = Arc::new(InlineTaskConfigs::new(config.tasks().clone()));
        Self::with_loader(config, tasks, true)
    }

    pub fn with_loader(config: ConfigFile, tasks: Arc<dyn TaskConfigLoader>, dry_run: bool) -> Self {
        let store = MemoryStore::new();
        let workflows = FakeEngine::new();
        let clock = FixedClock::new(t0());
        let engine = build_engine(
            config,
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            tasks,
            &workflows,
            &clock,
            dry_run,
        );
        Self {
            engine,
            store,
            workflows,
            clock,
        }
    }
}

/// Root of the [`FileHarness`] store on its mock filesystem.
pub const TEST_STORE_ROOT: &str = "/store";

/// Like [`Harness`], but backed by a [`FileStore`] on a [`MockFileSystem`],
/// so tests can corrupt files or make writes fail.
pub struct FileHarness {
    pub engine: TriggerEngine,
    pub fs: MockFileSystem,
    pub store: FileStore,
    pub workflows: FakeEngine,
}

impl FileHarness {
    pub fn new(config: ConfigFile) -> Self {
        let fs = MockFileSystem::new();
        let store = FileStore::new(TEST_STORE_ROOT, Arc::new(fs.clone()));
        let workflows = FakeEngine::new();
        let tasks: Arc<dyn TaskConfigLoader> = Arc::new(InlineTaskConfigs::new(config.tasks().clone()));
        let engine = build_engine(
            config,
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            tasks,
            &workflows,
            &FixedClock::new(t0()),
            false,
        );
        Self {
            engine,
            fs,
            store,
            workflows,
        }
    }
}

fn build_engine(
    config: ConfigFile,
    run_state: Arc<dyn RunStateStore>,
    uploads: Arc<dyn UploadStore>,
    tasks: Arc<dyn TaskConfigLoader>,
    workflows: &FakeEngine,
    clock: &FixedClock,
    dry_run: bool,
) -> TriggerEngine {
    let dispatcher = Dispatcher::new(Arc::new(workflows.clone()), Duration::from_secs(5));
    let ctx = EngineContext::new(
        config,
        run_state,
        uploads,
        tasks,
        dispatcher,
        Arc::new(clock.clone()),
        dry_run,
    )
    .expect("engine context");
    TriggerEngine::new(ctx)
}
