// src/config/model.rs

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Deserialize;
use serde_json::Value;

use crate::types::{DispatchBackend, StoreBackend, TaskName};

/// Raw configuration exactly as read from a TOML file.
///
/// ```toml
/// [engine]
/// scope = "br"
/// account_name = "dev"
/// run_scope_key = "cdp-dev-br"
/// shared_requirement = "s3://code/tools-1.0-py3-none-any.whl"
/// job_target = "custom-data-processing"
///
/// [upload]
/// window_seconds = 300
///
/// [[upload.trigger]]
/// file_selector = "s3://input/sales/*"
/// [upload.trigger.workflow]
/// target = "arn:aws:states:::stateMachine:ingest"
/// parameters = { "paths.$" = "$.matching_path_list" }
///
/// [task.version_info.run]
/// default = true
/// frequency = { policy = "interval", every_seconds = 3600 }
/// ```
///
/// Use [`ConfigFile::try_from`] (via `config::loader::load_and_validate`)
/// to get a validated configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawConfigFile {
    pub engine: EngineSection,

    #[serde(default)]
    pub store: StoreSection,

    #[serde(default)]
    pub dispatch: DispatchSection,

    #[serde(default)]
    pub upload: UploadSection,

    #[serde(default)]
    pub scheduled_trigger: Vec<ScheduledTriggerConfig>,

    /// Inline task configurations from `[task.<name>]`.
    #[serde(default)]
    pub task: BTreeMap<TaskName, TaskConfig>,
}

/// Validated configuration.
///
/// Fields are private so that the only way to obtain one is through
/// validation.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    engine: EngineSection,
    store: StoreSection,
    dispatch: DispatchSection,
    upload: UploadSection,
    scheduled_trigger: Vec<ScheduledTriggerConfig>,
    task: BTreeMap<TaskName, TaskConfig>,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(raw: RawConfigFile) -> Self {
        let mut engine = raw.engine;
        if engine.allowed_tasks.is_none() {
            engine.allowed_tasks = Some(raw.task.keys().cloned().collect());
        }
        Self {
            engine,
            store: raw.store,
            dispatch: raw.dispatch,
            upload: raw.upload,
            scheduled_trigger: raw.scheduled_trigger,
            task: raw.task,
        }
    }

    pub fn engine(&self) -> &EngineSection {
        &self.engine
    }

    pub fn store(&self) -> &StoreSection {
        &self.store
    }

    pub fn dispatch(&self) -> &DispatchSection {
        &self.dispatch
    }

    pub fn upload(&self) -> &UploadSection {
        &self.upload
    }

    pub fn scheduled_triggers(&self) -> &[ScheduledTriggerConfig] {
        &self.scheduled_trigger
    }

    pub fn tasks(&self) -> &BTreeMap<TaskName, TaskConfig> {
        &self.task
    }

    /// Names a caller is allowed to request; defaults to all inline tasks.
    pub fn allowed_tasks(&self) -> &[TaskName] {
        self.engine.allowed_tasks.as_deref().unwrap_or_default()
    }

    pub(crate) fn rebase_paths(&mut self, base: &std::path::Path) {
        if self.store.path.is_relative() {
            self.store.path = base.join(&self.store.path);
        }
        if let Some(dir) = self.engine.task_config_dir.as_mut() {
            if dir.is_relative() {
                *dir = base.join(&*dir);
            }
        }
    }

    pub fn set_store_backend(&mut self, backend: StoreBackend) {
        self.store.backend = backend;
    }

    pub fn set_dispatch_backend(&mut self, backend: DispatchBackend) {
        self.dispatch.backend = backend;
    }
}

/// `[engine]` section: deployment identity and schedule-path settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineSection {
    /// Scope this deployment runs in (matched against `enabled_scopes`).
    pub scope: String,

    /// Account this deployment runs in (matched against
    /// `enabled_account_names`).
    pub account_name: String,

    /// Key of the run-state record shared by every round of this deployment.
    pub run_scope_key: String,

    /// Tasks a caller may request. If omitted, every `[task.<name>]`.
    #[serde(default)]
    pub allowed_tasks: Option<Vec<TaskName>>,

    /// Dependency appended to every task's requirement list.
    #[serde(default)]
    pub shared_requirement: Option<String>,

    /// Workflow that runs scheduled tasks.
    pub job_target: String,

    /// Name template for schedule-path invocations.
    #[serde(default = "default_task_name_template")]
    pub name_template: String,

    /// Environment layered on top of every task's merged environment.
    #[serde(default)]
    pub task_env: BTreeMap<String, String>,

    /// Directory of `<task>.json` configs consulted after inline tasks.
    #[serde(default)]
    pub task_config_dir: Option<PathBuf>,
}

fn default_task_name_template() -> String {
    "{task}-{timestamp}-{uuid}".to_string()
}

/// `[store]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreSection {
    #[serde(default)]
    pub backend: StoreBackend,

    /// Root directory of the file backend.
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
}

fn default_store_path() -> PathBuf {
    PathBuf::from(".runtrigger")
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            path: default_store_path(),
        }
    }
}

/// `[dispatch]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DispatchSection {
    #[serde(default)]
    pub backend: DispatchBackend,

    /// Shell command run per invocation by the `command` backend.
    #[serde(default)]
    pub command: Option<String>,

    /// Upper bound for a single downstream call.
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

fn default_timeout_seconds() -> u64 {
    30
}

impl Default for DispatchSection {
    fn default() -> Self {
        Self {
            backend: DispatchBackend::default(),
            command: None,
            timeout_seconds: default_timeout_seconds(),
        }
    }
}

/// `[upload]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UploadSection {
    /// Quiet period after the last upload before a drain may fire.
    #[serde(default = "default_window_seconds")]
    pub window_seconds: u64,

    #[serde(default)]
    pub trigger: Vec<UploadTriggerRule>,
}

fn default_window_seconds() -> u64 {
    300
}

impl Default for UploadSection {
    fn default() -> Self {
        Self {
            window_seconds: default_window_seconds(),
            trigger: Vec::new(),
        }
    }
}

/// `[[upload.trigger]]`: which uploads start which workflow.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UploadTriggerRule {
    /// Shell-style glob; `*` also matches `/` and `\` is literal.
    /// Unlike plain fnmatch, `{a,b}` is an alternation, so literal braces
    /// must be written as `[{]` and `[}]`.
    pub file_selector: String,

    /// Drop intermediate `/snowflake/` data files, keeping the
    /// `last_query_id.parquet` completion marker.
    #[serde(default = "default_true")]
    pub ignore_snowflake_data_files: bool,

    /// Compute the match but never dispatch this rule on its own.
    #[serde(default)]
    pub check_only: bool,

    pub workflow: WorkflowTemplate,
}

fn default_true() -> bool {
    true
}

/// Unresolved workflow invocation.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WorkflowTemplate {
    /// Name template; `{timestamp}` and `{uuid}` are interpolated.
    /// Defaults to `{uuid}`.
    #[serde(default)]
    pub name: Option<String>,

    /// Target workflow identifier.
    pub target: String,

    /// JSON object; keys ending in `.$` are placeholders.
    #[serde(default = "empty_object")]
    pub parameters: Value,
}

fn empty_object() -> Value {
    Value::Object(serde_json::Map::new())
}

/// `[[scheduled_trigger]]`: a workflow started by a named schedule.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScheduledTriggerConfig {
    pub schedule_expression: String,
    pub workflow: WorkflowTemplate,
}

/// Static per-task configuration (`[task.<name>]` or `<task>.json`).
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TaskConfig {
    #[serde(default)]
    pub arguments: Vec<Value>,

    /// Working directory inside the task's code archive.
    #[serde(default = "default_cwd")]
    pub cwd: String,

    #[serde(default = "default_entry_point")]
    pub entry_point: String,

    #[serde(default)]
    pub python_lib_dirs: Vec<String>,

    #[serde(default)]
    pub environment: BTreeMap<String, String>,

    #[serde(default)]
    pub kwargs: BTreeMap<String, Value>,

    #[serde(default)]
    pub requirements: Vec<String>,

    #[serde(default)]
    pub run: TaskRunConfig,
}

fn default_cwd() -> String {
    ".".to_string()
}

fn default_entry_point() -> String {
    "script.py".to_string()
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            arguments: Vec::new(),
            cwd: default_cwd(),
            entry_point: default_entry_point(),
            python_lib_dirs: Vec::new(),
            environment: BTreeMap::new(),
            kwargs: BTreeMap::new(),
            requirements: Vec::new(),
            run: TaskRunConfig::default(),
        }
    }
}

/// When a task runs.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TaskRunConfig {
    /// Run on scheduled rounds without being requested.
    #[serde(default)]
    pub default: bool,

    /// `None` means every account.
    #[serde(default)]
    pub enabled_account_names: Option<Vec<String>>,

    /// `None` means every scope.
    #[serde(default)]
    pub enabled_scopes: Option<Vec<String>>,

    /// Frequency policy reference.
    #[serde(default)]
    pub frequency: FrequencySpec,
}

/// Name of a registered trigger policy plus its static parameters.
///
/// ```toml
/// frequency = { policy = "daily", hour = 6 }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct FrequencySpec {
    #[serde(default)]
    pub policy: Option<String>,

    #[serde(flatten)]
    pub params: serde_json::Map<String, Value>,
}

impl FrequencySpec {
    pub fn is_empty(&self) -> bool {
        self.policy.is_none() && self.params.is_empty()
    }
}
