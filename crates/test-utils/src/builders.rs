#![allow(dead_code)]

use std::collections::BTreeMap;

use serde_json::{Map, Value};
use runtrigger::config::{
    ConfigFile, DispatchSection, EngineSection, FrequencySpec, RawConfigFile, ScheduledTriggerConfig,
    StoreSection, TaskConfig, UploadSection, UploadTriggerRule, WorkflowTemplate,
};
use runtrigger::types::StoreBackend;

pub const TEST_SCOPE: &str = "br";
pub const TEST_ACCOUNT: &str = "dev";
pub const TEST_SCOPE_KEY: &str = "cdp-dev-br";
pub const TEST_JOB_TARGET: &str = "custom-data-processing";

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile {
                engine: EngineSection {
                    scope: TEST_SCOPE.to_string(),
                    account_name: TEST_ACCOUNT.to_string(),
                    run_scope_key: TEST_SCOPE_KEY.to_string(),
                    allowed_tasks: None,
                    shared_requirement: None,
                    job_target: TEST_JOB_TARGET.to_string(),
                    name_template: "{task}-{timestamp}-{uuid}".to_string(),
                    task_env: BTreeMap::new(),
                    task_config_dir: None,
                },
                store: StoreSection {
                    backend: StoreBackend::Memory,
                    ..StoreSection::default()
                },
                dispatch: DispatchSection::default(),
                upload: UploadSection::default(),
                scheduled_trigger: Vec::new(),
                task: BTreeMap::new(),
            },
        }
    }

    pub fn with_task(mut self, name: &str, task: TaskConfig) -> Self {
        self.config.task.insert(name.to_string(), task);
        self
    }

    pub fn with_allowed_tasks(mut self, names: &[&str]) -> Self {
        self.config.engine.allowed_tasks = Some(names.iter().map(|s| s.to_string()).collect());
        self
    }

    pub fn with_scope(mut self, scope: &str, account: &str) -> Self {
        self.config.engine.scope = scope.to_string();
        self.config.engine.account_name = account.to_string();
        self
    }

    pub fn with_shared_requirement(mut self, req: &str) -> Self {
        self.config.engine.shared_requirement = Some(req.to_string());
        self
    }

    pub fn with_task_env(mut self, key: &str, value: &str) -> Self {
        self.config.engine.task_env.insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_window_seconds(mut self, seconds: u64) -> Self {
        self.config.upload.window_seconds = seconds;
        self
    }

    pub fn with_upload_rule(mut self, rule: UploadTriggerRule) -> Self {
        self.config.upload.trigger.push(rule);
        self
    }

    pub fn with_scheduled_trigger(mut self, expr: &str, workflow: WorkflowTemplate) -> Self {
        self.config.scheduled_trigger.push(ScheduledTriggerConfig {
            schedule_expression: expr.to_string(),
            workflow,
        });
        self
    }

    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `TaskConfig`.
pub struct TaskConfigBuilder {
    task: TaskConfig,
}

impl TaskConfigBuilder {
    pub fn new() -> Self {
        Self {
            task: TaskConfig::default(),
        }
    }

    pub fn default_run(mut self, val: bool) -> Self {
        self.task.run.default = val;
        self
    }

    /// Set `run.frequency`; `params` must be a JSON object (or null).
    pub fn policy(mut self, name: &str, params: Value) -> Self {
        let params = match params {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        self.task.run.frequency = FrequencySpec {
            policy: Some(name.to_string()),
            params,
        };
        self
    }

    pub fn scopes(mut self, scopes: &[&str]) -> Self {
        self.task.run.enabled_scopes = Some(scopes.iter().map(|s| s.to_string()).collect());
        self
    }

    pub fn accounts(mut self, accounts: &[&str]) -> Self {
        self.task.run.enabled_account_names = Some(accounts.iter().map(|s| s.to_string()).collect());
        self
    }

    pub fn requirement(mut self, req: &str) -> Self {
        self.task.requirements.push(req.to_string());
        self
    }

    pub fn argument(mut self, arg: Value) -> Self {
        self.task.arguments.push(arg);
        self
    }

    pub fn env(mut self, key: &str, value: &str) -> Self {
        self.task.environment.insert(key.to_string(), value.to_string());
        self
    }

    pub fn kwarg(mut self, key: &str, value: Value) -> Self {
        self.task.kwargs.insert(key.to_string(), value);
        self
    }

    pub fn build(self) -> TaskConfig {
        self.task
    }
}

impl Default for TaskConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

pub fn workflow(name: Option<&str>, target: &str, parameters: Value) -> WorkflowTemplate {
    WorkflowTemplate {
        name: name.map(str::to_string),
        target: target.to_string(),
        parameters,
    }
}

pub fn upload_rule(selector: &str, target: &str, parameters: Value) -> UploadTriggerRule {
    UploadTriggerRule {
        file_selector: selector.to_string(),
        ignore_snowflake_data_files: true,
        check_only: false,
        workflow: workflow(None, target, parameters),
    }
}

pub fn check_only_rule(selector: &str, name: &str, target: &str, parameters: Value) -> UploadTriggerRule {
    UploadTriggerRule {
        check_only: true,
        workflow: workflow(Some(name), target, parameters),
        ..upload_rule(selector, target, Value::Null)
    }
}
