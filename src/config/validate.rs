// src/config/validate.rs

use regex::Regex;

use crate::config::model::{ConfigFile, RawConfigFile, WorkflowTemplate};
use crate::errors::{Result, TriggerError};
use crate::types::DispatchBackend;
use crate::upload::matcher::compile_selector;

const TASK_NAME_PATTERN: &str = r"^[A-Za-z0-9_.-]+$";

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = crate::errors::TriggerError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    validate_engine(cfg)?;
    validate_task_names(cfg)?;
    validate_dispatch(cfg)?;
    validate_upload_triggers(cfg)?;
    validate_scheduled_triggers(cfg)?;
    Ok(())
}

fn config_error(msg: impl Into<String>) -> TriggerError {
    TriggerError::ConfigError(msg.into())
}

fn validate_engine(cfg: &RawConfigFile) -> Result<()> {
    let engine = &cfg.engine;
    if engine.run_scope_key.trim().is_empty() {
        return Err(config_error("[engine].run_scope_key must not be empty"));
    }
    if engine.job_target.trim().is_empty() {
        return Err(config_error("[engine].job_target must not be empty"));
    }
    if engine.name_template.trim().is_empty() {
        return Err(config_error("[engine].name_template must not be empty"));
    }
    Ok(())
}

fn validate_task_names(cfg: &RawConfigFile) -> Result<()> {
    let pattern = Regex::new(TASK_NAME_PATTERN)
        .map_err(|e| config_error(format!("invalid task name pattern: {e}")))?;

    let allowed = cfg.engine.allowed_tasks.iter().flatten();
    for name in cfg.task.keys().chain(allowed) {
        if !pattern.is_match(name) {
            return Err(config_error(format!(
                "invalid task name '{name}' (expected {TASK_NAME_PATTERN})"
            )));
        }
    }
    Ok(())
}

fn validate_dispatch(cfg: &RawConfigFile) -> Result<()> {
    if cfg.dispatch.timeout_seconds == 0 {
        return Err(config_error(
            "[dispatch].timeout_seconds must be >= 1 (got 0)",
        ));
    }

    let has_command = cfg
        .dispatch
        .command
        .as_deref()
        .is_some_and(|c| !c.trim().is_empty());
    if cfg.dispatch.backend == DispatchBackend::Command && !has_command {
        return Err(config_error(
            "[dispatch].command is required when backend = \"command\"",
        ));
    }
    Ok(())
}

fn validate_upload_triggers(cfg: &RawConfigFile) -> Result<()> {
    for (idx, rule) in cfg.upload.trigger.iter().enumerate() {
        compile_selector(&rule.file_selector)
            .map_err(|e| {
                config_error(format!(
                    "[[upload.trigger]] #{idx}: invalid file_selector '{}': {e}",
                    rule.file_selector
                ))
            })?;
        validate_workflow(&rule.workflow, &format!("[[upload.trigger]] #{idx}"))?;
    }
    Ok(())
}

fn validate_scheduled_triggers(cfg: &RawConfigFile) -> Result<()> {
    for (idx, trigger) in cfg.scheduled_trigger.iter().enumerate() {
        if trigger.schedule_expression.trim().is_empty() {
            return Err(config_error(format!(
                "[[scheduled_trigger]] #{idx}: schedule_expression must not be empty"
            )));
        }
        validate_workflow(&trigger.workflow, &format!("[[scheduled_trigger]] #{idx}"))?;
    }
    Ok(())
}

fn validate_workflow(workflow: &WorkflowTemplate, origin: &str) -> Result<()> {
    if workflow.target.trim().is_empty() {
        return Err(config_error(format!(
            "{origin}: workflow.target must not be empty"
        )));
    }
    if !workflow.parameters.is_object() {
        return Err(config_error(format!(
            "{origin}: workflow.parameters must be a table/object"
        )));
    }
    Ok(())
}
