// src/dispatch/descriptor.rs

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::config::model::{EngineSection, TaskConfig, WorkflowTemplate};

/// Longest name the downstream engine accepts.
pub const MAX_NAME_LEN: usize = 80;

/// Default name template of upload and scheduled workflows.
pub const DEFAULT_WORKFLOW_NAME: &str = "{uuid}";

/// A resolved invocation, ready to be submitted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvocationDescriptor {
    pub name: String,
    pub target: String,
    pub parameters: Value,
}

/// Per-invocation override of a task's defaults.
///
/// Each field replaces the task default only when present and non-empty;
/// there is no deep merge.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UserTaskOverride {
    #[serde(default)]
    pub arguments: Option<Vec<Value>>,

    #[serde(default)]
    pub environment: Option<BTreeMap<String, String>>,

    #[serde(default)]
    pub kwargs: Option<BTreeMap<String, Value>>,
}

/// Interpolate `{timestamp}`, `{uuid}` and `{task}` and cap the result at
/// [`MAX_NAME_LEN`] characters.
pub fn render_name(template: &str, now: DateTime<Utc>, task: Option<&str>) -> String {
    let mut name = template
        .replace("{timestamp}", &now.format("%Y-%m-%d_%H-%M-%S").to_string())
        .replace("{uuid}", &Uuid::new_v4().to_string());
    if let Some(task) = task {
        name = name.replace("{task}", task);
    }
    match name.char_indices().nth(MAX_NAME_LEN) {
        Some((idx, _)) => name[..idx].to_string(),
        None => name,
    }
}

fn non_empty_vec<T: Clone>(over: Option<&Vec<T>>, default: &[T]) -> Vec<T> {
    match over {
        Some(v) if !v.is_empty() => v.clone(),
        _ => default.to_vec(),
    }
}

fn non_empty_map<V: Clone>(over: Option<&BTreeMap<String, V>>, default: &BTreeMap<String, V>) -> BTreeMap<String, V> {
    match over {
        Some(m) if !m.is_empty() => m.clone(),
        _ => default.clone(),
    }
}

/// Build the schedule-path invocation of `task`.
///
/// Requirements are the task's own plus the shared one. Arguments,
/// environment and kwargs come from the override when it sets them, else
/// from the task config; `task_env` is layered over the environment.
pub fn build_descriptor(
    task: &str,
    config: &TaskConfig,
    user: Option<&UserTaskOverride>,
    engine: &EngineSection,
    now: DateTime<Utc>,
) -> InvocationDescriptor {
    let mut requirements = config.requirements.clone();
    if let Some(shared) = engine.shared_requirement.as_deref() {
        requirements.push(shared.to_string());
    }

    let arguments = non_empty_vec(user.and_then(|u| u.arguments.as_ref()), &config.arguments);
    let mut environment = non_empty_map(user.and_then(|u| u.environment.as_ref()), &config.environment);
    let kwargs = non_empty_map(user.and_then(|u| u.kwargs.as_ref()), &config.kwargs);

    environment.extend(engine.task_env.iter().map(|(k, v)| (k.clone(), v.clone())));

    InvocationDescriptor {
        name: render_name(&engine.name_template, now, Some(task)),
        target: engine.job_target.clone(),
        parameters: json!({
            "task_name": task,
            "additional_python_modules": requirements.join(","),
            "arguments": arguments,
            "cwd": config.cwd,
            "entry_point": config.entry_point,
            "environment": environment,
            "kwargs": kwargs,
            "python_lib_dirs": config.python_lib_dirs,
        }),
    }
}

/// Resolve a configured workflow with already-substituted parameters.
pub fn workflow_descriptor(template: &WorkflowTemplate, parameters: Value, now: DateTime<Utc>) -> InvocationDescriptor {
    let name_template = template.name.as_deref().unwrap_or(DEFAULT_WORKFLOW_NAME);
    InvocationDescriptor {
        name: render_name(name_template, now, None),
        target: template.target.clone(),
        parameters,
    }
}
