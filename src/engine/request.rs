// src/engine/request.rs

//! Incoming requests and how raw JSON events map onto them.

use std::collections::{BTreeMap, BTreeSet};

use serde::Deserialize;
use serde_json::Value;

use crate::dispatch::UserTaskOverride;
use crate::errors::{Result, TriggerError};
use crate::selection::split_csl;
use crate::types::{ObjectPath, TaskName};
use crate::upload::upload_paths_from_event;

/// `tasks` may be given as `"a, b"` or `["a", "b"]`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum TaskList {
    Csv(String),
    List(Vec<TaskName>),
}

impl TaskList {
    pub fn names(&self) -> Vec<TaskName> {
        match self {
            TaskList::Csv(raw) => split_csl(raw),
            TaskList::List(items) => items
                .iter()
                .map(|s| s.trim())
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
        }
    }
}

/// Manual/API trigger request of the schedule path.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UserRequest {
    #[serde(default, alias = "Comment")]
    pub comment: Option<String>,

    #[serde(default, alias = "AWS_STEP_FUNCTIONS_STARTED_BY_EXECUTION_ID")]
    pub started_by: Option<String>,

    /// `None`: check schedules only when no tasks were requested.
    #[serde(default)]
    pub check_schedule: Option<bool>,

    #[serde(default)]
    pub settings: Option<BTreeMap<TaskName, UserTaskOverride>>,

    #[serde(default)]
    pub tasks: Option<TaskList>,

    /// Advance and persist trigger state of fired tasks.
    #[serde(default = "default_true")]
    pub update_run_db: bool,
}

fn default_true() -> bool {
    true
}

impl Default for UserRequest {
    fn default() -> Self {
        Self {
            comment: None,
            started_by: None,
            check_schedule: None,
            settings: None,
            tasks: None,
            update_run_db: true,
        }
    }
}

impl UserRequest {
    /// Union of `tasks` and the keys of `settings`, or `None` when neither
    /// was given.
    pub fn task_list(&self) -> Option<Vec<TaskName>> {
        if self.tasks.is_none() && self.settings.is_none() {
            return None;
        }
        let mut names: BTreeSet<TaskName> = self.tasks.iter().flat_map(TaskList::names).collect();
        names.extend(self.settings.iter().flat_map(|s| s.keys().cloned()));
        Some(names.into_iter().collect())
    }

    pub fn check_schedule(&self) -> bool {
        self.check_schedule.unwrap_or_else(|| self.task_list().is_none())
    }

    pub fn override_for(&self, task: &str) -> Option<&UserTaskOverride> {
        self.settings.as_ref().and_then(|s| s.get(task))
    }
}

#[derive(Debug, Clone)]
pub enum Request {
    Trigger(UserRequest),
    /// Upload notifications to record.
    Uploads(Vec<ObjectPath>),
    Drain,
    /// A named schedule fired.
    Schedule(String),
}

impl Request {
    /// Route a raw event by its shape:
    /// - `Records` → upload notifications
    /// - `drain` → drain
    /// - `schedule_expression` → scheduled triggers
    /// - otherwise a user trigger request, read from `user_config` if present
    pub fn from_event(event: &Value) -> Result<Self> {
        let Some(obj) = event.as_object() else {
            return Err(TriggerError::InvalidRequest(format!("event is not an object: {event}")));
        };

        if obj.contains_key("Records") {
            return Ok(Request::Uploads(upload_paths_from_event(event)?));
        }
        if obj.contains_key("drain") {
            return Ok(Request::Drain);
        }
        if let Some(expr) = obj.get("schedule_expression") {
            let expr = expr
                .as_str()
                .ok_or_else(|| TriggerError::InvalidRequest("schedule_expression must be a string".to_string()))?;
            return Ok(Request::Schedule(expr.to_string()));
        }

        let body = obj.get("user_config").unwrap_or(event);
        let user: UserRequest = serde_json::from_value(body.clone())
            .map_err(|e| TriggerError::InvalidRequest(format!("invalid trigger request: {e}")))?;
        Ok(Request::Trigger(user))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Request::Trigger(_) => "trigger",
            Request::Uploads(_) => "uploads",
            Request::Drain => "drain",
            Request::Schedule(_) => "schedule",
        }
    }
}
