// src/selection.rs

//! Which tasks take part in a round.
//!
//! Three narrowing steps, each logged:
//! 1. [`select_candidates`]: the caller's explicit tasks, or every allowed task.
//! 2. [`TaskSelector::load_configs`]: candidates without a loadable config drop out.
//! 3. [`TaskSelector::evaluation_set`]: scope/account applicability plus
//!    "requested or on by default".

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, info, warn};

use crate::config::model::{TaskConfig, TaskRunConfig};
use crate::config::tasks::TaskConfigLoader;
use crate::errors::{Result, TriggerError};
use crate::types::TaskName;

/// Split a comma-separated list, trimming items and dropping empty ones.
pub fn split_csl(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

/// Resolve the candidate set.
///
/// With an explicit request the candidates are exactly the requested names
/// (sorted, deduplicated) and every one of them must be allowed. Without one,
/// all allowed tasks are candidates.
pub fn select_candidates(allowed: &[TaskName], requested: Option<&[TaskName]>) -> Result<Vec<TaskName>> {
    let Some(requested) = requested else {
        return Ok(allowed.to_vec());
    };

    let allowed_set: BTreeSet<&str> = allowed.iter().map(String::as_str).collect();
    let requested: BTreeSet<&str> = requested.iter().map(String::as_str).collect();
    let invalid: Vec<&str> = requested
        .iter()
        .copied()
        .filter(|name| !allowed_set.contains(name))
        .collect();

    if !invalid.is_empty() {
        return Err(TriggerError::ConfigError(format!(
            "invalid tasks selected: {}",
            invalid.join(", ")
        )));
    }

    Ok(requested.into_iter().map(str::to_string).collect())
}

/// Whether `value` is in an optional allow-list; a missing list allows all.
fn allowed_by(value: &str, list: Option<&[String]>) -> bool {
    match list {
        None => true,
        Some(list) => list.iter().any(|item| item == value),
    }
}

/// Scope/account applicability of a task.
pub fn is_applicable(run: &TaskRunConfig, scope: &str, account: &str) -> bool {
    allowed_by(scope, run.enabled_scopes.as_deref())
        && allowed_by(account, run.enabled_account_names.as_deref())
}

/// Task selection bound to one deployment scope/account.
#[derive(Debug, Clone, Copy)]
pub struct TaskSelector<'a> {
    scope: &'a str,
    account: &'a str,
    loader: &'a dyn TaskConfigLoader,
}

impl<'a> TaskSelector<'a> {
    pub fn new(scope: &'a str, account: &'a str, loader: &'a dyn TaskConfigLoader) -> Self {
        Self {
            scope,
            account,
            loader,
        }
    }

    /// Load configs for the candidates; tasks without one are left out.
    pub fn load_configs(&self, candidates: &[TaskName]) -> BTreeMap<TaskName, TaskConfig> {
        let mut configs = BTreeMap::new();
        for name in candidates {
            match self.loader.load(name) {
                Some(cfg) => {
                    configs.insert(name.clone(), cfg);
                }
                None => warn!(task = %name, "no task config found; task left out"),
            }
        }
        configs
    }

    /// Tasks whose policy gets evaluated this round.
    ///
    /// `requested` is the caller's explicit task set, if any.
    pub fn evaluation_set(
        &self,
        configs: &BTreeMap<TaskName, TaskConfig>,
        requested: Option<&BTreeSet<TaskName>>,
    ) -> Vec<TaskName> {
        let mut selected = Vec::new();
        for (name, cfg) in configs {
            if !is_applicable(&cfg.run, self.scope, self.account) {
                info!(
                    task = %name,
                    scope = %self.scope,
                    account = %self.account,
                    "task did not request to run for this scope/account"
                );
                continue;
            }

            let is_requested = requested.is_some_and(|r| r.contains(name));
            if is_requested || cfg.run.default {
                selected.push(name.clone());
            } else {
                debug!(task = %name, "task neither requested nor on by default");
            }
        }
        selected
    }
}
