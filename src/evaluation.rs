// src/evaluation.rs

//! One trigger round: evaluate each selected task's policy against the
//! persisted state and commit the resulting state in a single write.
//!
//! The round works on a private copy of the task-state map read at the start.
//! Fired tasks (when persisting) get their slice replaced in that copy; every
//! other slice is carried over untouched. The copy is then written back as a
//! whole, even if nothing changed.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::errors::Result;
use crate::policy::{EvalContext, PolicyError, TriggerPolicy};
use crate::store::{RunStateRecord, RunStateStore};
use crate::types::{TaskName, TriggerState};

/// A task entering the round with its (possibly failed) policy.
#[derive(Debug)]
pub struct PolicyCandidate {
    pub task: TaskName,
    pub policy: std::result::Result<Box<dyn TriggerPolicy>, PolicyError>,
}

/// Per-task result of a round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "verdict", content = "reason", rename_all = "snake_case")]
pub enum TaskVerdict {
    Fired,
    NotFired,
    /// Policy could not be loaded, evaluated or advanced; state untouched.
    Skipped(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskRoundResult {
    pub task: TaskName,
    #[serde(flatten)]
    pub verdict: TaskVerdict,
}

/// Result of a committed round.
#[derive(Debug, Clone, Serialize)]
pub struct RoundOutcome {
    pub scope_key: String,
    /// Version written by this round's commit.
    pub version: u64,
    pub results: Vec<TaskRoundResult>,
}

impl RoundOutcome {
    /// Fired tasks, in evaluation order.
    pub fn fired(&self) -> Vec<TaskName> {
        self.results
            .iter()
            .filter(|r| r.verdict == TaskVerdict::Fired)
            .map(|r| r.task.clone())
            .collect()
    }
}

/// Settings of one round.
#[derive(Debug, Clone, Copy)]
pub struct TriggerRound<'a> {
    store: &'a dyn RunStateStore,
    scope_key: &'a str,
    /// Advance and persist the state of fired tasks.
    persist: bool,
    now: DateTime<Utc>,
}

impl<'a> TriggerRound<'a> {
    pub fn new(store: &'a dyn RunStateStore, scope_key: &'a str, persist: bool, now: DateTime<Utc>) -> Self {
        Self {
            store,
            scope_key,
            persist,
            now,
        }
    }

    /// Evaluate every candidate and commit.
    ///
    /// Fails only if the store cannot be read or written; a failing read
    /// means nothing is evaluated and nothing is written.
    pub fn run(&self, candidates: Vec<PolicyCandidate>) -> Result<RoundOutcome> {
        let baseline = self.store.get(self.scope_key)?;
        let mut working: BTreeMap<TaskName, TriggerState> = baseline.tasks.clone();
        let mut results = Vec::with_capacity(candidates.len());

        for candidate in candidates {
            let state = working.get(&candidate.task).cloned().unwrap_or_default();
            debug!(task = %candidate.task, ?state, "stored task state");

            let (verdict, new_state) = match candidate.policy {
                Ok(policy) => self.evaluate_task(&candidate.task, policy.as_ref(), state),
                Err(err) => {
                    warn!(task = %candidate.task, error = %err, "unable to load frequency policy; skipping task");
                    (TaskVerdict::Skipped(err.to_string()), None)
                }
            };

            if let Some(new_state) = new_state {
                debug!(task = %candidate.task, state = ?new_state, "writing new task state");
                working.insert(candidate.task.clone(), new_state);
            }
            results.push(TaskRoundResult {
                task: candidate.task,
                verdict,
            });
        }

        let record = RunStateRecord {
            scope_key: self.scope_key.to_string(),
            version: baseline.version + 1,
            tasks: working,
        };
        self.store.put(&record)?;

        let outcome = RoundOutcome {
            scope_key: record.scope_key,
            version: record.version,
            results,
        };
        info!(
            scope_key = %outcome.scope_key,
            version = outcome.version,
            fired = ?outcome.fired(),
            "trigger round committed"
        );
        Ok(outcome)
    }

    /// Evaluate one task; returns its verdict and, if it should be persisted,
    /// its new state.
    fn evaluate_task(
        &self,
        task: &str,
        policy: &dyn TriggerPolicy,
        state: TriggerState,
    ) -> (TaskVerdict, Option<TriggerState>) {
        let ctx = EvalContext {
            task,
            scope_key: self.scope_key,
            now: self.now,
        };

        match policy.evaluate(&state, &ctx) {
            Ok(true) => {}
            Ok(false) => {
                info!(task = %task, policy = policy.name(), "task was not triggered");
                return (TaskVerdict::NotFired, None);
            }
            Err(err) => {
                warn!(task = %task, policy = policy.name(), error = %err, "task has a trigger issue; skipping");
                return (TaskVerdict::Skipped(err.to_string()), None);
            }
        }

        if !self.persist {
            info!(task = %task, policy = policy.name(), "task was triggered (state not persisted)");
            return (TaskVerdict::Fired, None);
        }

        match policy.advance(state, &ctx) {
            Ok(new_state) => {
                info!(task = %task, policy = policy.name(), "task was triggered");
                (TaskVerdict::Fired, Some(new_state))
            }
            Err(err) => {
                warn!(task = %task, policy = policy.name(), error = %err, "unable to advance task state; skipping");
                (TaskVerdict::Skipped(err.to_string()), None)
            }
        }
    }
}
