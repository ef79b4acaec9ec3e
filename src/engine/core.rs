// src/engine/core.rs

//! Request handlers.
//!
//! Each request is one sequential unit of work:
//! - trigger: select → evaluate policies (optional) → dispatch
//! - uploads: record
//! - drain: debounce → match → dispatch → clear
//! - schedule: match expression → dispatch

use std::collections::BTreeSet;

use chrono::Duration;
use serde::Serialize;
use tracing::{info, warn};

use crate::dispatch::{build_descriptor, workflow_descriptor, InvocationDescriptor};
use crate::engine::context::EngineContext;
use crate::engine::request::{Request, UserRequest};
use crate::errors::{Result, TriggerError};
use crate::evaluation::{PolicyCandidate, RoundOutcome, TriggerRound};
use crate::selection::{select_candidates, TaskSelector};
use crate::store::UploadRecord;
use crate::types::{ExecutionId, ObjectPath, TaskName};
use crate::upload::{DrainOutcome, UploadAccumulator};

/// Result of a trigger request.
#[derive(Debug, Clone, Serialize)]
pub struct TriggerResponse {
    /// Policy round, if schedules were checked.
    pub round: Option<RoundOutcome>,
    /// Selected tasks, sorted.
    pub selected: Vec<TaskName>,
    pub jobs: Vec<InvocationDescriptor>,
    pub execution_ids: Vec<ExecutionId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DrainStatus {
    Empty,
    Pending,
    Settled,
}

/// Result of a drain request.
#[derive(Debug, Clone, Serialize)]
pub struct DrainResponse {
    pub status: DrainStatus,
    pub paths: Vec<ObjectPath>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
    /// Names of the resolved check-only workflows.
    pub check_only: Vec<String>,
    pub execution_ids: Vec<ExecutionId>,
    /// Upload records removed after dispatch.
    pub cleared: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Response {
    Trigger(TriggerResponse),
    Recorded { records: Vec<UploadRecord> },
    Drain(DrainResponse),
    Schedule {
        schedule_expression: String,
        execution_ids: Vec<ExecutionId>,
    },
}

/// Entry point for all requests.
#[derive(Debug, Clone)]
pub struct TriggerEngine {
    ctx: EngineContext,
}

impl TriggerEngine {
    pub fn new(ctx: EngineContext) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &EngineContext {
        &self.ctx
    }

    pub async fn handle(&self, request: Request) -> Result<Response> {
        info!(kind = request.kind(), dry_run = self.ctx.dry_run, "handling request");
        match request {
            Request::Trigger(user) => self.handle_trigger(&user).await.map(Response::Trigger),
            Request::Uploads(paths) => self
                .handle_uploads(&paths)
                .map(|records| Response::Recorded { records }),
            Request::Drain => self.handle_drain().await.map(Response::Drain),
            Request::Schedule(expr) => {
                let execution_ids = self.handle_schedule(&expr).await?;
                Ok(Response::Schedule {
                    schedule_expression: expr,
                    execution_ids,
                })
            }
        }
    }

    /// Schedule-driven and manual path.
    pub async fn handle_trigger(&self, user: &UserRequest) -> Result<TriggerResponse> {
        let ctx = &self.ctx;
        let engine_cfg = ctx.config.engine();
        let now = ctx.clock.now();

        let requested = user.task_list();
        let candidates = select_candidates(ctx.config.allowed_tasks(), requested.as_deref())?;
        info!(candidates = ?candidates, "task candidates");

        let selector = TaskSelector::new(&engine_cfg.scope, &engine_cfg.account_name, ctx.tasks.as_ref());
        let configs = selector.load_configs(&candidates);

        let (round, selected) = if user.check_schedule() {
            let requested_set: Option<BTreeSet<TaskName>> = requested.map(|r| r.into_iter().collect());
            let evaluation_set = selector.evaluation_set(&configs, requested_set.as_ref());

            let policy_candidates = evaluation_set
                .into_iter()
                .filter_map(|task| {
                    let cfg = configs.get(&task)?;
                    if cfg.run.frequency.is_empty() {
                        info!(task = %task, "task does not define a frequency policy");
                    }
                    let policy = ctx.policies.load(&cfg.run.frequency);
                    Some(PolicyCandidate { task, policy })
                })
                .collect();

            let persist = user.update_run_db && !ctx.dry_run;
            let round = TriggerRound::new(ctx.run_state.as_ref(), &engine_cfg.run_scope_key, persist, now)
                .run(policy_candidates)?;
            let fired = round.fired();
            (Some(round), fired)
        } else {
            info!("schedule check disabled; every loaded candidate is selected");
            (None, configs.keys().cloned().collect::<Vec<_>>())
        };

        let mut selected = selected;
        selected.sort();

        let jobs: Vec<InvocationDescriptor> = selected
            .iter()
            .filter_map(|task| {
                let cfg = configs.get(task)?;
                Some(build_descriptor(task, cfg, user.override_for(task), engine_cfg, now))
            })
            .collect();

        let execution_ids = ctx.dispatcher.dispatch_all(jobs.clone()).await?;
        info!(selected = ?selected, started = execution_ids.len(), "trigger request done");

        Ok(TriggerResponse {
            round,
            selected,
            jobs,
            execution_ids,
        })
    }

    /// Record upload notifications.
    pub fn handle_uploads(&self, paths: &[ObjectPath]) -> Result<Vec<UploadRecord>> {
        let now = self.ctx.clock.now();
        UploadAccumulator::new(self.ctx.uploads.as_ref()).record(paths, now)
    }

    /// Drain settled uploads and start the matching workflows.
    ///
    /// Records are cleared only after every invocation started; on a
    /// dispatch failure they stay for the next drain.
    pub async fn handle_drain(&self) -> Result<DrainResponse> {
        let ctx = &self.ctx;
        let now = ctx.clock.now();
        let window_seconds = i64::try_from(ctx.config.upload().window_seconds)
            .map_err(|_| TriggerError::ConfigError("[upload].window_seconds out of range".to_string()))?;
        let window = Duration::try_seconds(window_seconds)
            .ok_or_else(|| TriggerError::ConfigError("[upload].window_seconds out of range".to_string()))?;

        let accumulator = UploadAccumulator::new(ctx.uploads.as_ref());
        let batch = match accumulator.drain(window, now)? {
            DrainOutcome::Empty => return Ok(DrainResponse::idle(DrainStatus::Empty)),
            DrainOutcome::Pending { .. } => return Ok(DrainResponse::idle(DrainStatus::Pending)),
            DrainOutcome::Settled(batch) => batch,
        };

        let matched = ctx.matcher.invocations(&batch.paths, Some(&batch.fingerprint), now)?;
        info!(
            uploads = batch.paths.len(),
            workflows = matched.dispatch.len(),
            check_only = matched.check_only.len(),
            "uploads triggered workflows"
        );

        let execution_ids = ctx.dispatcher.dispatch_all(matched.dispatch).await?;

        let cleared = if ctx.dry_run {
            warn!("dry run: keeping drained upload records");
            0
        } else {
            accumulator.clear(&batch)?
        };

        Ok(DrainResponse {
            status: DrainStatus::Settled,
            check_only: matched.check_only.into_iter().map(|d| d.name).collect(),
            paths: batch.paths,
            fingerprint: Some(batch.fingerprint),
            execution_ids,
            cleared,
        })
    }

    /// Start every scheduled trigger registered for `expr`.
    pub async fn handle_schedule(&self, expr: &str) -> Result<Vec<ExecutionId>> {
        let now = self.ctx.clock.now();
        let descriptors: Vec<InvocationDescriptor> = self
            .ctx
            .config
            .scheduled_triggers()
            .iter()
            .filter(|t| t.schedule_expression == expr)
            .map(|t| workflow_descriptor(&t.workflow, t.workflow.parameters.clone(), now))
            .collect();
        info!(schedule_expression = %expr, workflows = descriptors.len(), "schedule triggered workflows");
        Ok(self.ctx.dispatcher.dispatch_all(descriptors).await?)
    }
}

impl DrainResponse {
    fn idle(status: DrainStatus) -> Self {
        Self {
            status,
            paths: Vec::new(),
            fingerprint: None,
            check_only: Vec::new(),
            execution_ids: Vec::new(),
            cleared: 0,
        }
    }
}
