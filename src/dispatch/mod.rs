// src/dispatch/mod.rs

//! Fan-out of resolved invocations to the downstream workflow engine.
//!
//! A batch is always attempted in full. Failures are collected and reported
//! as one [`DispatchError`] once every descriptor has been tried; executions
//! that did start are never rolled back.

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info};

use crate::errors::{DispatchError, FailedInvocation, StartedInvocation};
use crate::types::ExecutionId;

pub mod descriptor;
pub mod engine;

pub use descriptor::{build_descriptor, render_name, workflow_descriptor, InvocationDescriptor, UserTaskOverride};
pub use engine::{CommandEngine, EngineError, LogEngine, WorkflowEngine};

/// Submits descriptors one at a time, each bounded by `timeout`.
#[derive(Clone)]
pub struct Dispatcher {
    engine: Arc<dyn WorkflowEngine>,
    timeout: Duration,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher").field("timeout", &self.timeout).finish()
    }
}

impl Dispatcher {
    pub fn new(engine: Arc<dyn WorkflowEngine>, timeout: Duration) -> Self {
        Self { engine, timeout }
    }

    async fn start_one(&self, descriptor: &InvocationDescriptor) -> Result<ExecutionId, EngineError> {
        info!(
            name = %descriptor.name,
            target = %descriptor.target,
            "starting workflow"
        );
        match tokio::time::timeout(self.timeout, self.engine.start(descriptor)).await {
            Ok(res) => res,
            Err(_) => Err(EngineError::Timeout(self.timeout.as_secs())),
        }
    }

    /// Start every descriptor; return execution ids in input order.
    pub async fn dispatch_all(
        &self,
        descriptors: Vec<InvocationDescriptor>,
    ) -> Result<Vec<ExecutionId>, DispatchError> {
        let mut started = Vec::with_capacity(descriptors.len());
        let mut failed = Vec::new();

        for descriptor in descriptors {
            match self.start_one(&descriptor).await {
                Ok(execution_id) => {
                    info!(name = %descriptor.name, execution_id = %execution_id, "workflow started");
                    started.push(StartedInvocation {
                        name: descriptor.name,
                        execution_id,
                    });
                }
                Err(err) => {
                    error!(
                        name = %descriptor.name,
                        target = %descriptor.target,
                        error = %err,
                        "error while starting workflow"
                    );
                    failed.push(FailedInvocation {
                        name: descriptor.name,
                        target: descriptor.target,
                        reason: err.to_string(),
                    });
                }
            }
        }

        if failed.is_empty() {
            Ok(started.into_iter().map(|s| s.execution_id).collect())
        } else {
            Err(DispatchError { failed, started })
        }
    }
}
