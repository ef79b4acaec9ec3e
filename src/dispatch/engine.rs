// src/dispatch/engine.rs

//! Downstream workflow engine abstraction.
//!
//! The dispatcher talks to a `WorkflowEngine` instead of a concrete client.
//! - [`LogEngine`] only logs and fabricates an execution id (dry runs, local
//!   setups).
//! - [`CommandEngine`] runs a configured shell command per invocation.
//! - Tests provide their own engine that records and selectively fails.

use std::future::Future;
use std::pin::Pin;
use std::process::Stdio;

use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info};
use uuid::Uuid;

use crate::dispatch::descriptor::InvocationDescriptor;
use crate::types::ExecutionId;

/// Failure of a single `start` call. Never fatal to a batch.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// Could not reach the engine or the call itself broke.
    #[error("transport error: {0}")]
    Transport(String),

    /// The engine refused the invocation.
    #[error("rejected: {0}")]
    Rejected(String),

    #[error("timed out after {0}s")]
    Timeout(u64),
}

pub type StartFuture<'a> = Pin<Box<dyn Future<Output = Result<ExecutionId, EngineError>> + Send + 'a>>;

/// Something that can start workflow executions.
pub trait WorkflowEngine: Send + Sync {
    /// Start one execution and return its id.
    fn start<'a>(&'a self, descriptor: &'a InvocationDescriptor) -> StartFuture<'a>;
}

/// Engine that only logs each invocation.
#[derive(Debug, Clone, Default)]
pub struct LogEngine;

impl WorkflowEngine for LogEngine {
    fn start<'a>(&'a self, descriptor: &'a InvocationDescriptor) -> StartFuture<'a> {
        Box::pin(async move {
            let execution_id = format!("{}:{}", descriptor.target, descriptor.name);
            info!(
                name = %descriptor.name,
                target = %descriptor.target,
                parameters = %descriptor.parameters,
                "would start workflow"
            );
            Ok(execution_id)
        })
    }
}

/// Engine that runs a shell command for every invocation.
///
/// The command sees `RUNTRIGGER_NAME`, `RUNTRIGGER_TARGET` and
/// `RUNTRIGGER_PARAMETERS` (JSON) in its environment. The last non-empty
/// stdout line is the execution id; if there is none, one is generated.
/// A non-zero exit status is a rejection.
#[derive(Debug, Clone)]
pub struct CommandEngine {
    cmd: String,
}

impl CommandEngine {
    pub fn new(cmd: impl Into<String>) -> Self {
        Self { cmd: cmd.into() }
    }

    fn command(&self) -> Command {
        if cfg!(windows) {
            let mut c = Command::new("cmd");
            c.arg("/C").arg(&self.cmd);
            c
        } else {
            let mut c = Command::new("sh");
            c.arg("-c").arg(&self.cmd);
            c
        }
    }
}

impl WorkflowEngine for CommandEngine {
    fn start<'a>(&'a self, descriptor: &'a InvocationDescriptor) -> StartFuture<'a> {
        Box::pin(async move {
            let parameters = serde_json::to_string(&descriptor.parameters)
                .map_err(|e| EngineError::Rejected(format!("unserializable parameters: {e}")))?;

            let mut cmd = self.command();
            cmd.env("RUNTRIGGER_NAME", &descriptor.name)
                .env("RUNTRIGGER_TARGET", &descriptor.target)
                .env("RUNTRIGGER_PARAMETERS", parameters)
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true);

            debug!(name = %descriptor.name, cmd = %self.cmd, "spawning dispatch command");
            let output = cmd
                .output()
                .await
                .map_err(|e| EngineError::Transport(format!("spawning '{}': {e}", self.cmd)))?;

            let stderr = String::from_utf8_lossy(&output.stderr);
            for line in stderr.lines() {
                debug!(name = %descriptor.name, "stderr: {}", line);
            }

            if !output.status.success() {
                let code = output.status.code().unwrap_or(-1);
                let last = stderr.lines().rev().find(|l| !l.trim().is_empty()).unwrap_or("");
                return Err(EngineError::Rejected(format!("exit code {code}: {}", last.trim())));
            }

            let stdout = String::from_utf8_lossy(&output.stdout);
            let execution_id = stdout
                .lines()
                .rev()
                .map(str::trim)
                .find(|l| !l.is_empty())
                .map(str::to_string)
                .unwrap_or_else(|| Uuid::new_v4().to_string());
            Ok(execution_id)
        })
    }
}
