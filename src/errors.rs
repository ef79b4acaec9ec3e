// src/errors.rs

//! Crate-wide error types.
//!
//! [`TriggerError`] is what a request surfaces to its caller. Errors that are
//! recovered locally (a single task's policy, a single downstream call) have
//! their own types in [`crate::policy`] and [`crate::dispatch`].

use std::fmt;

use thiserror::Error;

use crate::types::ExecutionId;

#[derive(Error, Debug)]
pub enum TriggerError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl TriggerError {
    /// Wrap any store-level failure, keeping the full context chain.
    pub fn storage(err: impl fmt::Display) -> Self {
        TriggerError::StorageError(format!("{err:#}"))
    }
}

/// One invocation the downstream engine refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedInvocation {
    pub name: String,
    pub target: String,
    pub reason: String,
}

/// One invocation that was started before the batch failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartedInvocation {
    pub name: String,
    pub execution_id: ExecutionId,
}

/// Aggregate dispatch failure.
///
/// Only raised after every descriptor of the batch has been attempted. Carries
/// the invocations that did start as well, since they are not rolled back and
/// a caller retrying the batch needs to know about them.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub struct DispatchError {
    pub failed: Vec<FailedInvocation>,
    pub started: Vec<StartedInvocation>,
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.failed.iter().map(|i| i.name.as_str()).collect();
        write!(
            f,
            "unable to start {} workflow(s): {}",
            self.failed.len(),
            names.join(", ")
        )?;
        if !self.started.is_empty() {
            let started: Vec<String> = self
                .started
                .iter()
                .map(|s| format!("{}={}", s.name, s.execution_id))
                .collect();
            write!(f, "; already started: {}", started.join(", "))?;
        }
        Ok(())
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, TriggerError>;
