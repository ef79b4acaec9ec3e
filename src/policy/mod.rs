// src/policy/mod.rs

//! Frequency policies: decide whether a task fires this round and how its
//! persisted state advances when it does.
//!
//! - [`registry`] maps policy names to constructors and validates static
//!   parameters at load time.
//! - [`builtin`] contains the policies every deployment gets.

use std::fmt;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::types::TriggerState;

pub mod builtin;
pub mod registry;

pub use registry::{PolicyConstructor, PolicyRegistry};

/// Everything a policy may know about the round besides the task's state.
#[derive(Debug, Clone, Copy)]
pub struct EvalContext<'a> {
    pub task: &'a str,
    pub scope_key: &'a str,
    pub now: DateTime<Utc>,
}

/// A frequency policy.
///
/// `evaluate` only borrows the state, so it cannot change what is persisted.
/// `advance` consumes the old state and returns the one to persist; the
/// caller invokes it only for fired tasks whose state is being committed.
pub trait TriggerPolicy: Send + Sync + fmt::Debug {
    /// Registered name of this policy.
    fn name(&self) -> &str;

    fn evaluate(&self, state: &TriggerState, ctx: &EvalContext<'_>) -> Result<bool, PolicyError>;

    fn advance(&self, state: TriggerState, ctx: &EvalContext<'_>) -> Result<TriggerState, PolicyError>;
}

/// Failure of a single task's policy. Never fatal to a round.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PolicyError {
    #[error("task does not define a frequency policy")]
    Missing,

    #[error("unknown policy '{0}'")]
    Unknown(String),

    #[error("invalid parameters for policy '{policy}': {reason}")]
    InvalidParams { policy: String, reason: String },

    #[error("policy '{policy}' failed to evaluate: {reason}")]
    Evaluation { policy: String, reason: String },
}
