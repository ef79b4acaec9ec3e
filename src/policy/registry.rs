// src/policy/registry.rs

use std::collections::BTreeMap;
use std::fmt;

use serde_json::{Map, Value};
use tracing::debug;

use crate::config::model::FrequencySpec;
use crate::policy::builtin;
use crate::policy::{PolicyError, TriggerPolicy};

/// Builds a policy from its static parameters, rejecting invalid ones.
pub type PolicyConstructor = fn(&Map<String, Value>) -> Result<Box<dyn TriggerPolicy>, PolicyError>;

/// Name → constructor table.
#[derive(Clone, Default)]
pub struct PolicyRegistry {
    constructors: BTreeMap<String, PolicyConstructor>,
}

impl fmt::Debug for PolicyRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PolicyRegistry")
            .field("policies", &self.constructors.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl PolicyRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every policy from [`builtin`].
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(builtin::ALWAYS, builtin::always);
        registry.register(builtin::NEVER, builtin::never);
        registry.register(builtin::ONCE, builtin::once);
        registry.register(builtin::INTERVAL, builtin::interval);
        registry.register(builtin::DAILY, builtin::daily);
        registry
    }

    /// Add or replace a policy constructor.
    pub fn register(&mut self, name: impl Into<String>, constructor: PolicyConstructor) {
        self.constructors.insert(name.into(), constructor);
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.constructors.keys().map(String::as_str)
    }

    /// Instantiate the policy referenced by a task's `run.frequency`.
    pub fn load(&self, spec: &FrequencySpec) -> Result<Box<dyn TriggerPolicy>, PolicyError> {
        let name = match spec.policy.as_deref() {
            Some(name) if !name.trim().is_empty() => name,
            _ => return Err(PolicyError::Missing),
        };
        let constructor = self
            .constructors
            .get(name)
            .ok_or_else(|| PolicyError::Unknown(name.to_string()))?;
        debug!(policy = %name, params = ?spec.params, "loading frequency policy");
        constructor(&spec.params)
    }
}
