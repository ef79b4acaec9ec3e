use std::str::FromStr;

use serde::Deserialize;

/// Canonical task name type used throughout the crate.
pub type TaskName = String;

/// Fully-qualified object path, e.g. `s3://bucket/prefix/file.csv`.
pub type ObjectPath = String;

/// Identifier returned by the downstream workflow engine for a started run.
pub type ExecutionId = String;

/// Opaque, policy-owned state of a single task.
///
/// Nothing outside the owning policy interprets its contents.
pub type TriggerState = serde_json::Map<String, serde_json::Value>;

/// Where trigger state and upload records are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// JSON files under `[store].path`.
    File,
    /// Process memory only (lost on exit).
    Memory,
}

impl Default for StoreBackend {
    fn default() -> Self {
        StoreBackend::File
    }
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "file" => Ok(StoreBackend::File),
            "memory" => Ok(StoreBackend::Memory),
            other => Err(format!(
                "invalid store backend: {other} (expected \"file\" or \"memory\")"
            )),
        }
    }
}

/// How invocations reach the downstream workflow engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DispatchBackend {
    /// Only log the invocation and fabricate an execution id.
    Log,
    /// Run `[dispatch].command` once per invocation.
    Command,
}

impl Default for DispatchBackend {
    fn default() -> Self {
        DispatchBackend::Log
    }
}

impl FromStr for DispatchBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "log" => Ok(DispatchBackend::Log),
            "command" => Ok(DispatchBackend::Command),
            other => Err(format!(
                "invalid dispatch backend: {other} (expected \"log\" or \"command\")"
            )),
        }
    }
}
