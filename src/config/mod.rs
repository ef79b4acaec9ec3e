// src/config/mod.rs

//! Configuration loading and validation for runtrigger.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a config file from disk (`loader.rs`).
//! - Validate it before anything else sees it (`validate.rs`).
//! - Resolve per-task configuration by name (`tasks.rs`).

pub mod loader;
pub mod model;
pub mod tasks;
pub mod validate;

pub use loader::{default_config_path, load_and_validate, load_from_path};
pub use model::{
    ConfigFile, DispatchSection, EngineSection, FrequencySpec, RawConfigFile,
    ScheduledTriggerConfig, StoreSection, TaskConfig, TaskRunConfig, UploadSection,
    UploadTriggerRule, WorkflowTemplate,
};
pub use tasks::{DirTaskConfigs, InlineTaskConfigs, LayeredTaskConfigs, TaskConfigLoader};
