// src/upload/mod.rs

//! Event-driven path: upload notifications are recorded, debounced and
//! matched against the configured upload triggers.
//!
//! - [`events`]: notification payload → object paths.
//! - [`accumulator`]: durable record/drain/clear with a quiescence window.
//! - [`matcher`]: selector + snowflake filtering, check-only splicing.
//! - [`template`]: `.$` placeholder substitution.

pub mod accumulator;
pub mod events;
pub mod matcher;
pub mod template;

pub use accumulator::{batch_fingerprint, DrainOutcome, SettledBatch, UploadAccumulator};
pub use events::upload_paths_from_event;
pub use matcher::{is_snowflake_data_file, MatchedInvocations, TriggerMatcher};
pub use template::substitute_placeholders;
