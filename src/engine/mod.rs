// src/engine/mod.rs

//! Request handling for runtrigger.
//!
//! - [`request`]: request types and routing of raw JSON events.
//! - [`context`]: the explicit [`EngineContext`] every handler receives.
//! - [`core`]: the handlers themselves.
//! - [`clock`]: injectable time source.

pub mod clock;
pub mod context;
pub mod core;
pub mod request;

pub use clock::{Clock, FixedClock, SystemClock};
pub use context::EngineContext;
pub use self::core::{DrainResponse, DrainStatus, Response, TriggerEngine, TriggerResponse};
pub use request::{Request, TaskList, UserRequest};
