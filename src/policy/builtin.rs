// src/policy/builtin.rs

//! Built-in frequency policies.
//!
//! All of them keep the same two keys in the task's state:
//! - `last_triggered`: RFC 3339 timestamp of the last committed firing.
//! - `trigger_count`: number of committed firings.

use chrono::{DateTime, Duration, NaiveTime, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::policy::{EvalContext, PolicyError, TriggerPolicy};
use crate::types::TriggerState;

pub const ALWAYS: &str = "always";
pub const NEVER: &str = "never";
pub const ONCE: &str = "once";
pub const INTERVAL: &str = "interval";
pub const DAILY: &str = "daily";

pub const LAST_TRIGGERED_KEY: &str = "last_triggered";
pub const TRIGGER_COUNT_KEY: &str = "trigger_count";

fn parse_params<T: DeserializeOwned>(policy: &str, params: &Map<String, Value>) -> Result<T, PolicyError> {
    serde_json::from_value(Value::Object(params.clone())).map_err(|e| PolicyError::InvalidParams {
        policy: policy.to_string(),
        reason: e.to_string(),
    })
}

/// Read `last_triggered`; a present but unreadable value is an evaluation
/// error so the task fails closed.
fn last_triggered(policy: &str, state: &TriggerState) -> Result<Option<DateTime<Utc>>, PolicyError> {
    match state.get(LAST_TRIGGERED_KEY) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => DateTime::parse_from_rfc3339(s)
            .map(|t| Some(t.with_timezone(&Utc)))
            .map_err(|e| PolicyError::Evaluation {
                policy: policy.to_string(),
                reason: format!("invalid {LAST_TRIGGERED_KEY} '{s}': {e}"),
            }),
        Some(other) => Err(PolicyError::Evaluation {
            policy: policy.to_string(),
            reason: format!("invalid {LAST_TRIGGERED_KEY}: {other}"),
        }),
    }
}

/// Stamp a committed firing into the state.
fn record_firing(mut state: TriggerState, now: DateTime<Utc>) -> TriggerState {
    let count = state
        .get(TRIGGER_COUNT_KEY)
        .and_then(Value::as_u64)
        .unwrap_or(0);
    state.insert(LAST_TRIGGERED_KEY.to_string(), Value::String(now.to_rfc3339()));
    state.insert(TRIGGER_COUNT_KEY.to_string(), Value::from(count + 1));
    state
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct NoParams {}

/// Fires on every round.
#[derive(Debug)]
pub struct Always;

impl TriggerPolicy for Always {
    fn name(&self) -> &str {
        ALWAYS
    }

    fn evaluate(&self, _state: &TriggerState, _ctx: &EvalContext<'_>) -> Result<bool, PolicyError> {
        Ok(true)
    }

    fn advance(&self, state: TriggerState, ctx: &EvalContext<'_>) -> Result<TriggerState, PolicyError> {
        Ok(record_firing(state, ctx.now))
    }
}

pub fn always(params: &Map<String, Value>) -> Result<Box<dyn TriggerPolicy>, PolicyError> {
    parse_params::<NoParams>(ALWAYS, params)?;
    Ok(Box::new(Always))
}

/// Never fires; the task only runs when requested with schedule checks off.
#[derive(Debug)]
pub struct Never;

impl TriggerPolicy for Never {
    fn name(&self) -> &str {
        NEVER
    }

    fn evaluate(&self, _state: &TriggerState, _ctx: &EvalContext<'_>) -> Result<bool, PolicyError> {
        Ok(false)
    }

    fn advance(&self, state: TriggerState, _ctx: &EvalContext<'_>) -> Result<TriggerState, PolicyError> {
        Ok(state)
    }
}

pub fn never(params: &Map<String, Value>) -> Result<Box<dyn TriggerPolicy>, PolicyError> {
    parse_params::<NoParams>(NEVER, params)?;
    Ok(Box::new(Never))
}

/// Fires until the first committed firing.
#[derive(Debug)]
pub struct Once;

impl TriggerPolicy for Once {
    fn name(&self) -> &str {
        ONCE
    }

    fn evaluate(&self, state: &TriggerState, _ctx: &EvalContext<'_>) -> Result<bool, PolicyError> {
        Ok(last_triggered(ONCE, state)?.is_none())
    }

    fn advance(&self, state: TriggerState, ctx: &EvalContext<'_>) -> Result<TriggerState, PolicyError> {
        Ok(record_firing(state, ctx.now))
    }
}

pub fn once(params: &Map<String, Value>) -> Result<Box<dyn TriggerPolicy>, PolicyError> {
    parse_params::<NoParams>(ONCE, params)?;
    Ok(Box::new(Once))
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct IntervalParams {
    every_seconds: u64,
}

/// Fires when at least `every` has passed since the last committed firing.
#[derive(Debug)]
pub struct Interval {
    every: Duration,
}

impl TriggerPolicy for Interval {
    fn name(&self) -> &str {
        INTERVAL
    }

    fn evaluate(&self, state: &TriggerState, ctx: &EvalContext<'_>) -> Result<bool, PolicyError> {
        Ok(match last_triggered(INTERVAL, state)? {
            None => true,
            Some(last) => ctx.now - last >= self.every,
        })
    }

    fn advance(&self, state: TriggerState, ctx: &EvalContext<'_>) -> Result<TriggerState, PolicyError> {
        Ok(record_firing(state, ctx.now))
    }
}

pub fn interval(params: &Map<String, Value>) -> Result<Box<dyn TriggerPolicy>, PolicyError> {
    let p: IntervalParams = parse_params(INTERVAL, params)?;
    let seconds = i64::try_from(p.every_seconds).ok().filter(|s| *s > 0);
    let every = seconds
        .and_then(Duration::try_seconds)
        .ok_or_else(|| PolicyError::InvalidParams {
            policy: INTERVAL.to_string(),
            reason: format!("every_seconds out of range (got {})", p.every_seconds),
        })?;
    Ok(Box::new(Interval { every }))
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct DailyParams {
    hour: u32,
    #[serde(default)]
    minute: u32,
}

/// Fires once per UTC day, on the first round at or after `at`.
#[derive(Debug)]
pub struct Daily {
    at: NaiveTime,
}

impl TriggerPolicy for Daily {
    fn name(&self) -> &str {
        DAILY
    }

    fn evaluate(&self, state: &TriggerState, ctx: &EvalContext<'_>) -> Result<bool, PolicyError> {
        let slot = ctx.now.date_naive().and_time(self.at).and_utc();
        if ctx.now < slot {
            return Ok(false);
        }
        Ok(match last_triggered(DAILY, state)? {
            None => true,
            Some(last) => last < slot,
        })
    }

    fn advance(&self, state: TriggerState, ctx: &EvalContext<'_>) -> Result<TriggerState, PolicyError> {
        Ok(record_firing(state, ctx.now))
    }
}

pub fn daily(params: &Map<String, Value>) -> Result<Box<dyn TriggerPolicy>, PolicyError> {
    let p: DailyParams = parse_params(DAILY, params)?;
    let at = NaiveTime::from_hms_opt(p.hour, p.minute, 0).ok_or_else(|| PolicyError::InvalidParams {
        policy: DAILY.to_string(),
        reason: format!("invalid time of day {:02}:{:02}", p.hour, p.minute),
    })?;
    Ok(Box::new(Daily { at }))
}
