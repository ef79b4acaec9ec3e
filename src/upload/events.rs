// src/upload/events.rs

//! Upload notification parsing.
//!
//! Accepts object-storage event notifications either directly
//! (`Records[].s3.bucket.name` / `Records[].s3.object.key`) or wrapped in a
//! pub/sub envelope whose `Records[].Sns.Message` is the JSON-encoded event.

use serde_json::Value;
use tracing::debug;

use crate::errors::{Result, TriggerError};
use crate::types::ObjectPath;

/// Extract `s3://<bucket>/<key>` paths from a notification, in order.
///
/// Records without a bucket or key are ignored; a missing `Records` array or
/// an unparseable envelope message is an invalid request.
pub fn upload_paths_from_event(event: &Value) -> Result<Vec<ObjectPath>> {
    let records = event
        .get("Records")
        .and_then(Value::as_array)
        .ok_or_else(|| TriggerError::InvalidRequest("event has no 'Records' array".to_string()))?;

    let mut paths = Vec::new();
    for record in records {
        if let Some(message) = record.get("Sns").and_then(|sns| sns.get("Message")) {
            let inner = envelope_message(message)?;
            paths.extend(upload_paths_from_event(&inner)?);
            continue;
        }
        match s3_path(record) {
            Some(path) => paths.push(path),
            None => debug!(?record, "record without bucket/key ignored"),
        }
    }
    Ok(paths)
}

fn envelope_message(message: &Value) -> Result<Value> {
    match message {
        Value::String(raw) => serde_json::from_str(raw)
            .map_err(|e| TriggerError::InvalidRequest(format!("invalid notification message: {e}"))),
        Value::Object(_) => Ok(message.clone()),
        other => Err(TriggerError::InvalidRequest(format!(
            "invalid notification message: {other}"
        ))),
    }
}

fn s3_path(record: &Value) -> Option<ObjectPath> {
    let s3 = record.get("s3")?;
    let bucket = s3.get("bucket")?.get("name")?.as_str()?;
    let key = s3.get("object")?.get("key")?.as_str()?;
    if bucket.is_empty() || key.is_empty() {
        return None;
    }
    Some(format!("s3://{bucket}/{key}"))
}
