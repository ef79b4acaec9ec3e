// src/upload/template.rs

//! Parameter placeholders.
//!
//! A top-level key ending in `.$` whose value is the string `$.<name>` is
//! replaced by the key without the suffix, holding the context value bound
//! to `<name>`:
//!
//! ```text
//! {"paths.$": "$.matching_path_list"}  =>  {"paths": ["s3://b/k1", "s3://b/k2"]}
//! ```
//!
//! Placeholders whose name is not in the context are left as they are, so a
//! later pass with a different context can still resolve them. Only the top
//! level is inspected.

use serde_json::{Map, Value};

pub const MATCHING_PATH_LIST: &str = "matching_path_list";
pub const UPLOAD_PATH_LIST: &str = "upload_path_list";
pub const UPLOAD_BATCH_ID: &str = "upload_batch_id";
pub const CHECK_ONLY_WORKFLOWS: &str = "check_only_workflows";

const PLACEHOLDER_SUFFIX: &str = ".$";
const CONTEXT_PREFIX: &str = "$.";

/// Return `parameters` with every resolvable placeholder substituted.
/// Non-object parameters are returned unchanged.
pub fn substitute_placeholders(parameters: &Value, context: &Map<String, Value>) -> Value {
    let Value::Object(params) = parameters else {
        return parameters.clone();
    };

    let mut result = Map::with_capacity(params.len());
    for (key, value) in params {
        match resolve(key, value, context) {
            Some((plain_key, bound)) => {
                result.insert(plain_key.to_string(), bound.clone());
            }
            None => {
                // A resolved placeholder wins over a literal key of the same name.
                if !result.contains_key(key) {
                    result.insert(key.clone(), value.clone());
                }
            }
        }
    }
    Value::Object(result)
}

fn resolve<'a, 'k>(key: &'k str, value: &Value, context: &'a Map<String, Value>) -> Option<(&'k str, &'a Value)> {
    let plain_key = key.strip_suffix(PLACEHOLDER_SUFFIX)?;
    let name = value.as_str()?.strip_prefix(CONTEXT_PREFIX)?;
    context.get(name).map(|bound| (plain_key, bound))
}
