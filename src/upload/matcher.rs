// src/upload/matcher.rs

use chrono::{DateTime, Utc};
use globset::{GlobBuilder, GlobMatcher};
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::config::model::UploadTriggerRule;
use crate::dispatch::{workflow_descriptor, InvocationDescriptor};
use crate::errors::{Result, TriggerError};
use crate::types::ObjectPath;
use crate::upload::template::{
    substitute_placeholders, CHECK_ONLY_WORKFLOWS, MATCHING_PATH_LIST, UPLOAD_BATCH_ID, UPLOAD_PATH_LIST,
};

const SNOWFLAKE_DIR: &str = "/snowflake/";
const SNOWFLAKE_MARKER: &str = "last_query_id.parquet";

/// Intermediate data file of a warehouse export. The completion marker of
/// an export is not one.
pub fn is_snowflake_data_file(path: &str) -> bool {
    path.contains(SNOWFLAKE_DIR) && !path.ends_with(SNOWFLAKE_MARKER)
}

/// Compile a shell-style selector. `*` matches across `/` and `\` is a
/// literal character.
pub fn compile_selector(selector: &str) -> std::result::Result<GlobMatcher, globset::Error> {
    GlobBuilder::new(selector)
        .literal_separator(false)
        .backslash_escape(false)
        .build()
        .map(|g| g.compile_matcher())
}

#[derive(Debug, Clone)]
struct CompiledRule {
    rule: UploadTriggerRule,
    selector: GlobMatcher,
}

impl CompiledRule {
    fn matching_paths(&self, paths: &[ObjectPath]) -> Vec<ObjectPath> {
        paths
            .iter()
            .filter(|p| self.selector.is_match(p.as_str()))
            .filter(|p| !(self.rule.ignore_snowflake_data_files && is_snowflake_data_file(p)))
            .cloned()
            .collect()
    }
}

/// Workflows a settled batch starts.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MatchedInvocations {
    /// Invocations to dispatch, with the check-only list spliced in.
    pub dispatch: Vec<InvocationDescriptor>,
    /// Resolved check-only rules; never dispatched.
    pub check_only: Vec<InvocationDescriptor>,
}

/// Matches settled upload paths against the configured upload triggers.
#[derive(Debug, Clone)]
pub struct TriggerMatcher {
    rules: Vec<CompiledRule>,
}

impl TriggerMatcher {
    pub fn new(rules: &[UploadTriggerRule]) -> Result<Self> {
        let rules = rules
            .iter()
            .map(|rule| {
                let selector = compile_selector(&rule.file_selector).map_err(|e| {
                    TriggerError::ConfigError(format!("invalid file_selector '{}': {e}", rule.file_selector))
                })?;
                Ok(CompiledRule {
                    selector,
                    rule: rule.clone(),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { rules })
    }

    /// Paths of `paths` that the rule at `index` selects.
    pub fn matching_paths(&self, index: usize, paths: &[ObjectPath]) -> Vec<ObjectPath> {
        self.rules
            .get(index)
            .map(|r| r.matching_paths(paths))
            .unwrap_or_default()
    }

    /// Resolve every rule with at least one matching path.
    ///
    /// Placeholders see `matching_path_list`, `upload_path_list` and, if
    /// given, `upload_batch_id`. Dispatchable invocations are then resolved a
    /// second time against `check_only_workflows`.
    pub fn invocations(
        &self,
        paths: &[ObjectPath],
        batch_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<MatchedInvocations> {
        let mut matched = MatchedInvocations::default();

        for compiled in &self.rules {
            let matching = compiled.matching_paths(paths);
            if matching.is_empty() {
                debug!(selector = %compiled.rule.file_selector, "no matching uploads");
                continue;
            }

            let mut context = Map::new();
            context.insert(MATCHING_PATH_LIST.to_string(), Value::from(matching.clone()));
            context.insert(UPLOAD_PATH_LIST.to_string(), Value::from(paths.to_vec()));
            if let Some(id) = batch_id {
                context.insert(UPLOAD_BATCH_ID.to_string(), Value::from(id));
            }

            let parameters = substitute_placeholders(&compiled.rule.workflow.parameters, &context);
            let descriptor = workflow_descriptor(&compiled.rule.workflow, parameters, now);
            info!(
                selector = %compiled.rule.file_selector,
                matches = matching.len(),
                name = %descriptor.name,
                check_only = compiled.rule.check_only,
                "upload trigger matched"
            );

            if compiled.rule.check_only {
                matched.check_only.push(descriptor);
            } else {
                matched.dispatch.push(descriptor);
            }
        }

        let mut splice = Map::new();
        splice.insert(
            CHECK_ONLY_WORKFLOWS.to_string(),
            serde_json::to_value(&matched.check_only)?,
        );
        for descriptor in &mut matched.dispatch {
            descriptor.parameters = substitute_placeholders(&descriptor.parameters, &splice);
        }

        Ok(matched)
    }
}
