use std::collections::BTreeMap;

use chrono::Duration;
use serde_json::{json, Map, Value};

use runtrigger::dispatch::UserTaskOverride;
use runtrigger::engine::{TaskList, TriggerEngine, UserRequest};
use runtrigger::errors::TriggerError;
use runtrigger::evaluation::TaskVerdict;
use runtrigger::policy::{EvalContext, PolicyError, PolicyRegistry, TriggerPolicy};
use runtrigger::store::{RunStateRecord, RunStateStore};
use runtrigger::types::TriggerState;
use runtrigger_test_utils::builders::{
    ConfigFileBuilder, TaskConfigBuilder, TEST_JOB_TARGET, TEST_SCOPE_KEY,
};
use runtrigger_test_utils::{init_tracing, t0, FileHarness, Harness, TEST_STORE_ROOT};

fn state(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => panic!("state must be an object"),
    }
}

fn request_tasks(tasks: &str) -> UserRequest {
    UserRequest {
        tasks: Some(TaskList::Csv(tasks.to_string())),
        ..UserRequest::default()
    }
}

fn verdict_of<'a>(resp: &'a runtrigger::engine::TriggerResponse, task: &str) -> &'a TaskVerdict {
    &resp
        .round
        .as_ref()
        .expect("round")
        .results
        .iter()
        .find(|r| r.task == task)
        .expect("task in round")
        .verdict
}

#[tokio::test]
async fn default_task_with_always_policy_dispatches_one_job() {
    init_tracing();

    let cfg = ConfigFileBuilder::new()
        .with_shared_requirement("s3://code/tools-1.0-py3-none-any.whl")
        .with_task(
            "version_info",
            TaskConfigBuilder::new()
                .default_run(true)
                .policy("always", json!({}))
                .requirement("pandas==2.2")
                .build(),
        )
        .build();
    let h = Harness::new(cfg);

    let resp = h.engine.handle_trigger(&UserRequest::default()).await.unwrap();

    assert_eq!(resp.selected, vec!["version_info"]);
    assert_eq!(resp.jobs.len(), 1);
    let job = &resp.jobs[0];
    assert_eq!(job.target, TEST_JOB_TARGET);
    assert!(job.name.starts_with("version_info-2024-01-01_12-00-00-"), "name was {}", job.name);
    assert!(job.name.len() <= 80);
    assert_eq!(job.parameters["task_name"], "version_info");
    assert_eq!(
        job.parameters["additional_python_modules"],
        "pandas==2.2,s3://code/tools-1.0-py3-none-any.whl"
    );
    assert_eq!(resp.execution_ids, vec!["exec-1".to_string()]);
    assert_eq!(h.workflows.attempts().len(), 1);

    let record = h.store.get(TEST_SCOPE_KEY).unwrap();
    assert_eq!(record.version, 1);
    assert_eq!(record.tasks["version_info"]["trigger_count"], 1);
    assert_eq!(record.tasks["version_info"]["last_triggered"], t0().to_rfc3339());
}

#[tokio::test]
async fn tasks_outside_the_evaluation_set_keep_their_state() {
    init_tracing();

    let cfg = ConfigFileBuilder::new()
        .with_task(
            "daily_report",
            TaskConfigBuilder::new().default_run(true).policy("always", json!({})).build(),
        )
        .with_task(
            "adhoc_export",
            TaskConfigBuilder::new().default_run(false).policy("always", json!({})).build(),
        )
        .build();
    let h = Harness::new(cfg);

    let adhoc_state = state(json!({"last_triggered": "2023-06-01T00:00:00+00:00", "custom": [1, 2, 3]}));
    let retired_state = state(json!({"anything": {"nested": true}}));
    let mut tasks = BTreeMap::new();
    tasks.insert("adhoc_export".to_string(), adhoc_state.clone());
    tasks.insert("retired_task".to_string(), retired_state.clone());
    h.store
        .put(&RunStateRecord {
            scope_key: TEST_SCOPE_KEY.to_string(),
            version: 1,
            tasks,
        })
        .unwrap();

    let resp = h.engine.handle_trigger(&UserRequest::default()).await.unwrap();
    assert_eq!(resp.selected, vec!["daily_report"]);

    let record = h.store.get(TEST_SCOPE_KEY).unwrap();
    assert_eq!(record.version, 2);
    assert_eq!(record.tasks["adhoc_export"], adhoc_state);
    assert_eq!(record.tasks["retired_task"], retired_state);
    assert!(record.tasks.contains_key("daily_report"));
}

#[tokio::test]
async fn unreadable_state_fails_closed_and_is_preserved() {
    init_tracing();

    let cfg = ConfigFileBuilder::new()
        .with_task(
            "hourly",
            TaskConfigBuilder::new()
                .default_run(true)
                .policy("interval", json!({"every_seconds": 3600}))
                .build(),
        )
        .build();
    let h = Harness::new(cfg);

    let broken = state(json!({"last_triggered": "not-a-timestamp"}));
    let mut tasks = BTreeMap::new();
    tasks.insert("hourly".to_string(), broken.clone());
    h.store
        .put(&RunStateRecord {
            scope_key: TEST_SCOPE_KEY.to_string(),
            version: 1,
            tasks,
        })
        .unwrap();

    let resp = h.engine.handle_trigger(&UserRequest::default()).await.unwrap();

    assert!(resp.selected.is_empty());
    assert!(matches!(verdict_of(&resp, "hourly"), TaskVerdict::Skipped(_)));
    assert!(h.workflows.attempts().is_empty());
    assert_eq!(h.store.get(TEST_SCOPE_KEY).unwrap().tasks["hourly"], broken);
}

fn always_firing_config() -> runtrigger::config::ConfigFile {
    ConfigFileBuilder::new()
        .with_task(
            "version_info",
            TaskConfigBuilder::new()
                .default_run(true)
                .policy("always", json!({}))
                .build(),
        )
        .build()
}

#[tokio::test]
async fn failed_commit_aborts_the_round_before_dispatch() {
    init_tracing();

    let h = FileHarness::new(always_firing_config());
    let prior = RunStateRecord {
        scope_key: TEST_SCOPE_KEY.to_string(),
        version: 3,
        tasks: BTreeMap::new(),
    };
    h.store.put(&prior).unwrap();
    h.fs.set_fail_writes(true);

    let err = h.engine.handle_trigger(&UserRequest::default()).await.unwrap_err();

    assert!(matches!(err, TriggerError::StorageError(_)), "{err}");
    assert!(h.workflows.attempts().is_empty());
    assert_eq!(h.store.get(TEST_SCOPE_KEY).unwrap(), prior);
}

#[tokio::test]
async fn unreadable_run_state_aborts_the_round_before_dispatch() {
    init_tracing();

    let h = FileHarness::new(always_firing_config());
    let path = format!("{TEST_STORE_ROOT}/run-state/{TEST_SCOPE_KEY}.json");
    h.fs.add_file(&path, "{ truncated");

    let err = h.engine.handle_trigger(&UserRequest::default()).await.unwrap_err();

    assert!(matches!(err, TriggerError::StorageError(_)), "{err}");
    assert!(h.workflows.attempts().is_empty());
    assert_eq!(h.fs.file_paths(), vec![std::path::PathBuf::from(&path)]);
    assert!(matches!(h.store.get(TEST_SCOPE_KEY).unwrap_err(), TriggerError::StorageError(_)));
}

#[tokio::test]
async fn misconfigured_policies_skip_only_their_task() {
    init_tracing();

    let cfg = ConfigFileBuilder::new()
        .with_task(
            "unknown_policy",
            TaskConfigBuilder::new().default_run(true).policy("fortnightly", json!({})).build(),
        )
        .with_task("no_policy", TaskConfigBuilder::new().default_run(true).build())
        .with_task(
            "bad_params",
            TaskConfigBuilder::new()
                .default_run(true)
                .policy("interval", json!({"every_seconds": 0}))
                .build(),
        )
        .with_task(
            "healthy",
            TaskConfigBuilder::new().default_run(true).policy("always", json!({})).build(),
        )
        .build();
    let h = Harness::new(cfg);

    let resp = h.engine.handle_trigger(&UserRequest::default()).await.unwrap();

    assert_eq!(resp.selected, vec!["healthy"]);
    match verdict_of(&resp, "unknown_policy") {
        TaskVerdict::Skipped(reason) => assert!(reason.contains("fortnightly"), "{reason}"),
        other => panic!("unexpected verdict {other:?}"),
    }
    assert!(matches!(verdict_of(&resp, "no_policy"), TaskVerdict::Skipped(_)));
    assert!(matches!(verdict_of(&resp, "bad_params"), TaskVerdict::Skipped(_)));
    assert_eq!(verdict_of(&resp, "healthy"), &TaskVerdict::Fired);

    let record = h.store.get(TEST_SCOPE_KEY).unwrap();
    assert_eq!(record.tasks.keys().collect::<Vec<_>>(), vec!["healthy"]);
}

#[tokio::test]
async fn without_state_update_fired_tasks_are_dispatched_but_not_advanced() {
    init_tracing();

    let cfg = ConfigFileBuilder::new()
        .with_task(
            "once_only",
            TaskConfigBuilder::new().default_run(true).policy("once", json!({})).build(),
        )
        .build();
    let h = Harness::new(cfg);

    let req = UserRequest {
        update_run_db: false,
        ..UserRequest::default()
    };
    let first = h.engine.handle_trigger(&req).await.unwrap();
    let second = h.engine.handle_trigger(&req).await.unwrap();

    assert_eq!(first.selected, vec!["once_only"]);
    assert_eq!(second.selected, vec!["once_only"]);

    let record = h.store.get(TEST_SCOPE_KEY).unwrap();
    assert_eq!(record.version, 2, "every round commits");
    assert!(record.tasks.is_empty());

    // With state updates the policy only fires once.
    let third = h.engine.handle_trigger(&UserRequest::default()).await.unwrap();
    let fourth = h.engine.handle_trigger(&UserRequest::default()).await.unwrap();
    assert_eq!(third.selected, vec!["once_only"]);
    assert!(fourth.selected.is_empty());
    assert_eq!(verdict_of(&fourth, "once_only"), &TaskVerdict::NotFired);
}

#[tokio::test]
async fn interval_policy_fires_again_after_the_interval() {
    init_tracing();

    let cfg = ConfigFileBuilder::new()
        .with_task(
            "hourly",
            TaskConfigBuilder::new()
                .default_run(true)
                .policy("interval", json!({"every_seconds": 3600}))
                .build(),
        )
        .build();
    let h = Harness::new(cfg);

    assert_eq!(h.engine.handle_trigger(&UserRequest::default()).await.unwrap().selected, vec!["hourly"]);

    h.clock.advance(Duration::minutes(30));
    assert!(h.engine.handle_trigger(&UserRequest::default()).await.unwrap().selected.is_empty());

    h.clock.advance(Duration::minutes(30));
    assert_eq!(h.engine.handle_trigger(&UserRequest::default()).await.unwrap().selected, vec!["hourly"]);

    let record = h.store.get(TEST_SCOPE_KEY).unwrap();
    assert_eq!(record.version, 3);
    assert_eq!(record.tasks["hourly"]["trigger_count"], 2);
}

#[tokio::test]
async fn requesting_a_task_that_is_not_allowed_is_a_configuration_error() {
    init_tracing();

    let cfg = ConfigFileBuilder::new()
        .with_task("x", TaskConfigBuilder::new().policy("always", json!({})).build())
        .with_task("y", TaskConfigBuilder::new().policy("always", json!({})).build())
        .build();
    let h = Harness::new(cfg);

    let err = h.engine.handle_trigger(&request_tasks("z")).await.unwrap_err();

    assert!(matches!(err, TriggerError::ConfigError(ref msg) if msg.contains('z')), "{err}");
    assert!(h.workflows.attempts().is_empty());
    assert_eq!(h.store.get(TEST_SCOPE_KEY).unwrap().version, 0);
}

#[tokio::test]
async fn requested_tasks_skip_schedule_checks_by_default() {
    init_tracing();

    let cfg = ConfigFileBuilder::new()
        .with_task("manual", TaskConfigBuilder::new().policy("never", json!({})).build())
        .with_task(
            "scheduled",
            TaskConfigBuilder::new().default_run(true).policy("always", json!({})).build(),
        )
        .build();
    let h = Harness::new(cfg);

    let resp = h.engine.handle_trigger(&request_tasks("manual")).await.unwrap();

    assert!(resp.round.is_none());
    assert_eq!(resp.selected, vec!["manual"]);
    assert_eq!(h.store.get(TEST_SCOPE_KEY).unwrap().version, 0);
}

#[tokio::test]
async fn requested_tasks_are_evaluated_when_schedule_check_is_forced() {
    init_tracing();

    let cfg = ConfigFileBuilder::new()
        .with_task("manual", TaskConfigBuilder::new().policy("never", json!({})).build())
        .with_task("requested", TaskConfigBuilder::new().policy("always", json!({})).build())
        .with_task(
            "scheduled",
            TaskConfigBuilder::new().default_run(true).policy("always", json!({})).build(),
        )
        .build();
    let h = Harness::new(cfg);

    let req = UserRequest {
        check_schedule: Some(true),
        ..request_tasks("manual, requested")
    };
    let resp = h.engine.handle_trigger(&req).await.unwrap();

    // Only the requested candidates take part; `scheduled` is not a candidate.
    assert_eq!(resp.selected, vec!["requested"]);
    assert_eq!(verdict_of(&resp, "manual"), &TaskVerdict::NotFired);
    assert_eq!(resp.round.as_ref().unwrap().results.len(), 2);
}

#[tokio::test]
async fn scope_and_account_filters_apply() {
    init_tracing();

    let cfg = ConfigFileBuilder::new()
        .with_scope("br", "dev")
        .with_task(
            "other_scope",
            TaskConfigBuilder::new()
                .default_run(true)
                .scopes(&["us"])
                .policy("always", json!({}))
                .build(),
        )
        .with_task(
            "prod_only",
            TaskConfigBuilder::new()
                .default_run(true)
                .accounts(&["prod"])
                .policy("always", json!({}))
                .build(),
        )
        .with_task(
            "everywhere",
            TaskConfigBuilder::new()
                .default_run(true)
                .scopes(&["br", "us"])
                .accounts(&["dev", "prod"])
                .policy("always", json!({}))
                .build(),
        )
        .build();
    let h = Harness::new(cfg);

    let resp = h.engine.handle_trigger(&UserRequest::default()).await.unwrap();

    assert_eq!(resp.selected, vec!["everywhere"]);
    assert_eq!(resp.round.unwrap().results.len(), 1);
}

#[tokio::test]
async fn user_overrides_replace_defaults_only_when_non_empty() {
    init_tracing();

    let cfg = ConfigFileBuilder::new()
        .with_task_env("STAGE", "dev")
        .with_task(
            "export",
            TaskConfigBuilder::new()
                .policy("always", json!({}))
                .argument(json!("--full"))
                .env("STAGE", "local")
                .env("LEVEL", "1")
                .kwarg("limit", json!(10))
                .build(),
        )
        .build();
    let h = Harness::new(cfg);

    let mut settings = BTreeMap::new();
    settings.insert(
        "export".to_string(),
        UserTaskOverride {
            arguments: Some(vec![json!("--since"), json!("2024-01-01")]),
            environment: Some(BTreeMap::new()),
            kwargs: None,
        },
    );
    let req = UserRequest {
        settings: Some(settings),
        ..UserRequest::default()
    };

    let resp = h.engine.handle_trigger(&req).await.unwrap();

    assert_eq!(resp.selected, vec!["export"]);
    let params = &resp.jobs[0].parameters;
    assert_eq!(params["arguments"], json!(["--since", "2024-01-01"]));
    // Empty override falls back to the default, then task_env is layered on top.
    assert_eq!(params["environment"], json!({"LEVEL": "1", "STAGE": "dev"}));
    assert_eq!(params["kwargs"], json!({"limit": 10}));
    assert_eq!(params["entry_point"], "script.py");
}

#[tokio::test]
async fn dry_run_never_advances_state() {
    init_tracing();

    let cfg = ConfigFileBuilder::new()
        .with_task(
            "once_only",
            TaskConfigBuilder::new().default_run(true).policy("once", json!({})).build(),
        )
        .build();
    let h = Harness::dry_run(cfg);

    let first = h.engine.handle_trigger(&UserRequest::default()).await.unwrap();
    let second = h.engine.handle_trigger(&UserRequest::default()).await.unwrap();

    assert_eq!(first.selected, vec!["once_only"]);
    assert_eq!(second.selected, vec!["once_only"]);
    assert!(h.store.get(TEST_SCOPE_KEY).unwrap().tasks.is_empty());
}

/// Fires every round and counts its own runs under `runs`.
#[derive(Debug)]
struct RunCounter;

impl TriggerPolicy for RunCounter {
    fn name(&self) -> &str {
        "run_counter"
    }

    fn evaluate(&self, _state: &TriggerState, _ctx: &EvalContext<'_>) -> Result<bool, PolicyError> {
        Ok(true)
    }

    fn advance(&self, mut state: TriggerState, _ctx: &EvalContext<'_>) -> Result<TriggerState, PolicyError> {
        let runs = state.get("runs").and_then(Value::as_u64).unwrap_or(0);
        state.insert("runs".to_string(), json!(runs + 1));
        Ok(state)
    }
}

fn run_counter(_params: &Map<String, Value>) -> Result<Box<dyn TriggerPolicy>, PolicyError> {
    Ok(Box::new(RunCounter))
}

#[tokio::test]
async fn deployment_policies_can_be_added_to_the_engine() {
    init_tracing();

    let cfg = ConfigFileBuilder::new()
        .with_task(
            "counted",
            TaskConfigBuilder::new()
                .default_run(true)
                .policy("run_counter", json!({}))
                .build(),
        )
        .build();
    let h = Harness::new(cfg);

    let mut registry = PolicyRegistry::with_builtins();
    registry.register("run_counter", run_counter);
    let engine = TriggerEngine::new(h.engine.context().clone().with_policies(registry));

    engine.handle_trigger(&UserRequest::default()).await.unwrap();
    let resp = engine.handle_trigger(&UserRequest::default()).await.unwrap();

    assert_eq!(resp.selected, vec!["counted"]);
    assert_eq!(h.workflows.attempts().len(), 2);
    let record = h.store.get(TEST_SCOPE_KEY).unwrap();
    assert_eq!(record.version, 2);
    assert_eq!(record.tasks["counted"]["runs"], 2);

    // The original engine still only knows the built-ins.
    let resp = h.engine.handle_trigger(&UserRequest::default()).await.unwrap();
    assert!(matches!(verdict_of(&resp, "counted"), TaskVerdict::Skipped(_)));
}
