use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use tempfile::tempdir;

use runtrigger::config::load_and_validate;
use runtrigger::config::tasks::{DirTaskConfigs, InlineTaskConfigs, LayeredTaskConfigs, TaskConfigLoader};
use runtrigger::errors::TriggerError;
use runtrigger::fs::mock::MockFileSystem;
use runtrigger::fs::RealFileSystem;
use runtrigger::types::{DispatchBackend, StoreBackend};
use runtrigger_test_utils::builders::{ConfigFileBuilder, TaskConfigBuilder};

const FULL_CONFIG: &str = r#"
[engine]
scope = "br"
account_name = "dev"
run_scope_key = "cdp-dev-br"
shared_requirement = "s3://code/tools-1.0-py3-none-any.whl"
job_target = "custom-data-processing"
task_config_dir = "tasks"
task_env = { STAGE = "dev" }

[store]
path = "state"

[dispatch]
backend = "command"
command = "echo started"
timeout_seconds = 10

[upload]
window_seconds = 120

[[upload.trigger]]
file_selector = "s3://input/sales/*"
[upload.trigger.workflow]
target = "arn:ingest"
parameters = { "paths.$" = "$.matching_path_list" }

[[scheduled_trigger]]
schedule_expression = "rate(1 day)"
[scheduled_trigger.workflow]
name = "nightly-{timestamp}"
target = "arn:nightly"

[task.version_info.run]
default = true
frequency = { policy = "interval", every_seconds = 3600 }

[task.export]
requirements = ["pyarrow"]
"#;

fn write_config(contents: &str) -> (tempfile::TempDir, PathBuf) {
    let dir = tempdir().unwrap();
    let path = dir.path().join("Runtrigger.toml");
    fs::write(&path, contents).unwrap();
    (dir, path)
}

#[test]
fn full_config_loads_with_paths_relative_to_the_file() {
    let (dir, path) = write_config(FULL_CONFIG);

    let cfg = load_and_validate(&path).unwrap();

    assert_eq!(cfg.engine().run_scope_key, "cdp-dev-br");
    assert_eq!(cfg.engine().name_template, "{task}-{timestamp}-{uuid}");
    assert_eq!(cfg.engine().task_config_dir.as_deref(), Some(dir.path().join("tasks").as_path()));
    assert_eq!(cfg.store().backend, StoreBackend::File);
    assert_eq!(cfg.store().path, dir.path().join("state"));
    assert_eq!(cfg.dispatch().backend, DispatchBackend::Command);
    assert_eq!(cfg.dispatch().timeout_seconds, 10);
    assert_eq!(cfg.upload().window_seconds, 120);
    assert!(cfg.upload().trigger[0].ignore_snowflake_data_files);
    assert!(!cfg.upload().trigger[0].check_only);
    assert_eq!(cfg.scheduled_triggers().len(), 1);

    // allowed_tasks defaults to the inline task names.
    assert_eq!(cfg.allowed_tasks(), ["export".to_string(), "version_info".to_string()]);

    let version_info = &cfg.tasks()["version_info"];
    assert!(version_info.run.default);
    assert_eq!(version_info.run.frequency.policy.as_deref(), Some("interval"));
    assert_eq!(version_info.run.frequency.params["every_seconds"], 3600);
    assert_eq!(cfg.tasks()["export"].requirements, vec!["pyarrow"]);
}

#[test]
fn minimal_config_uses_defaults() {
    let (_dir, path) = write_config(
        r#"
[engine]
scope = "br"
account_name = "dev"
run_scope_key = "k"
job_target = "job"
"#,
    );

    let cfg = load_and_validate(&path).unwrap();
    assert_eq!(cfg.dispatch().backend, DispatchBackend::Log);
    assert_eq!(cfg.dispatch().timeout_seconds, 30);
    assert_eq!(cfg.upload().window_seconds, 300);
    assert!(cfg.allowed_tasks().is_empty());
}

#[test]
fn invalid_configs_are_rejected() {
    let cases = [
        (
            "command backend without command",
            "[engine]\nscope='s'\naccount_name='a'\nrun_scope_key='k'\njob_target='j'\n[dispatch]\nbackend='command'\n",
            "command",
        ),
        (
            "zero timeout",
            "[engine]\nscope='s'\naccount_name='a'\nrun_scope_key='k'\njob_target='j'\n[dispatch]\ntimeout_seconds=0\n",
            "timeout_seconds",
        ),
        (
            "bad task name",
            "[engine]\nscope='s'\naccount_name='a'\nrun_scope_key='k'\njob_target='j'\n[task.'bad name']\n",
            "bad name",
        ),
        (
            "bad selector",
            "[engine]\nscope='s'\naccount_name='a'\nrun_scope_key='k'\njob_target='j'\n[[upload.trigger]]\nfile_selector='s3://x/[a'\nworkflow={target='t'}\n",
            "file_selector",
        ),
        (
            "non-object parameters",
            "[engine]\nscope='s'\naccount_name='a'\nrun_scope_key='k'\njob_target='j'\n[[scheduled_trigger]]\nschedule_expression='e'\nworkflow={target='t', parameters=[1]}\n",
            "parameters",
        ),
        (
            "empty run scope key",
            "[engine]\nscope='s'\naccount_name='a'\nrun_scope_key=' '\njob_target='j'\n",
            "run_scope_key",
        ),
    ];

    for (label, toml, needle) in cases {
        let (_dir, path) = write_config(toml);
        let err = load_and_validate(&path).unwrap_err();
        assert!(matches!(err, TriggerError::ConfigError(_)), "{label}: {err}");
        assert!(err.to_string().contains(needle), "{label}: {err}");
    }
}

#[test]
fn unknown_keys_are_a_parse_error() {
    let (_dir, path) = write_config(
        "[engine]\nscope='s'\naccount_name='a'\nrun_scope_key='k'\njob_target='j'\nqueue_length=3\n",
    );
    assert!(matches!(load_and_validate(&path).unwrap_err(), TriggerError::TomlError(_)));
}

#[test]
fn task_config_directory_is_consulted_after_inline_tasks() {
    let dir = tempdir().unwrap();
    fs::write(
        dir.path().join("from_dir.json"),
        r#"{"requirements": ["numpy"], "entry_point": "main.py", "run": {"default": true}}"#,
    )
    .unwrap();
    fs::write(dir.path().join("shadowed.json"), r#"{"requirements": ["from-dir"]}"#).unwrap();
    fs::write(dir.path().join("broken.json"), "{not json").unwrap();

    let cfg = ConfigFileBuilder::new()
        .with_task("shadowed", TaskConfigBuilder::new().requirement("inline").build())
        .build();
    let loader = LayeredTaskConfigs::new()
        .with_layer(InlineTaskConfigs::new(cfg.tasks().clone()))
        .with_layer(DirTaskConfigs::new(dir.path(), Arc::new(RealFileSystem)));

    let from_dir = loader.load("from_dir").unwrap();
    assert_eq!(from_dir.requirements, vec!["numpy"]);
    assert_eq!(from_dir.entry_point, "main.py");
    assert_eq!(from_dir.cwd, ".");
    assert!(from_dir.run.default);

    assert_eq!(loader.load("shadowed").unwrap().requirements, vec!["inline"]);
    assert!(loader.load("broken").is_none());
    assert!(loader.load("missing").is_none());
}

#[test]
fn task_config_directory_works_on_the_mock_filesystem() {
    let fs = MockFileSystem::new();
    fs.add_file("/configs/etl.json", r#"{"kwargs": {"limit": 5}, "unexpected": 1}"#);
    fs.add_file("/configs/load.json", r#"{"kwargs": {"limit": 5}}"#);
    let loader = DirTaskConfigs::new("/configs", Arc::new(fs));

    assert_eq!(loader.path_for("etl"), PathBuf::from("/configs/etl.json"));
    // Unknown fields make the file invalid.
    assert!(loader.load("etl").is_none());
    assert_eq!(loader.load("load").unwrap().kwargs["limit"], 5);
}
