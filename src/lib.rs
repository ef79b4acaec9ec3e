// src/lib.rs

pub mod cli;
pub mod config;
pub mod dispatch;
pub mod engine;
pub mod errors;
pub mod evaluation;
pub mod fs;
pub mod logging;
pub mod policy;
pub mod selection;
pub mod store;
pub mod types;
pub mod upload;

use std::collections::BTreeMap;
use std::io::Read;

use anyhow::{Context, Result};
use serde_json::Value;
use tracing::debug;

use crate::cli::{CliArgs, Command, TickArgs};
use crate::config::loader::load_and_validate;
use crate::config::model::ConfigFile;
use crate::dispatch::UserTaskOverride;
use crate::engine::{EngineContext, Request, TaskList, TriggerEngine, UserRequest};
use crate::types::TaskName;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading (+ backend overrides from the CLI)
/// - the engine context (stores, task configs, policies, dispatcher)
/// - one request built from the subcommand
///
/// The response is printed to stdout as JSON.
pub async fn run(args: CliArgs) -> Result<()> {
    let mut cfg = load_and_validate(&args.config)
        .with_context(|| format!("loading config {:?}", args.config))?;
    if let Some(backend) = args.store {
        cfg.set_store_backend(backend);
    }
    if let Some(backend) = args.dispatch {
        cfg.set_dispatch_backend(backend);
    }

    let request = match &args.command {
        Command::Validate => {
            print_config(&cfg);
            return Ok(());
        }
        Command::Tick(tick) => Request::Trigger(user_request_from_tick(tick)?),
        Command::Record { paths } => Request::Uploads(paths.clone()),
        Command::Drain => Request::Drain,
        Command::Schedule { expression } => Request::Schedule(expression.clone()),
        Command::Event { file } => Request::from_event(&read_event(file)?)?,
    };

    let ctx = EngineContext::from_config(cfg, args.dry_run)?;
    let engine = TriggerEngine::new(ctx);
    let response = engine.handle(request).await?;

    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

fn user_request_from_tick(tick: &TickArgs) -> Result<UserRequest> {
    let settings = match &tick.settings {
        Some(path) => {
            let raw = std::fs::read_to_string(path).with_context(|| format!("reading settings {:?}", path))?;
            let parsed: BTreeMap<TaskName, UserTaskOverride> =
                serde_json::from_str(&raw).with_context(|| format!("parsing settings {:?}", path))?;
            Some(parsed)
        }
        None => None,
    };

    Ok(UserRequest {
        check_schedule: tick.check_schedule,
        settings,
        tasks: tick.tasks.clone().map(TaskList::Csv),
        update_run_db: !tick.no_update_state,
        ..UserRequest::default()
    })
}

fn read_event(file: &str) -> Result<Value> {
    let raw = if file == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("reading event from stdin")?;
        buf
    } else {
        std::fs::read_to_string(file).with_context(|| format!("reading event {file:?}"))?
    };
    serde_json::from_str(&raw).context("parsing event JSON")
}

/// Print the resolved configuration.
fn print_config(cfg: &ConfigFile) {
    let engine = cfg.engine();
    println!("runtrigger config");
    println!("  engine.scope = {}", engine.scope);
    println!("  engine.account_name = {}", engine.account_name);
    println!("  engine.run_scope_key = {}", engine.run_scope_key);
    println!("  engine.job_target = {}", engine.job_target);
    if let Some(ref req) = engine.shared_requirement {
        println!("  engine.shared_requirement = {req}");
    }
    if let Some(ref dir) = engine.task_config_dir {
        println!("  engine.task_config_dir = {}", dir.display());
    }
    println!("  store = {:?} ({})", cfg.store().backend, cfg.store().path.display());
    println!(
        "  dispatch = {:?} (timeout {}s)",
        cfg.dispatch().backend,
        cfg.dispatch().timeout_seconds
    );
    println!();

    println!("allowed tasks ({}):", cfg.allowed_tasks().len());
    for name in cfg.allowed_tasks() {
        println!("  - {name}");
        let Some(task) = cfg.tasks().get(name) else {
            continue;
        };
        if task.run.default {
            println!("      default: true");
        }
        if let Some(ref policy) = task.run.frequency.policy {
            println!("      frequency: {policy} {:?}", task.run.frequency.params);
        }
        if let Some(ref scopes) = task.run.enabled_scopes {
            println!("      enabled_scopes: {scopes:?}");
        }
        if let Some(ref accounts) = task.run.enabled_account_names {
            println!("      enabled_account_names: {accounts:?}");
        }
        if !task.requirements.is_empty() {
            println!("      requirements: {:?}", task.requirements);
        }
    }

    println!();
    println!(
        "upload triggers ({}), window {}s:",
        cfg.upload().trigger.len(),
        cfg.upload().window_seconds
    );
    for rule in &cfg.upload().trigger {
        let check_only = if rule.check_only { " (check only)" } else { "" };
        println!("  - {} -> {}{check_only}", rule.file_selector, rule.workflow.target);
    }

    println!();
    println!("scheduled triggers ({}):", cfg.scheduled_triggers().len());
    for trigger in cfg.scheduled_triggers() {
        println!("  - {} -> {}", trigger.schedule_expression, trigger.workflow.target);
    }

    debug!("validate complete (nothing run)");
}
