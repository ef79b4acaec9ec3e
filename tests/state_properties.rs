use std::collections::{BTreeMap, BTreeSet};

use proptest::prelude::*;
use serde_json::{json, Map, Value};

use runtrigger::config::FrequencySpec;
use runtrigger::evaluation::{PolicyCandidate, TaskVerdict, TriggerRound};
use runtrigger::policy::{PolicyError, PolicyRegistry};
use runtrigger::store::{MemoryStore, RunStateRecord, RunStateStore};
use runtrigger::types::TriggerState;
use runtrigger::upload::template::substitute_placeholders;
use runtrigger_test_utils::t0;

const SCOPE: &str = "prop-scope";

fn spec(policy: &str) -> FrequencySpec {
    FrequencySpec {
        policy: Some(policy.to_string()),
        params: Map::new(),
    }
}

fn state_strategy() -> impl Strategy<Value = TriggerState> {
    proptest::collection::btree_map("[a-z]{1,6}", any::<i64>(), 0..4).prop_map(|m| {
        m.into_iter()
            .map(|(k, v)| (k, Value::from(v)))
            .collect::<Map<String, Value>>()
    })
}

/// Per task: prior state (if any) and how it takes part in the round.
#[derive(Debug, Clone, Copy)]
enum Role {
    NotSelected,
    Fires,
    DoesNotFire,
    BrokenPolicy,
}

fn role_strategy() -> impl Strategy<Value = Role> {
    prop_oneof![
        Just(Role::NotSelected),
        Just(Role::Fires),
        Just(Role::DoesNotFire),
        Just(Role::BrokenPolicy),
    ]
}

proptest! {
    #[test]
    fn only_fired_tasks_change_state(
        tasks in proptest::collection::btree_map(
            "[a-z]{1,8}",
            (proptest::option::of(state_strategy()), role_strategy()),
            0..8,
        ),
        persist in any::<bool>(),
        prior_version in 0u64..100,
    ) {
        let store = MemoryStore::new();
        let prior: BTreeMap<String, TriggerState> = tasks
            .iter()
            .filter_map(|(name, (state, _))| state.clone().map(|s| (name.clone(), s)))
            .collect();
        store.put(&RunStateRecord {
            scope_key: SCOPE.to_string(),
            version: prior_version,
            tasks: prior.clone(),
        }).unwrap();

        let registry = PolicyRegistry::with_builtins();
        let candidates: Vec<PolicyCandidate> = tasks
            .iter()
            .filter_map(|(name, (_, role))| {
                let policy = match role {
                    Role::NotSelected => return None,
                    Role::Fires => registry.load(&spec("always")),
                    Role::DoesNotFire => registry.load(&spec("never")),
                    Role::BrokenPolicy => Err(PolicyError::Unknown("nope".to_string())),
                };
                Some(PolicyCandidate { task: name.clone(), policy })
            })
            .collect();

        let outcome = TriggerRound::new(&store, SCOPE, persist, t0()).run(candidates).unwrap();
        let after = store.get(SCOPE).unwrap();

        prop_assert_eq!(after.version, prior_version + 1);
        prop_assert_eq!(outcome.version, prior_version + 1);

        let fired: BTreeSet<String> = outcome.fired().into_iter().collect();
        let expected_fired: BTreeSet<String> = tasks
            .iter()
            .filter(|(_, (_, role))| matches!(role, Role::Fires))
            .map(|(name, _)| name.clone())
            .collect();
        prop_assert_eq!(&fired, &expected_fired);

        for (name, (_, role)) in &tasks {
            let changed = persist && matches!(role, Role::Fires);
            if changed {
                prop_assert!(after.tasks.contains_key(name));
                prop_assert_eq!(after.tasks[name].get("trigger_count").and_then(Value::as_u64), Some(1));
            } else {
                prop_assert_eq!(after.tasks.get(name), prior.get(name));
            }
        }

        for result in &outcome.results {
            if let Role::BrokenPolicy = tasks[&result.task].1 {
                prop_assert!(matches!(result.verdict, TaskVerdict::Skipped(_)));
            }
        }
    }

    #[test]
    fn substitution_never_touches_non_placeholder_keys(
        plain in proptest::collection::btree_map("[a-z]{1,6}", any::<i32>(), 0..6),
        bound in proptest::collection::vec("[a-z]{1,4}", 0..4),
    ) {
        let mut params: Map<String, Value> = plain.iter().map(|(k, v)| (k.clone(), json!(v))).collect();
        params.insert("matched_paths.$".to_string(), json!("$.matching_path_list"));
        let mut ctx = Map::new();
        ctx.insert("matching_path_list".to_string(), json!(bound));

        let out = substitute_placeholders(&Value::Object(params), &ctx);

        for (k, v) in &plain {
            prop_assert_eq!(&out[k.as_str()], &json!(v));
        }
        prop_assert_eq!(&out["matched_paths"], &json!(bound));
        prop_assert!(out.get("matched_paths.$").is_none());
    }
}
