use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use runtrigger::dispatch::engine::{EngineError, StartFuture, WorkflowEngine};
use runtrigger::dispatch::InvocationDescriptor;

#[derive(Debug, Default)]
struct State {
    attempts: Vec<InvocationDescriptor>,
    failing_names: BTreeSet<String>,
    failing_targets: BTreeSet<String>,
    next_id: usize,
}

/// A fake workflow engine that:
/// - records every attempted invocation (successful or not)
/// - rejects invocations whose name or target was marked as failing
/// - returns `exec-<n>` ids, counting successful starts from 1
///
/// Clones share their state.
#[derive(Debug, Clone, Default)]
pub struct FakeEngine {
    state: Arc<Mutex<State>>,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_name(&self, name: &str) {
        self.state.lock().unwrap().failing_names.insert(name.to_string());
    }

    pub fn fail_target(&self, target: &str) {
        self.state.lock().unwrap().failing_targets.insert(target.to_string());
    }

    pub fn attempts(&self) -> Vec<InvocationDescriptor> {
        self.state.lock().unwrap().attempts.clone()
    }

    pub fn attempted_names(&self) -> Vec<String> {
        self.attempts().into_iter().map(|d| d.name).collect()
    }
}

impl WorkflowEngine for FakeEngine {
    fn start<'a>(&'a self, descriptor: &'a InvocationDescriptor) -> StartFuture<'a> {
        let state = Arc::clone(&self.state);
        Box::pin(async move {
            let mut guard = state.lock().unwrap();
            guard.attempts.push(descriptor.clone());
            if guard.failing_names.contains(&descriptor.name)
                || guard.failing_targets.contains(&descriptor.target)
            {
                return Err(EngineError::Rejected(format!("{} refused", descriptor.name)));
            }
            guard.next_id += 1;
            Ok(format!("exec-{}", guard.next_id))
        })
    }
}
