//! Per-step shared context.
//!
//! Each [`StepNode`](crate::planner::StepNode) owns a distinct
//! `SharedContext`. Writes by one step are never visible to siblings;
//! propagation happens only through the well-known `<depRef>_result` keys
//! the scheduler seeds before invoking a step.

use std::collections::BTreeMap;

use crate::value::{Value, ValueError};

/// Suffix the scheduler appends to a dependency's `pluginRef` to publish
/// its result into a dependent's shared context.
pub const RESULT_SUFFIX: &str = "_result";
pub const PREVIOUS_RESULT_KEY: &str = "previous_result";
pub const INPUT_KEY: &str = "_input";
pub const FLOW_REGISTRY_KEY: &str = "flow_registry";

/// Keys a notifier-style plugin writes to pass a message down the chain.
pub const MESSAGE_KEY: &str = "message";
pub const SEVERITY_KEY: &str = "severity";
pub const CHANNEL_KEY: &str = "channel";

#[derive(Debug, Clone, Default)]
pub struct SharedContext {
    data: BTreeMap<String, Value>,
}

impl SharedContext {
    pub fn new() -> Self {
        Self { data: BTreeMap::new() }
    }

    /// Build a step's shared context: a copy of `base`, overlaid with the
    /// step's own static parameters (step parameters win on collision,
    /// per the planner's pass 1).
    pub fn seeded(base: &BTreeMap<String, Value>, step_params: &BTreeMap<String, Value>) -> Self {
        let mut data = base.clone();
        for (k, v) in step_params {
            data.insert(k.clone(), v.clone());
        }
        Self { data }
    }

    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.data.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    pub fn get_str(&self, key: &str) -> Result<Option<&str>, ValueError> {
        match self.data.get(key) {
            Some(v) => Ok(Some(v.as_str()?)),
            None => Ok(None),
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    /// Publishes a completed dependency's result under `<pluginRef>_result`,
    /// and the backward-compat `previous_result`/`_input` aliases for the
    /// *most recently completed* dependency (in wiring order).
    pub fn record_dependency_result(&mut self, dep_plugin_ref: &str, result: &Value) {
        self.set(format!("{dep_plugin_ref}{RESULT_SUFFIX}"), result.clone());
        self.set(PREVIOUS_RESULT_KEY, result.clone());
        self.set(INPUT_KEY, result.clone());
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.data.iter()
    }
}
