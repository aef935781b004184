//! Flow definitions and the process-wide flow registry.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::error::EngineError;
use crate::value::Value;

/// One step of a flow: a `pluginRef` plus static parameters and optional
/// explicit dependency declarations.
#[derive(Debug, Clone, Default)]
pub struct Step {
    pub plugin_ref: String,
    pub parameters: BTreeMap<String, Value>,
    pub depends_on: Vec<String>,
    pub parallel: bool,
}

impl Step {
    /// A step with an empty `pluginRef` is a config-level comment and is
    /// skipped during planning.
    pub fn is_comment(&self) -> bool {
        self.plugin_ref.is_empty()
    }
}

/// A named, immutable-after-load composition of steps.
#[derive(Debug, Clone, Default)]
pub struct Flow {
    pub name: String,
    pub custom_handler: Option<String>,
    pub pipeline: Vec<Step>,
}

#[derive(Default)]
pub struct FlowRegistryBuilder {
    flows: HashMap<String, Arc<Flow>>,
}

impl FlowRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, flow: Flow) -> &mut Self {
        self.flows.insert(flow.name.clone(), Arc::new(flow));
        self
    }

    pub fn build(self) -> FlowRegistry {
        FlowRegistry { flows: Arc::new(self.flows) }
    }
}

/// Read-only after startup, exactly like [`PluginRegistry`](crate::registry::PluginRegistry).
#[derive(Clone)]
pub struct FlowRegistry {
    flows: Arc<HashMap<String, Arc<Flow>>>,
}

impl FlowRegistry {
    pub fn lookup(&self, name: &str) -> Result<Arc<Flow>, EngineError> {
        self.flows.get(name).cloned().ok_or_else(|| EngineError::FlowNotFound(name.to_string()))
    }

    /// Names of every registered flow — what the built-in flow-lister
    /// plugin surfaces through the `flow_registry` shared-context key.
    pub fn names(&self) -> Vec<String> {
        self.flows.keys().cloned().collect()
    }

    /// Every registered flow, sorted by name for deterministic listing.
    pub fn all(&self) -> Vec<Arc<Flow>> {
        let mut flows: Vec<Arc<Flow>> = self.flows.values().cloned().collect();
        flows.sort_by(|a, b| a.name.cmp(&b.name));
        flows
    }

    pub fn len(&self) -> usize {
        self.flows.len()
    }
}
