//! Process-wide plugin registry.
//!
//! Populated once during startup by [`PluginRegistryBuilder`], then frozen
//! into an `Arc<HashMap<..>>`. Unlike `gini_core`'s `SharedStageRegistry`
//! (an `Arc<Mutex<..>>` reopened for every lookup), the registry here
//! never needs synchronization on the read path: once built it is never
//! mutated again, so concurrent lookups never contend on a lock.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::EngineError;
use crate::plugin::SharedPlugin;

#[derive(Default)]
pub struct PluginRegistryBuilder {
    plugins: HashMap<String, SharedPlugin>,
}

impl PluginRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an already-initialized plugin instance under `name`.
    /// Overwrites any prior registration under the same name, matching
    /// how config-driven plugin lists are re-applied on reload.
    pub fn register(&mut self, name: impl Into<String>, plugin: SharedPlugin) -> &mut Self {
        self.plugins.insert(name.into(), plugin);
        self
    }

    pub fn build(self) -> PluginRegistry {
        PluginRegistry { plugins: Arc::new(self.plugins) }
    }
}

#[derive(Clone)]
pub struct PluginRegistry {
    plugins: Arc<HashMap<String, SharedPlugin>>,
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("plugins", &self.plugins.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl PluginRegistry {
    pub fn lookup(&self, name: &str) -> Result<SharedPlugin, EngineError> {
        self.plugins
            .get(name)
            .cloned()
            .ok_or_else(|| EngineError::PluginNotFound(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.plugins.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.plugins.keys().map(|s| s.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::SharedContext;
    use crate::plugin::{Plugin, PluginConfig, PluginRequest};
    use crate::value::Value;
    use async_trait::async_trait;
    use tokio_util::sync::CancellationToken;

    struct Echo;

    #[async_trait]
    impl Plugin for Echo {
        fn name(&self) -> &'static str {
            "echo"
        }
        async fn initialize(&self, _config: &PluginConfig) -> Result<(), crate::plugin::PluginError> {
            Ok(())
        }
        async fn execute(
            &self,
            _cancellation: CancellationToken,
            _request: &PluginRequest,
            _shared: &mut SharedContext,
        ) -> Result<Value, crate::plugin::PluginError> {
            Ok(Value::Str("echo".into()))
        }
    }

    #[test]
    fn lookup_missing_plugin_is_not_found() {
        let registry = PluginRegistryBuilder::new().build();
        assert!(matches!(registry.lookup("missing"), Err(EngineError::PluginNotFound(_))));
    }

    #[test]
    fn lookup_registered_plugin_succeeds() {
        let mut builder = PluginRegistryBuilder::new();
        builder.register("echo", Arc::new(Echo));
        let registry = builder.build();
        assert!(registry.lookup("echo").is_ok());
        assert_eq!(registry.len(), 1);
    }
}
