//! Lists every registered flow: its `customHandler` description and the
//! plugin references in its pipeline. Reads the flow registry that the
//! dispatcher seeds into every request's base context under
//! [`expressops_core::context::FLOW_REGISTRY_KEY`].

use async_trait::async_trait;
use expressops_core::context::FLOW_REGISTRY_KEY;
use expressops_core::{Plugin, PluginConfig, PluginError, PluginRequest, SharedContext, Value};
use tokio_util::sync::CancellationToken;

#[derive(Default)]
pub struct FlowListerPlugin;

#[async_trait]
impl Plugin for FlowListerPlugin {
    fn name(&self) -> &'static str {
        "flow-lister"
    }

    async fn initialize(&self, _config: &PluginConfig) -> Result<(), PluginError> {
        Ok(())
    }

    async fn execute(
        &self,
        _cancellation: CancellationToken,
        _request: &PluginRequest,
        shared: &mut SharedContext,
    ) -> Result<Value, PluginError> {
        let flows = match shared.get(FLOW_REGISTRY_KEY) {
            Some(Value::List(flows)) => flows.clone(),
            _ => {
                tracing::warn!("flow registry not found in shared context");
                Vec::new()
            }
        };

        Ok(Value::Map(
            [
                ("count".to_string(), Value::Int(flows.len() as i64)),
                ("flows".to_string(), Value::List(flows)),
            ]
            .into_iter()
            .collect(),
        ))
    }

    fn format_result(&self, value: &Value) -> Result<String, PluginError> {
        let map = value.as_map().map_err(|e| PluginError::Format(e.to_string()))?;
        let count = match map.get("count") {
            Some(Value::Int(n)) => *n,
            _ => 0,
        };
        let mut output = format!("available flows ({count}):\n");
        if let Some(Value::List(flows)) = map.get("flows") {
            for flow in flows {
                let Ok(entry) = flow.as_map() else { continue };
                let name = entry.get("name").and_then(|v| v.as_str().ok()).unwrap_or("?");
                output.push_str(&format!("  - {name}\n"));
                if let Some(description) = entry.get("description").and_then(|v| v.as_str().ok()) {
                    if !description.is_empty() {
                        output.push_str(&format!("      {description}\n"));
                    }
                }
                if let Some(Value::List(plugins)) = entry.get("plugins") {
                    let names: Vec<&str> = plugins.iter().filter_map(|p| p.as_str().ok()).collect();
                    output.push_str(&format!("      plugins: {}\n", names.join(" -> ")));
                }
            }
        }
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn flow_entry(name: &str, description: &str, plugins: &[&str]) -> Value {
        Value::Map(
            [
                ("name".to_string(), Value::Str(name.to_string())),
                ("description".to_string(), Value::Str(description.to_string())),
                ("plugin_count".to_string(), Value::Int(plugins.len() as i64)),
                (
                    "plugins".to_string(),
                    Value::List(plugins.iter().map(|p| Value::Str(p.to_string())).collect()),
                ),
            ]
            .into_iter()
            .collect::<BTreeMap<_, _>>(),
        )
    }

    #[tokio::test]
    async fn missing_registry_key_yields_empty_list() {
        let plugin = FlowListerPlugin;
        let mut shared = SharedContext::new();
        let result = plugin
            .execute(CancellationToken::new(), &PluginRequest::default(), &mut shared)
            .await
            .unwrap();
        assert!(matches!(result.as_map().unwrap().get("count"), Some(Value::Int(0))));
    }

    #[tokio::test]
    async fn passes_through_seeded_flow_entries() {
        let plugin = FlowListerPlugin;
        let mut shared = SharedContext::new();
        shared.set(
            FLOW_REGISTRY_KEY,
            Value::List(vec![flow_entry("alpha", "incident response", &["health-check", "slack"])]),
        );
        let result = plugin
            .execute(CancellationToken::new(), &PluginRequest::default(), &mut shared)
            .await
            .unwrap();
        let map = result.as_map().unwrap();
        assert!(matches!(map.get("count"), Some(Value::Int(1))));
        let formatted = plugin.format_result(&result).unwrap();
        assert!(formatted.contains("alpha"));
        assert!(formatted.contains("incident response"));
        assert!(formatted.contains("health-check -> slack"));
    }
}
