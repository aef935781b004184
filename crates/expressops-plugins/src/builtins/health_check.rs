//! Runs a set of named checks and reports per-check pass/fail.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use expressops_core::{Plugin, PluginConfig, PluginError, PluginRequest, SharedContext, Value};
use tokio_util::sync::CancellationToken;

type Check = Box<dyn Fn() -> Result<(), String> + Send + Sync>;

pub struct HealthCheckPlugin {
    checks: Mutex<BTreeMap<String, Check>>,
}

impl Default for HealthCheckPlugin {
    fn default() -> Self {
        let mut checks: BTreeMap<String, Check> = BTreeMap::new();
        checks.insert("example".to_string(), Box::new(|| Ok(())));
        Self { checks: Mutex::new(checks) }
    }
}

impl HealthCheckPlugin {
    pub fn register_check(&self, name: impl Into<String>, check: Check) {
        self.checks.lock().unwrap().insert(name.into(), check);
    }
}

#[async_trait]
impl Plugin for HealthCheckPlugin {
    fn name(&self) -> &'static str {
        "health-check"
    }

    async fn initialize(&self, _config: &PluginConfig) -> Result<(), PluginError> {
        tracing::info!("initializing health check plugin");
        Ok(())
    }

    async fn execute(
        &self,
        _cancellation: CancellationToken,
        _request: &PluginRequest,
        _shared: &mut SharedContext,
    ) -> Result<Value, PluginError> {
        let checks = self.checks.lock().unwrap();
        let mut result = BTreeMap::new();
        for (name, check) in checks.iter() {
            tracing::debug!(check = %name, "running health check");
            let status = match check() {
                Ok(()) => "OK".to_string(),
                Err(message) => format!("FAIL: {message}"),
            };
            result.insert(name.clone(), Value::Str(status));
        }
        Ok(Value::Map(result))
    }

    fn format_result(&self, value: &Value) -> Result<String, PluginError> {
        let map = value.as_map().map_err(|e| PluginError::Format(e.to_string()))?;
        let mut lines = Vec::with_capacity(map.len());
        for (name, status) in map {
            let status = status.as_str().unwrap_or("");
            lines.push(format!("{name}: {status}"));
        }
        Ok(lines.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn default_check_reports_ok() {
        let plugin = HealthCheckPlugin::default();
        plugin.initialize(&BTreeMap::new()).await.unwrap();
        let mut shared = SharedContext::new();
        let result = plugin
            .execute(CancellationToken::new(), &PluginRequest::default(), &mut shared)
            .await
            .unwrap();
        let map = result.as_map().unwrap();
        assert_eq!(map.get("example").unwrap().as_str().unwrap(), "OK");
    }

    #[tokio::test]
    async fn failing_check_is_reported_without_erroring_execute() {
        let plugin = HealthCheckPlugin::default();
        plugin.register_check("disk", Box::new(|| Err("out of space".to_string())));
        let mut shared = SharedContext::new();
        let result = plugin
            .execute(CancellationToken::new(), &PluginRequest::default(), &mut shared)
            .await
            .unwrap();
        let map = result.as_map().unwrap();
        assert_eq!(map.get("disk").unwrap().as_str().unwrap(), "FAIL: out of space");
    }
}
