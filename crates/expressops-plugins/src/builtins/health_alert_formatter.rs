//! Turns a health-check step's `_input` map into a Slack-ready alert
//! message, writing it into the shared context under `message` for a
//! downstream notifier step to pick up.

use async_trait::async_trait;
use expressops_core::context::{INPUT_KEY, MESSAGE_KEY};
use expressops_core::{Plugin, PluginConfig, PluginError, PluginRequest, SharedContext, Value};
use tokio_util::sync::CancellationToken;

const ALL_CLEAR: &str = "all clear, no health problems detected";

#[derive(Default)]
pub struct HealthAlertFormatterPlugin;

#[async_trait]
impl Plugin for HealthAlertFormatterPlugin {
    fn name(&self) -> &'static str {
        "health-alert-formatter"
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
        let input = shared
            .get(INPUT_KEY)
            .ok_or_else(|| PluginError::Execute("no _input received".to_string()))?
            .as_map()
            .map_err(|e| PluginError::Execute(e.to_string()))?
            .clone();

        let mut problems = String::new();
        for (check, status) in &input {
            let status_str = status.as_str().unwrap_or("");
            if status_str != "OK" {
                problems.push_str(&format!("{check}: {status_str}\n"));
            }
        }

        if problems.is_empty() {
            shared.set(MESSAGE_KEY, Value::Str(ALL_CLEAR.to_string()));
            return Ok(Value::Str(String::new()));
        }

        let formatted = format!("problems detected:\n{problems}");
        shared.set(MESSAGE_KEY, Value::Str(formatted.clone()));
        Ok(Value::Str(formatted))
    }

    fn format_result(&self, value: &Value) -> Result<String, PluginError> {
        let message = value.as_str().map_err(|e| PluginError::Format(e.to_string()))?;
        if message.is_empty() {
            Ok(ALL_CLEAR.to_string())
        } else {
            Ok(format!("alert message generated:\n{message}"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[tokio::test]
    async fn all_ok_checks_produce_all_clear_message() {
        let plugin = HealthAlertFormatterPlugin;
        let mut shared = SharedContext::new();
        let mut input = BTreeMap::new();
        input.insert("disk".to_string(), Value::Str("OK".to_string()));
        shared.set(INPUT_KEY, Value::Map(input));
        let result = plugin
            .execute(CancellationToken::new(), &PluginRequest::default(), &mut shared)
            .await
            .unwrap();
        assert_eq!(result.as_str().unwrap(), "");
        assert_eq!(shared.get(MESSAGE_KEY).unwrap().as_str().unwrap(), ALL_CLEAR);
    }

    #[tokio::test]
    async fn failing_check_is_surfaced_in_the_message() {
        let plugin = HealthAlertFormatterPlugin;
        let mut shared = SharedContext::new();
        let mut input = BTreeMap::new();
        input.insert("disk".to_string(), Value::Str("FAIL: out of space".to_string()));
        shared.set(INPUT_KEY, Value::Map(input));
        let result = plugin
            .execute(CancellationToken::new(), &PluginRequest::default(), &mut shared)
            .await
            .unwrap();
        assert!(result.as_str().unwrap().contains("disk"));
    }

    #[tokio::test]
    async fn missing_input_fails() {
        let plugin = HealthAlertFormatterPlugin;
        let mut shared = SharedContext::new();
        let err = plugin
            .execute(CancellationToken::new(), &PluginRequest::default(), &mut shared)
            .await
            .unwrap_err();
        assert!(matches!(err, PluginError::Execute(_)));
    }
}
