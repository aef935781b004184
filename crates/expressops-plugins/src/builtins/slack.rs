//! Posts a message to a Slack incoming webhook.

use std::sync::OnceLock;

use async_trait::async_trait;
use expressops_core::context::{CHANNEL_KEY, MESSAGE_KEY, SEVERITY_KEY};
use expressops_core::{Plugin, PluginConfig, PluginError, PluginRequest, SharedContext, Value};
use serde_json::json;
use tokio_util::sync::CancellationToken;

#[derive(Default)]
pub struct SlackPlugin {
    webhook_url: OnceLock<String>,
}

#[async_trait]
impl Plugin for SlackPlugin {
    fn name(&self) -> &'static str {
        "slack"
    }

    async fn initialize(&self, config: &PluginConfig) -> Result<(), PluginError> {
        let webhook_url = config
            .get("webhook_url")
            .and_then(|v| v.as_str().ok())
            .ok_or_else(|| PluginError::Init("slack webhook URL required".to_string()))?;
        self.webhook_url
            .set(webhook_url.to_string())
            .map_err(|_| PluginError::Init("slack plugin initialized twice".to_string()))?;
        Ok(())
    }

    async fn execute(
        &self,
        _cancellation: CancellationToken,
        _request: &PluginRequest,
        shared: &mut SharedContext,
    ) -> Result<Value, PluginError> {
        let webhook_url = self
            .webhook_url
            .get()
            .ok_or_else(|| PluginError::Execute("plugin not initialized".to_string()))?;

        let message = shared.get_str(MESSAGE_KEY).ok().flatten().unwrap_or("").to_string();
        let channel = shared.get_str(CHANNEL_KEY).ok().flatten().unwrap_or("").to_string();
        let severity = shared.get_str(SEVERITY_KEY).ok().flatten().unwrap_or("info").to_string();

        let payload = json!({
            "text": format!("[{severity}] {message}"),
            "channel": channel,
        });

        let client = reqwest::Client::new();
        let response = client
            .post(webhook_url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| PluginError::Execute(e.to_string()))?;

        if !response.status().is_success() {
            return Err(PluginError::Execute(format!("slack API error: {}", response.status())));
        }

        Ok(Value::Str("success".to_string()))
    }
}
