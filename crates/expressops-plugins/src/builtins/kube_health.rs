//! Reports Pod phase for a namespace via the Kubernetes REST API, using
//! the in-cluster service-account token instead of a full client library.

use std::sync::OnceLock;

use async_trait::async_trait;
use expressops_core::{Plugin, PluginConfig, PluginError, PluginRequest, SharedContext, Value};
use tokio_util::sync::CancellationToken;

const SERVICE_ACCOUNT_DIR: &str = "/var/run/secrets/kubernetes.io/serviceaccount";

pub struct KubeHealthPlugin {
    api_server: OnceLock<String>,
}

impl Default for KubeHealthPlugin {
    fn default() -> Self {
        Self { api_server: OnceLock::new() }
    }
}

#[async_trait]
impl Plugin for KubeHealthPlugin {
    fn name(&self) -> &'static str {
        "kubehealth"
    }

    async fn initialize(&self, config: &PluginConfig) -> Result<(), PluginError> {
        let api_server = config
            .get("api_server")
            .and_then(|v| v.as_str().ok())
            .map(str::to_string)
            .unwrap_or_else(|| "https://kubernetes.default.svc".to_string());
        let _ = self.api_server.set(api_server);
        Ok(())
    }

    async fn execute(
        &self,
        _cancellation: CancellationToken,
        request: &PluginRequest,
        _shared: &mut SharedContext,
    ) -> Result<Value, PluginError> {
        let namespace = request.query("namespace").unwrap_or("default");
        let api_server = self.api_server.get().cloned().unwrap_or_else(|| "https://kubernetes.default.svc".to_string());

        let token = tokio::fs::read_to_string(format!("{SERVICE_ACCOUNT_DIR}/token"))
            .await
            .map_err(|e| PluginError::Execute(format!("failed to read service-account token: {e}")))?;

        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(false)
            .build()
            .map_err(|e| PluginError::Execute(e.to_string()))?;

        let url = format!("{api_server}/api/v1/namespaces/{namespace}/pods");
        let response = client
            .get(&url)
            .bearer_auth(token.trim())
            .send()
            .await
            .map_err(|e| PluginError::Execute(format!("error listing pods: {e}")))?;

        let body: serde_json::Value =
            response.json().await.map_err(|e| PluginError::Execute(e.to_string()))?;

        let mut pods = Vec::new();
        for item in body.get("items").and_then(|v| v.as_array()).into_iter().flatten() {
            let name = item
                .pointer("/metadata/name")
                .and_then(|v| v.as_str())
                .unwrap_or("unknown")
                .to_string();
            let mut status = item
                .pointer("/status/phase")
                .and_then(|v| v.as_str())
                .unwrap_or("Unknown")
                .to_string();
            let container_statuses =
                item.pointer("/status/containerStatuses").and_then(|v| v.as_array());
            if status == "Running" {
                if let Some(statuses) = container_statuses {
                    for cs in statuses {
                        if cs.pointer("/state/waiting/reason").and_then(|v| v.as_str()) == Some("CrashLoopBackOff") {
                            status = "CrashLoopBackOff".to_string();
                            break;
                        }
                    }
                }
            }
            let mut entry = std::collections::BTreeMap::new();
            entry.insert("name".to_string(), Value::Str(name));
            entry.insert("status".to_string(), Value::Str(status));
            pods.push(Value::Map(entry));
        }

        Ok(Value::List(pods))
    }

    fn format_result(&self, value: &Value) -> Result<String, PluginError> {
        let pods = match value {
            Value::List(pods) => pods,
            other => return Err(PluginError::Format(format!("unexpected result type: {}", other.kind()))),
        };
        let mut output = String::from("kubernetes pod status:\n");
        for pod in pods {
            let map = pod.as_map().map_err(|e| PluginError::Format(e.to_string()))?;
            let name = map.get("name").and_then(|v| v.as_str().ok()).unwrap_or("?");
            let status = map.get("status").and_then(|v| v.as_str().ok()).unwrap_or("?");
            output.push_str(&format!("  {name}: {status}\n"));
        }
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[tokio::test]
    async fn initialize_defaults_to_in_cluster_api_server() {
        let plugin = KubeHealthPlugin::default();
        plugin.initialize(&BTreeMap::new()).await.unwrap();
        assert_eq!(plugin.api_server.get().unwrap(), "https://kubernetes.default.svc");
    }

    #[test]
    fn format_result_rejects_non_list_values() {
        let plugin = KubeHealthPlugin::default();
        let err = plugin.format_result(&Value::Str("oops".into())).unwrap_err();
        assert!(matches!(err, PluginError::Format(_)));
    }
}
