//! Deletes `.log` files under a directory older than a configured number
//! of days.

use std::sync::Mutex;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use expressops_core::{Plugin, PluginConfig, PluginError, PluginRequest, SharedContext, Value};
use tokio_util::sync::CancellationToken;

struct Settings {
    log_dir: String,
    max_age_days: u64,
}

pub struct LogCleanerPlugin {
    settings: Mutex<Settings>,
}

impl Default for LogCleanerPlugin {
    fn default() -> Self {
        Self { settings: Mutex::new(Settings { log_dir: "logs".to_string(), max_age_days: 30 }) }
    }
}

#[async_trait]
impl Plugin for LogCleanerPlugin {
    fn name(&self) -> &'static str {
        "log-cleaner"
    }

    async fn initialize(&self, config: &PluginConfig) -> Result<(), PluginError> {
        let mut settings = self.settings.lock().unwrap();
        if let Some(dir) = config.get("log_dir").and_then(|v| v.as_str().ok()) {
            settings.log_dir = dir.to_string();
        }
        if let Some(Value::Int(days)) = config.get("max_age_days") {
            settings.max_age_days = (*days).max(0) as u64;
        }
        tracing::info!(
            log_dir = %settings.log_dir,
            max_age_days = settings.max_age_days,
            "initializing log cleaner plugin"
        );
        Ok(())
    }

    async fn execute(
        &self,
        _cancellation: CancellationToken,
        request: &PluginRequest,
        _shared: &mut SharedContext,
    ) -> Result<Value, PluginError> {
        let (mut log_dir, mut max_age_days) = {
            let settings = self.settings.lock().unwrap();
            (settings.log_dir.clone(), settings.max_age_days)
        };
        if let Some(dir) = request.query("dir") {
            log_dir = dir.to_string();
        }
        if let Some(age) = request.query("max_age_days").and_then(|s| s.parse::<u64>().ok()) {
            max_age_days = age;
        }

        let cutoff = SystemTime::now() - Duration::from_secs(max_age_days * 86_400);
        let mut deleted = Vec::new();

        let mut entries = match tokio::fs::read_dir(&log_dir).await {
            Ok(entries) => entries,
            Err(_) => {
                return Ok(Value::Map(
                    [
                        ("status".to_string(), Value::Str("warning".to_string())),
                        ("files_deleted".to_string(), Value::Int(0)),
                        ("directory".to_string(), Value::Str(log_dir)),
                    ]
                    .into_iter()
                    .collect(),
                ));
            }
        };

        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("log") {
                continue;
            }
            let metadata = match entry.metadata().await {
                Ok(m) => m,
                Err(_) => continue,
            };
            let modified = metadata.modified().unwrap_or(SystemTime::now());
            if modified >= cutoff {
                continue;
            }
            if tokio::fs::remove_file(&path).await.is_ok() {
                deleted.push(Value::Str(path.display().to_string()));
            }
        }

        Ok(Value::Map(
            [
                ("status".to_string(), Value::Str("success".to_string())),
                ("files_deleted".to_string(), Value::Int(deleted.len() as i64)),
                ("files".to_string(), Value::List(deleted)),
                ("max_age_days".to_string(), Value::Int(max_age_days as i64)),
                ("directory".to_string(), Value::Str(log_dir)),
            ]
            .into_iter()
            .collect(),
        ))
    }

    fn format_result(&self, value: &Value) -> Result<String, PluginError> {
        let map = value.as_map().map_err(|e| PluginError::Format(e.to_string()))?;
        let dir = map.get("directory").and_then(|v| v.as_str().ok()).unwrap_or("");
        if let Some(Value::Str(status)) = map.get("status") {
            if status == "warning" {
                return Ok(format!("directory {dir} does not exist, nothing to clean"));
            }
        }
        let count = match map.get("files_deleted") {
            Some(Value::Int(n)) => *n,
            _ => 0,
        };
        let age = match map.get("max_age_days") {
            Some(Value::Int(n)) => *n,
            _ => 0,
        };
        if count == 0 {
            Ok(format!("no log files needed cleaning in {dir} (max age: {age} days)"))
        } else {
            Ok(format!("cleaned {count} log files older than {age} days from {dir}"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[tokio::test]
    async fn missing_directory_is_reported_as_warning() {
        let plugin = LogCleanerPlugin::default();
        let mut config = BTreeMap::new();
        config.insert("log_dir".to_string(), Value::Str("/nonexistent/expressops-logs".to_string()));
        plugin.initialize(&config).await.unwrap();
        let mut shared = SharedContext::new();
        let result = plugin
            .execute(CancellationToken::new(), &PluginRequest::default(), &mut shared)
            .await
            .unwrap();
        assert_eq!(result.as_map().unwrap().get("status").unwrap().as_str().unwrap(), "warning");
    }
}
