//! Deletes files under a target directory older than an age threshold.
//! Defaults to dry-run, matching the original plugin's safety default.

use std::sync::Mutex;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use expressops_core::{Plugin, PluginConfig, PluginError, PluginRequest, SharedContext, Value};
use tokio_util::sync::CancellationToken;

struct Settings {
    target_dir: String,
    age_threshold_hours: u64,
    dry_run: bool,
}

pub struct DiskCleanerPlugin {
    settings: Mutex<Settings>,
}

impl Default for DiskCleanerPlugin {
    fn default() -> Self {
        Self {
            settings: Mutex::new(Settings {
                target_dir: "/tmp".to_string(),
                age_threshold_hours: 24,
                dry_run: true,
            }),
        }
    }
}

#[async_trait]
impl Plugin for DiskCleanerPlugin {
    fn name(&self) -> &'static str {
        "clean-disk"
    }

    async fn initialize(&self, config: &PluginConfig) -> Result<(), PluginError> {
        let mut settings = self.settings.lock().unwrap();
        if let Some(dir) = config.get("target_dir").and_then(|v| v.as_str().ok()) {
            settings.target_dir = dir.to_string();
        }
        if let Some(Value::Int(hours)) = config.get("age_hours") {
            settings.age_threshold_hours = (*hours).max(0) as u64;
        }
        if let Some(Value::Bool(dry_run)) = config.get("dry_run") {
            settings.dry_run = *dry_run;
        }
        tracing::info!(
            target_dir = %settings.target_dir,
            age_hours = settings.age_threshold_hours,
            dry_run = settings.dry_run,
            "initializing disk cleaner plugin"
        );
        Ok(())
    }

    async fn execute(
        &self,
        _cancellation: CancellationToken,
        _request: &PluginRequest,
        _shared: &mut SharedContext,
    ) -> Result<Value, PluginError> {
        let (target_dir, age_threshold_hours, dry_run) = {
            let settings = self.settings.lock().unwrap();
            (settings.target_dir.clone(), settings.age_threshold_hours, settings.dry_run)
        };

        let cutoff = SystemTime::now() - Duration::from_secs(age_threshold_hours * 3600);
        let mut deleted = Vec::new();
        let mut bytes_freed: u64 = 0;

        let mut entries = match tokio::fs::read_dir(&target_dir).await {
            Ok(entries) => entries,
            Err(_) => {
                return Ok(Value::Map(
                    [
                        ("status".to_string(), Value::Str("warning".to_string())),
                        ("files_deleted".to_string(), Value::Int(0)),
                    ]
                    .into_iter()
                    .collect(),
                ));
            }
        };

        while let Ok(Some(entry)) = entries.next_entry().await {
            let metadata = match entry.metadata().await {
                Ok(m) => m,
                Err(_) => continue,
            };
            if !metadata.is_file() {
                continue;
            }
            let modified = metadata.modified().unwrap_or(SystemTime::now());
            if modified >= cutoff {
                continue;
            }
            if !dry_run {
                if tokio::fs::remove_file(entry.path()).await.is_ok() {
                    bytes_freed += metadata.len();
                    deleted.push(Value::Str(entry.path().display().to_string()));
                }
            } else {
                deleted.push(Value::Str(entry.path().display().to_string()));
            }
        }

        Ok(Value::Map(
            [
                ("status".to_string(), Value::Str("success".to_string())),
                ("dry_run".to_string(), Value::Bool(dry_run)),
                ("files_deleted".to_string(), Value::Int(deleted.len() as i64)),
                ("bytes_freed".to_string(), Value::Int(bytes_freed as i64)),
                ("deleted_files".to_string(), Value::List(deleted)),
            ]
            .into_iter()
            .collect(),
        ))
    }

    fn format_result(&self, value: &Value) -> Result<String, PluginError> {
        let map = value.as_map().map_err(|e| PluginError::Format(e.to_string()))?;
        if let Some(Value::Str(status)) = map.get("status") {
            if status == "warning" {
                return Ok("clean-disk: target directory does not exist".to_string());
            }
        }
        let count = match map.get("files_deleted") {
            Some(Value::Int(n)) => *n,
            _ => 0,
        };
        let dry_run = matches!(map.get("dry_run"), Some(Value::Bool(true)));
        if dry_run {
            Ok(format!("clean-disk: would delete {count} file(s) (dry run)"))
        } else {
            Ok(format!("clean-disk: deleted {count} file(s)"))
        }
    }
}
