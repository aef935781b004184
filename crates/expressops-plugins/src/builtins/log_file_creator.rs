//! Appends a timestamped entry describing another step's output to a
//! per-day log file.

use std::io::Write;
use std::sync::Mutex;

use async_trait::async_trait;
use expressops_core::{Plugin, PluginConfig, PluginError, PluginRequest, SharedContext, Value};
use tokio_util::sync::CancellationToken;

struct Settings {
    log_path: String,
    base_filename: String,
}

pub struct LogFileCreatorPlugin {
    settings: Mutex<Settings>,
}

impl Default for LogFileCreatorPlugin {
    fn default() -> Self {
        Self { settings: Mutex::new(Settings { log_path: "logs".to_string(), base_filename: "logfile".to_string() }) }
    }
}

impl LogFileCreatorPlugin {
    fn filename(&self) -> std::path::PathBuf {
        let settings = self.settings.lock().unwrap();
        let now = chrono_like_date();
        std::path::Path::new(&settings.log_path).join(format!("{}{now}.log", settings.base_filename))
    }
}

/// Formats today's date as `DDMMYYYY` without pulling in a date/time
/// crate for one call site.
fn chrono_like_date() -> String {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    let days_since_epoch = now / 86_400;
    // Simple civil-from-days conversion (Howard Hinnant's algorithm).
    let z = days_since_epoch as i64 + 719_468;
    let era = if z >= 0 { z } else { z - 146_096 } / 146_097;
    let doe = (z - era * 146_097) as u64;
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146_096) / 365;
    let y = yoe as i64 + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = doy - (153 * mp + 2) / 5 + 1;
    let m = if mp < 10 { mp + 3 } else { mp - 9 };
    let y = if m <= 2 { y + 1 } else { y };
    format!("{d:02}{m:02}{y:04}")
}

#[async_trait]
impl Plugin for LogFileCreatorPlugin {
    fn name(&self) -> &'static str {
        "logfilecreator"
    }

    async fn initialize(&self, config: &PluginConfig) -> Result<(), PluginError> {
        let mut settings = self.settings.lock().unwrap();
        if let Some(path) = config.get("log_path").and_then(|v| v.as_str().ok()) {
            settings.log_path = path.to_string();
        }
        if let Some(name) = config.get("base_filename").and_then(|v| v.as_str().ok()) {
            settings.base_filename = name.to_string();
        }
        Ok(())
    }

    async fn execute(
        &self,
        _cancellation: CancellationToken,
        _request: &PluginRequest,
        shared: &mut SharedContext,
    ) -> Result<Value, PluginError> {
        let filename = self.filename();
        if let Some(dir) = filename.parent() {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| PluginError::Execute(format!("could not create log directory: {e}")))?;
        }

        let entry = shared
            .get_str(expressops_core::context::INPUT_KEY)
            .ok()
            .flatten()
            .unwrap_or("")
            .to_string();

        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&filename)
            .map_err(|e| PluginError::Execute(format!("could not open log file: {e}")))?;
        writeln!(file, "{entry}").map_err(|e| PluginError::Execute(e.to_string()))?;

        Ok(Value::Map(
            [
                ("status".to_string(), Value::Str("success".to_string())),
                ("filename".to_string(), Value::Str(filename.display().to_string())),
            ]
            .into_iter()
            .collect(),
        ))
    }

    fn format_result(&self, value: &Value) -> Result<String, PluginError> {
        let map = value.as_map().map_err(|e| PluginError::Format(e.to_string()))?;
        let filename = map.get("filename").and_then(|v| v.as_str().ok()).unwrap_or("");
        Ok(format!("log entry created at {filename}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filename_is_stable_within_the_same_day() {
        let plugin = LogFileCreatorPlugin::default();
        assert_eq!(plugin.filename(), plugin.filename());
    }
}
