//! Deserialized shape of the top-level YAML configuration file.

use std::collections::BTreeMap;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub plugins: Vec<PluginSpec>,
    #[serde(default)]
    pub flows: Vec<FlowSpec>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "debug".to_string(), format: "text".to_string() }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
    pub address: String,
    #[serde(rename = "timeoutSeconds")]
    pub timeout_seconds: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: 8080, address: "0.0.0.0".to_string(), timeout_seconds: 4 }
    }
}

fn default_plugin_type() -> String {
    "dynamic".to_string()
}

/// One entry of the `plugins` list: the dynamic-library path to load plus
/// the static config handed to its `Initialize` call.
///
/// `type` selects how `path` is interpreted: `"dynamic"` (the default)
/// loads a `cdylib` from `path` on disk; `"builtin"` treats `path` as the
/// name of one of the statically-linked plugins shipped with the engine
/// instead of a filesystem path.
#[derive(Debug, Clone, Deserialize)]
pub struct PluginSpec {
    pub name: String,
    pub path: String,
    #[serde(rename = "type", default = "default_plugin_type")]
    pub plugin_type: String,
    #[serde(default)]
    pub config: BTreeMap<String, serde_yaml::Value>,
}

impl PluginSpec {
    /// The path form the plugin loader expects: `path` unchanged for a
    /// `"dynamic"` plugin, or `builtin:<path>` when `type` is `"builtin"`.
    pub fn loader_path(&self) -> String {
        if self.plugin_type == "builtin" {
            format!("builtin:{}", self.path)
        } else {
            self.path.clone()
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct FlowSpec {
    pub name: String,
    #[serde(rename = "customHandler", default)]
    pub custom_handler: Option<String>,
    #[serde(default)]
    pub pipeline: Vec<StepSpec>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StepSpec {
    #[serde(rename = "pluginRef", default)]
    pub plugin_ref: String,
    #[serde(default)]
    pub parameters: BTreeMap<String, serde_yaml::Value>,
    #[serde(rename = "dependsOn", default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub parallel: bool,
}
