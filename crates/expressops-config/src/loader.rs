use std::env;
use std::path::Path;

use expressops_core::FlowRegistryBuilder;

use crate::convert::yaml_value_to_value;
use crate::env_expand::expand_text;
use crate::error::ConfigError;
use crate::model::Config;

/// Loads, expands and parses the YAML config at `path`, then applies the
/// recognized `SERVER_*`/`LOG_*`/`TIMEOUT_SECONDS` environment overrides on
/// top of whatever the file set.
pub fn load(path: &Path) -> Result<Config, ConfigError> {
    let raw = std::fs::read_to_string(path)
        .map_err(|source| ConfigError::Read { path: path.display().to_string(), source })?;
    let expanded = expand_text(&raw)?;
    let mut config: Config = serde_yaml::from_str(&expanded)?;
    apply_env_overrides(&mut config);
    Ok(config)
}

fn apply_env_overrides(config: &mut Config) {
    if let Ok(port) = env::var("SERVER_PORT") {
        if let Ok(port) = port.parse() {
            config.server.port = port;
        }
    }
    if let Ok(address) = env::var("SERVER_ADDRESS") {
        config.server.address = address;
    }
    if let Ok(timeout) = env::var("TIMEOUT_SECONDS") {
        if let Ok(timeout) = timeout.parse() {
            config.server.timeout_seconds = timeout;
        }
    }
    if let Ok(level) = env::var("LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Ok(format) = env::var("LOG_FORMAT") {
        config.logging.format = format;
    }
}

/// Builds the process-wide flow registry from a loaded config's `flows`
/// section.
pub fn build_flow_registry(config: &Config) -> Result<expressops_core::FlowRegistry, ConfigError> {
    let mut builder = FlowRegistryBuilder::new();
    for flow_spec in &config.flows {
        builder.register(expressops_core::Flow::try_from(flow_spec)?);
    }
    Ok(builder.build())
}

/// Resolves one plugin-config mapping to the engine's own `PluginConfig`,
/// used right before calling a plugin's `initialize`.
pub fn plugin_config_to_engine(
    spec: &crate::model::PluginSpec,
) -> Result<expressops_core::PluginConfig, ConfigError> {
    let mut out = std::collections::BTreeMap::new();
    for (k, v) in &spec.config {
        out.insert(k.clone(), yaml_value_to_value(v)?);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(contents: &str) -> std::path::PathBuf {
        let mut path = std::env::temp_dir();
        path.push(format!("expressops-config-test-{}.yaml", contents.len()));
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn defaults_apply_when_sections_are_absent() {
        let path = write_temp("plugins: []\nflows: []\n");
        let config = load(&path).unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.address, "0.0.0.0");
        assert_eq!(config.logging.level, "debug");
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn env_override_wins_over_file_value() {
        let path = write_temp("server:\n  port: 9000\nplugins: []\nflows: []\n");
        unsafe { std::env::set_var("SERVER_PORT", "9999") };
        let config = load(&path).unwrap();
        assert_eq!(config.server.port, 9999);
        unsafe { std::env::remove_var("SERVER_PORT") };
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn flow_registry_builds_from_parsed_flows() {
        let path = write_temp(
            "plugins: []\nflows:\n  - name: sample\n    pipeline:\n      - pluginRef: a\n",
        );
        let config = load(&path).unwrap();
        let registry = build_flow_registry(&config).unwrap();
        assert!(registry.lookup("sample").is_ok());
        std::fs::remove_file(path).ok();
    }
}
