//! Resolves the `plugins` section of a loaded config into a populated
//! [`PluginRegistry`], choosing between a built-in constructor and the
//! dynamic loader based on the configured `path`.
//!
//! A `path` of the form `builtin:<name>` resolves to one of the plugins
//! in [`builtins`]; any other path is loaded as a `cdylib` through
//! [`DynamicLoader`]. Statically linking a plugin rather than loading it
//! from disk trades runtime extensibility for portability — the
//! built-ins below are exactly that, wired in at compile time.

use std::path::Path;
use std::sync::Arc;

use expressops_core::{PluginConfig, PluginRegistry, PluginRegistryBuilder};
use thiserror::Error;

use crate::builtins;
use crate::loader::{DynamicLoader, PluginLoadError};

const BUILTIN_PREFIX: &str = "builtin:";

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("unknown built-in plugin '{0}'")]
    UnknownBuiltin(String),

    #[error(transparent)]
    Load(#[from] PluginLoadError),

    #[error("plugin '{name}' failed to initialize: {source}")]
    Init { name: String, source: expressops_core::PluginError },
}

/// One entry of the config's `plugins` list, already env-expanded.
pub struct PluginEntry {
    pub name: String,
    pub path: String,
    pub config: PluginConfig,
}

/// Loads/constructs every entry and registers it under its configured
/// `name`, initializing each before returning the frozen registry. Keeps
/// the libraries loaded by [`DynamicLoader`] alive for the registry's
/// entire lifetime by leaking them — they must outlive every plugin call,
/// which in practice means the whole process.
pub async fn build_registry(entries: &[PluginEntry]) -> Result<PluginRegistry, ResolveError> {
    let mut builder = PluginRegistryBuilder::new();

    for entry in entries {
        let plugin = if let Some(builtin_name) = entry.path.strip_prefix(BUILTIN_PREFIX) {
            construct_builtin(builtin_name).ok_or_else(|| ResolveError::UnknownBuiltin(builtin_name.to_string()))?
        } else {
            let loaded = unsafe { DynamicLoader::load(Path::new(&entry.path))? };
            let plugin = loaded.plugin();
            // The library must stay mapped for as long as the plugin is
            // callable; leaking it ties its lifetime to the process.
            Box::leak(Box::new(loaded));
            plugin
        };

        plugin
            .initialize(&entry.config)
            .await
            .map_err(|source| ResolveError::Init { name: entry.name.clone(), source })?;

        builder.register(entry.name.clone(), plugin);
    }

    Ok(builder.build())
}

fn construct_builtin(name: &str) -> Option<expressops_core::SharedPlugin> {
    let plugin: expressops_core::SharedPlugin = match name {
        "health-check" => Arc::new(builtins::HealthCheckPlugin::default()),
        "slack" => Arc::new(builtins::SlackPlugin::default()),
        "clean-disk" => Arc::new(builtins::DiskCleanerPlugin::default()),
        "log-cleaner" => Arc::new(builtins::LogCleanerPlugin::default()),
        "logfilecreator" => Arc::new(builtins::LogFileCreatorPlugin::default()),
        "flow-lister" => Arc::new(builtins::FlowListerPlugin),
        "kubehealth" => Arc::new(builtins::KubeHealthPlugin::default()),
        "health-alert-formatter" => Arc::new(builtins::HealthAlertFormatterPlugin),
        _ => return None,
    };
    Some(plugin)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn builtin_prefix_resolves_known_plugin() {
        let entries = vec![PluginEntry {
            name: "hc".to_string(),
            path: "builtin:health-check".to_string(),
            config: Default::default(),
        }];
        let registry = build_registry(&entries).await.unwrap();
        assert!(registry.contains("hc"));
    }

    #[tokio::test]
    async fn unknown_builtin_name_is_an_error() {
        let entries = vec![PluginEntry {
            name: "x".to_string(),
            path: "builtin:does-not-exist".to_string(),
            config: Default::default(),
        }];
        let err = build_registry(&entries).await.unwrap_err();
        assert!(matches!(err, ResolveError::UnknownBuiltin(_)));
    }
}
