pub mod params;
pub mod server;
pub mod state;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use expressops_metrics::Metrics;
use expressops_plugins::{build_registry, PluginEntry, ResolveError};
use tracing_subscriber::EnvFilter;

use crate::state::AppState;

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("failed to load config from {path}: {source}")]
    Config { path: String, source: expressops_config::ConfigError },

    #[error("invalid plugin configuration: {0}")]
    PluginConfig(expressops_config::ConfigError),

    #[error("plugin initialization failed: {0}")]
    PluginInit(#[from] ResolveError),

    #[error("invalid flow configuration: {0}")]
    FlowConfig(expressops_config::ConfigError),

    #[error("failed to initialize metrics: {0}")]
    Metrics(#[from] expressops_metrics::MetricsError),
}

/// Loads the config at `path` and builds the server's [`AppState`] plus its
/// configured bind address, without binding a listener or starting a
/// runtime — split out from `main` so tests can build a router against a
/// real, fully-wired state.
pub async fn build_state(path: &Path) -> Result<(AppState, String), StartupError> {
    let config = expressops_config::load(path)
        .map_err(|source| StartupError::Config { path: path.display().to_string(), source })?;

    init_tracing(&config.logging);

    let entries: Vec<PluginEntry> = config
        .plugins
        .iter()
        .map(|spec| {
            expressops_config::plugin_config_to_engine(spec)
                .map(|engine_config| PluginEntry { name: spec.name.clone(), path: spec.loader_path(), config: engine_config })
        })
        .collect::<Result<_, _>>()
        .map_err(StartupError::PluginConfig)?;

    let plugin_count = entries.len();
    let plugin_registry = build_registry(&entries).await?;

    let flow_registry =
        expressops_config::build_flow_registry(&config).map_err(StartupError::FlowConfig)?;

    let metrics = Arc::new(Metrics::new()?);
    metrics.set_active_plugins(plugin_count);

    let scheduler = Arc::new(expressops_core::StepScheduler::new(plugin_registry, metrics.clone()));
    let address = format!("{}:{}", config.server.address, config.server.port);

    let state = AppState {
        flows: flow_registry,
        scheduler,
        metrics,
        flow_timeout: Duration::from_secs(config.server.timeout_seconds),
    };
    Ok((state, address))
}

/// Installs the global `tracing` subscriber from the configured level and
/// format. Only the first call in a process wins; later calls (e.g. from
/// tests building multiple `AppState`s) are silently ignored.
fn init_tracing(logging: &expressops_config::LoggingConfig) {
    let filter = EnvFilter::try_new(&logging.level).unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);
    let _ = if logging.format == "json" { subscriber.json().try_init() } else { subscriber.try_init() };
}
