//! YAML configuration loading, environment-variable expansion, and the
//! conversions from the YAML-facing model into the engine's own types.

pub mod convert;
pub mod env_expand;
pub mod error;
pub mod loader;
pub mod model;

pub use error::ConfigError;
pub use loader::{build_flow_registry, load, plugin_config_to_engine};
pub use model::{Config, FlowSpec, LoggingConfig, PluginSpec, ServerConfig, StepSpec};
