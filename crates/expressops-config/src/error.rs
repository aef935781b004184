use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read { path: String, source: std::io::Error },

    #[error("required environment variable {0} is not set")]
    MissingEnvVar(String),

    #[error("failed to parse YAML: {0}")]
    Parse(#[from] serde_yaml::Error),
}
