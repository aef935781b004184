//! Engine-level error kinds surfaced by the planner, scheduler and registries.
//!
//! Mirrors the shape of `gini_core::kernel::error::Error`: a thin
//! `thiserror` enum that aggregates subsystem errors via `#[from]`,
//! without that crate's accreted deprecated variants.

use thiserror::Error;

use crate::value::ValueError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("flow '{0}' not found")]
    FlowNotFound(String),

    #[error("invalid flow '{flow}': {reason}")]
    InvalidFlow { flow: String, reason: String },

    #[error("plugin '{0}' not found")]
    PluginNotFound(String),

    #[error("plugin '{plugin}' execution failed: {message}")]
    PluginExecuteError { plugin: String, message: String },

    #[error("skipped due to dependency failure")]
    DependencyFailure,

    #[error("request cancelled")]
    ContextCancelled,

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Value(#[from] ValueError),
}

pub type Result<T> = std::result::Result<T, EngineError>;
