//! The plugin contract.
//!
//! Three lifecycle methods: `initialize`, `execute`, `format_result`.
//! Modelled the way `gini_core::plugin_system::traits::Plugin` shapes its
//! own contract — a `Send + Sync` async trait plugins implement once and
//! the engine calls many times concurrently.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::context::SharedContext;
use crate::value::Value;

#[derive(Debug, Error)]
pub enum PluginError {
    #[error("plugin initialization failed: {0}")]
    Init(String),
    #[error("plugin execution failed: {0}")]
    Execute(String),
    #[error("result formatting failed: {0}")]
    Format(String),
}

/// Read-only view of the originating HTTP request, handed to `execute` so
/// plugins may inspect query parameters without depending on the HTTP
/// crate directly.
#[derive(Debug, Clone, Default)]
pub struct PluginRequest {
    pub query: BTreeMap<String, String>,
}

impl PluginRequest {
    pub fn query(&self, key: &str) -> Option<&str> {
        self.query.get(key).map(|s| s.as_str())
    }
}

/// The ambient deadline/cancellation carried into every `execute` call.
/// The request-level token is the single source of truth for cancellation;
/// every step's token is a child of it.
#[derive(Clone)]
pub struct RequestCancellation {
    token: CancellationToken,
}

impl RequestCancellation {
    pub fn new() -> Self {
        Self { token: CancellationToken::new() }
    }

    pub fn child_token(&self) -> CancellationToken {
        self.token.child_token()
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }
}

impl Default for RequestCancellation {
    fn default() -> Self {
        Self::new()
    }
}

/// Plugin configuration as parsed from YAML, with `$VAR` references
/// already expanded to environment values.
pub type PluginConfig = BTreeMap<String, Value>;

/// Core trait every extension implements. `execute` may be called
/// concurrently from many in-flight requests; implementations must be
/// internally thread-safe.
#[async_trait]
pub trait Plugin: Send + Sync {
    /// Stable identity used in config/logs; does not have to match the
    /// registry name a deployment chooses for this instance.
    fn name(&self) -> &'static str;

    /// Called exactly once, before any flow executes. Failure aborts
    /// process startup.
    async fn initialize(&self, config: &PluginConfig) -> Result<(), PluginError>;

    /// Called 0..N times concurrently, once per participating step per
    /// request. `shared` is this step's private context; writes to it are
    /// visible only to the step's own dependents via the scheduler.
    async fn execute(
        &self,
        cancellation: CancellationToken,
        request: &PluginRequest,
        shared: &mut SharedContext,
    ) -> Result<Value, PluginError>;

    /// Pure transformation from an `execute` result to a human-readable
    /// string. Must not perform I/O.
    ///
    /// Returning `Ok(s)` where `s` starts with [`MULTILINE_LOG_SENTINEL`]
    /// tells the engine to split the remainder on [`MULTILINE_LOG_SEPARATOR`]
    /// and log each segment as its own line.
    fn format_result(&self, value: &Value) -> Result<String, PluginError> {
        Ok(value.to_string())
    }
}

pub const MULTILINE_LOG_SENTINEL: &str = "__MULTILINE_LOG__";
pub const MULTILINE_LOG_SEPARATOR: char = '\u{1f}'; // ASCII unit separator

/// Splits a `format_result` output on the multiline-log convention,
/// returning `None` if the string doesn't carry the sentinel.
pub fn split_multiline_log(formatted: &str) -> Option<Vec<&str>> {
    let rest = formatted.strip_prefix(MULTILINE_LOG_SENTINEL)?;
    Some(rest.split(MULTILINE_LOG_SEPARATOR).collect())
}

/// Type-erased handle stored in the registry.
pub type SharedPlugin = Arc<dyn Plugin>;
