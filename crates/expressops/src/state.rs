use std::sync::Arc;
use std::time::Duration;

use expressops_core::{FlowRegistry, StepScheduler};
use expressops_metrics::Metrics;

#[derive(Clone)]
pub struct AppState {
    pub flows: FlowRegistry,
    pub scheduler: Arc<StepScheduler>,
    pub metrics: Arc<Metrics>,
    pub flow_timeout: Duration,
}
