//! Prometheus metrics facade. The engine and HTTP layer only ever call the
//! named operations below; nothing outside this crate touches a
//! `prometheus::Registry` directly.

use prometheus::{
    CounterVec, Encoder, Gauge, HistogramVec, Opts, Registry, TextEncoder,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("failed to register metric: {0}")]
    Registration(#[from] prometheus::Error),
}

pub struct Metrics {
    registry: Registry,
    flows_executed_total: CounterVec,
    flow_duration_seconds: HistogramVec,
    active_plugins: Gauge,
    plugin_errors_total: CounterVec,
    http_requests_total: CounterVec,
    http_request_duration_seconds: HistogramVec,
    liveness_probes_total: CounterVec,
    steps_executed_total: CounterVec,
    step_duration_seconds: HistogramVec,
    active_handlers: Gauge,
}

impl Metrics {
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new();

        let flows_executed_total = CounterVec::new(
            Opts::new("expressops_flows_executed_total", "The total number of flows executed"),
            &["flow_name", "status"],
        )?;
        let flow_duration_seconds = HistogramVec::new(
            prometheus::HistogramOpts::new(
                "expressops_flow_duration_seconds",
                "Flow execution duration in seconds",
            ),
            &["flow_name"],
        )?;
        let active_plugins =
            Gauge::new("expressops_active_plugins", "The number of active plugins")?;
        let plugin_errors_total = CounterVec::new(
            Opts::new("expressops_plugin_errors_total", "The total number of plugin errors"),
            &["plugin_name", "error_type"],
        )?;
        let http_requests_total = CounterVec::new(
            Opts::new("expressops_http_requests_total", "Total HTTP requests served"),
            &["path", "status"],
        )?;
        let http_request_duration_seconds = HistogramVec::new(
            prometheus::HistogramOpts::new(
                "expressops_http_request_duration_seconds",
                "HTTP request duration in seconds",
            ),
            &["path"],
        )?;

        registry.register(Box::new(flows_executed_total.clone()))?;
        registry.register(Box::new(flow_duration_seconds.clone()))?;
        registry.register(Box::new(active_plugins.clone()))?;
        registry.register(Box::new(plugin_errors_total.clone()))?;
        let liveness_probes_total = CounterVec::new(
            Opts::new("expressops_liveness_probes_total", "Liveness probe hits by client kind"),
            &["probe_source"],
        )?;

        registry.register(Box::new(http_requests_total.clone()))?;
        registry.register(Box::new(http_request_duration_seconds.clone()))?;
        registry.register(Box::new(liveness_probes_total.clone()))?;

        let steps_executed_total = CounterVec::new(
            Opts::new("expressops_steps_executed_total", "The total number of steps executed"),
            &["plugin_ref", "status"],
        )?;
        let step_duration_seconds = HistogramVec::new(
            prometheus::HistogramOpts::new(
                "expressops_step_duration_seconds",
                "Step execution duration in seconds",
            ),
            &["plugin_ref"],
        )?;
        let active_handlers =
            Gauge::new("expressops_active_handlers", "The number of in-flight flow requests")?;

        registry.register(Box::new(steps_executed_total.clone()))?;
        registry.register(Box::new(step_duration_seconds.clone()))?;
        registry.register(Box::new(active_handlers.clone()))?;

        Ok(Self {
            registry,
            flows_executed_total,
            flow_duration_seconds,
            active_plugins,
            plugin_errors_total,
            http_requests_total,
            http_request_duration_seconds,
            liveness_probes_total,
            steps_executed_total,
            step_duration_seconds,
            active_handlers,
        })
    }

    /// `status` is one of `success`, `error`, `error_plugin_not_found`,
    /// `error_dependency_failure`, `error_bad_request`, `error_flow_not_found`.
    pub fn record_flow_execution(&self, flow_name: &str, duration_seconds: f64, status: &str) {
        self.flows_executed_total.with_label_values(&[flow_name, status]).inc();
        self.flow_duration_seconds.with_label_values(&[flow_name]).observe(duration_seconds);
    }

    pub fn record_plugin_error(&self, plugin_name: &str, error_type: &str) {
        self.plugin_errors_total.with_label_values(&[plugin_name, error_type]).inc();
    }

    pub fn set_active_plugins(&self, count: usize) {
        self.active_plugins.set(count as f64);
    }

    /// `status` is one of `success`, `error`, `error_dependency_failure`.
    pub fn record_step_execution(&self, plugin_ref: &str, status: &str, duration_seconds: f64) {
        self.steps_executed_total.with_label_values(&[plugin_ref, status]).inc();
        self.step_duration_seconds.with_label_values(&[plugin_ref]).observe(duration_seconds);
    }

    /// Call once a flow request starts executing its plan, and once more
    /// when it finishes, so `expressops_active_handlers` tracks in-flight
    /// requests rather than just total throughput.
    pub fn record_handler_started(&self) {
        self.active_handlers.inc();
    }

    pub fn record_handler_finished(&self) {
        self.active_handlers.dec();
    }

    pub fn record_http_request(&self, path: &str, status: u16, duration_seconds: f64) {
        self.http_requests_total.with_label_values(&[path, &status.to_string()]).inc();
        self.http_request_duration_seconds.with_label_values(&[path]).observe(duration_seconds);
    }

    /// Distinguishes a Kubernetes `kube-probe/*` liveness check from an
    /// external caller of `/healthz` for metric labelling purposes only;
    /// both get the same 200 OK response.
    pub fn record_liveness_probe(&self, probe_source: &str) {
        self.liveness_probes_total.with_label_values(&[probe_source]).inc();
    }

    /// Renders the current state of every registered metric in the
    /// Prometheus text exposition format, for the `/metrics` endpoint.
    pub fn render(&self) -> Result<String, MetricsError> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(MetricsError::Registration)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_includes_registered_metric_names() {
        let metrics = Metrics::new().unwrap();
        metrics.record_flow_execution("sample", 0.5, "success");
        metrics.set_active_plugins(3);
        let rendered = metrics.render().unwrap();
        assert!(rendered.contains("expressops_flows_executed_total"));
        assert!(rendered.contains("expressops_active_plugins"));
    }

    #[test]
    fn failed_flow_increments_failure_label() {
        let metrics = Metrics::new().unwrap();
        metrics.record_flow_execution("sample", 0.1, "error_dependency_failure");
        let rendered = metrics.render().unwrap();
        assert!(rendered.contains("status=\"error_dependency_failure\""));
    }

    #[test]
    fn liveness_probe_source_is_labeled() {
        let metrics = Metrics::new().unwrap();
        metrics.record_liveness_probe("kubernetes");
        let rendered = metrics.render().unwrap();
        assert!(rendered.contains("probe_source=\"kubernetes\""));
    }

    #[test]
    fn step_execution_is_labeled_by_plugin_and_status() {
        let metrics = Metrics::new().unwrap();
        metrics.record_step_execution("health-check", "success", 0.01);
        let rendered = metrics.render().unwrap();
        assert!(rendered.contains("expressops_steps_executed_total"));
        assert!(rendered.contains("plugin_ref=\"health-check\""));
    }

    #[test]
    fn active_handlers_gauge_tracks_inc_and_dec() {
        let metrics = Metrics::new().unwrap();
        metrics.record_handler_started();
        metrics.record_handler_started();
        metrics.record_handler_finished();
        let rendered = metrics.render().unwrap();
        assert!(rendered.contains("expressops_active_handlers 1"));
    }

    #[test]
    fn plugin_error_is_labeled_by_error_type() {
        let metrics = Metrics::new().unwrap();
        metrics.record_plugin_error("slack-notifier", "execution_error");
        let rendered = metrics.render().unwrap();
        assert!(rendered.contains("error_type=\"execution_error\""));
    }
}
