//! HTTP surface: `/flow`, `/healthz`, `/metrics`.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router;
use tower_http::trace::TraceLayer;

use expressops_core::{
    ExecutionPlanner, FlowResponse, PluginRequest, RequestCancellation, StepOutcome, Value,
};

use crate::params::parse_params;
use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/flow", get(handle_flow))
        .route("/healthz", get(handle_healthz))
        .route("/metrics", get(handle_metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, serde::Deserialize)]
pub struct FlowQuery {
    #[serde(rename = "flowName")]
    flow_name: Option<String>,
    #[serde(default)]
    params: String,
}

async fn handle_flow(
    State(state): State<AppState>,
    Query(query): Query<FlowQuery>,
) -> Response {
    let started = Instant::now();

    let Some(flow_name) = query.flow_name.filter(|n| !n.is_empty()) else {
        state.metrics.record_http_request("/flow", 400, started.elapsed().as_secs_f64());
        return (StatusCode::BAD_REQUEST, "missing required query parameter 'flowName'").into_response();
    };

    let flow = match state.flows.lookup(&flow_name) {
        Ok(flow) => flow,
        Err(_) => {
            state.metrics.record_flow_execution(&flow_name, started.elapsed().as_secs_f64(), "error_flow_not_found");
            state.metrics.record_http_request("/flow", 404, started.elapsed().as_secs_f64());
            return (StatusCode::NOT_FOUND, format!("flow '{flow_name}' not found")).into_response();
        }
    };

    let param_values = parse_params(&query.params);
    let query_strings: BTreeMap<String, String> = param_values
        .iter()
        .filter_map(|(k, v)| v.as_str().ok().map(|s| (k.clone(), s.to_string())))
        .collect();

    let mut base_context: BTreeMap<String, Value> = param_values;
    base_context.insert(expressops_core::context::FLOW_REGISTRY_KEY.to_string(), flow_registry_summary(&state.flows));

    let plan = match ExecutionPlanner::plan(&flow, &base_context) {
        Ok(plan) => plan,
        Err(err) => {
            state.metrics.record_flow_execution(&flow_name, started.elapsed().as_secs_f64(), "error");
            state.metrics.record_http_request("/flow", 500, started.elapsed().as_secs_f64());
            return (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response();
        }
    };

    let cancellation = RequestCancellation::new();
    let timeout_cancellation = cancellation.clone();
    let flow_timeout = state.flow_timeout;
    let timeout_guard = tokio::spawn(async move {
        tokio::time::sleep(flow_timeout).await;
        timeout_cancellation.cancel();
    });

    let request = Arc::new(PluginRequest { query: query_strings });
    state.metrics.record_handler_started();
    let reports = state.scheduler.run(Arc::new(plan), request, cancellation).await;
    state.metrics.record_handler_finished();
    timeout_guard.abort();

    let status_label = flow_status_label(&reports);
    state.metrics.record_flow_execution(&flow_name, started.elapsed().as_secs_f64(), status_label);

    let response = FlowResponse::from_reports(flow_name, reports);
    state.metrics.record_http_request("/flow", 200, started.elapsed().as_secs_f64());

    (StatusCode::OK, Json(response)).into_response()
}

/// Builds the `flow_registry` shared-context value the flow-lister plugin
/// reads: one map per registered flow with its name, `customHandler`
/// description, and the `pluginRef`s of its non-comment steps.
fn flow_registry_summary(flows: &expressops_core::FlowRegistry) -> Value {
    let summaries = flows
        .all()
        .into_iter()
        .map(|flow| {
            let plugins: Vec<Value> = flow
                .pipeline
                .iter()
                .filter(|step| !step.is_comment())
                .map(|step| Value::Str(step.plugin_ref.clone()))
                .collect();
            Value::Map(
                [
                    ("name".to_string(), Value::Str(flow.name.clone())),
                    ("description".to_string(), Value::Str(flow.custom_handler.clone().unwrap_or_default())),
                    ("plugin_count".to_string(), Value::Int(plugins.len() as i64)),
                    ("plugins".to_string(), Value::List(plugins)),
                ]
                .into_iter()
                .collect(),
            )
        })
        .collect();
    Value::List(summaries)
}

fn flow_status_label(reports: &[expressops_core::StepReport]) -> &'static str {
    if reports.iter().all(|r| matches!(r.outcome, StepOutcome::Succeeded { .. })) {
        return "success";
    }
    if reports.iter().any(|r| matches!(r.outcome, StepOutcome::SkippedDependencyFailure)) {
        return "error_dependency_failure";
    }
    if reports
        .iter()
        .any(|r| matches!(&r.outcome, StepOutcome::Failed { message } if message.contains("not found")))
    {
        return "error_plugin_not_found";
    }
    "error"
}

const KUBE_PROBE_PREFIX: &str = "kube-probe";

async fn handle_healthz(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let user_agent = headers.get(axum::http::header::USER_AGENT).and_then(|v| v.to_str().ok()).unwrap_or("");
    let probe_source = if user_agent.starts_with(KUBE_PROBE_PREFIX) { "kubernetes" } else { "external" };
    state.metrics.record_liveness_probe(probe_source);
    (StatusCode::OK, "OK").into_response()
}

async fn handle_metrics(State(state): State<AppState>) -> Response {
    match state.metrics.render() {
        Ok(body) => (StatusCode::OK, body).into_response(),
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response(),
    }
}
