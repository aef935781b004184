//! Concurrent scheduler: walks an [`ExecutionPlan`] and drives each
//! [`StepNode`] through the plugin contract once its dependencies have
//! settled.
//!
//! Each node's completion is announced through its own `Notify` rather
//! than a shared poll loop — a dependent task calls `notified()` on every
//! dependency it's waiting for and wakes only when that dependency
//! actually finishes, instead of spinning on a shared flag.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

use expressops_metrics::Metrics;

use crate::error::EngineError;
use crate::planner::{ExecutionPlan, StepNode};
use crate::plugin::{split_multiline_log, PluginRequest, RequestCancellation};
use crate::registry::PluginRegistry;
use crate::value::Value;

/// Outcome of running a single step, independent of whether its format
/// step succeeded.
#[derive(Debug, Clone)]
pub enum StepOutcome {
    Succeeded { result: Value, formatted: String },
    Failed { message: String },
    SkippedDependencyFailure,
}

#[derive(Debug, Clone)]
pub struct StepReport {
    pub plugin_ref: String,
    pub outcome: StepOutcome,
    pub duration: Duration,
}

pub struct StepScheduler {
    registry: PluginRegistry,
    metrics: Arc<Metrics>,
}

impl StepScheduler {
    pub fn new(registry: PluginRegistry, metrics: Arc<Metrics>) -> Self {
        Self { registry, metrics }
    }

    /// Runs every node of `plan` to completion, respecting dependency
    /// edges and `cancellation`. Returns reports in the order steps
    /// finished, not pipeline order — callers that need pipeline order
    /// re-sort by `plugin_ref`/`index` as needed.
    pub async fn run(
        &self,
        plan: Arc<ExecutionPlan>,
        request: Arc<PluginRequest>,
        cancellation: RequestCancellation,
    ) -> Vec<StepReport> {
        let reports: Arc<Mutex<Vec<StepReport>>> = Arc::new(Mutex::new(Vec::with_capacity(plan.nodes.len())));

        let mut handles = Vec::with_capacity(plan.nodes.len());
        for node in plan.nodes.iter().cloned() {
            let plan = plan.clone();
            let request = request.clone();
            let registry = self.registry.clone();
            let cancellation = cancellation.clone();
            let reports = reports.clone();
            let metrics = self.metrics.clone();
            handles.push(tokio::spawn(async move {
                run_node(node, plan, request, registry, cancellation, reports, metrics).await;
            }));
        }

        for handle in handles {
            let _ = handle.await;
        }

        Arc::try_unwrap(reports).map(Mutex::into_inner).unwrap_or_default()
    }
}

async fn run_node(
    node: Arc<StepNode>,
    plan: Arc<ExecutionPlan>,
    request: Arc<PluginRequest>,
    registry: PluginRegistry,
    cancellation: RequestCancellation,
    reports: Arc<Mutex<Vec<StepReport>>>,
    metrics: Arc<Metrics>,
) {
    // Wait for every dependency to settle, accumulating failure. The
    // `Notified` future is created and enabled before the flag check so a
    // `notify_waiters()` landing in between can't be missed — enabling
    // arms the future to catch any notification from this point on.
    let mut dependency_failed = false;
    for &dep_idx in &node.dependencies {
        let dep = &plan.nodes[dep_idx];
        while !dep.is_executed() {
            let notified = dep.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if !dep.is_executed() {
                notified.await;
            }
        }
        if dep.has_error() {
            dependency_failed = true;
        }
    }

    let started = Instant::now();

    if dependency_failed {
        finish(&node, &reports, &metrics, StepOutcome::SkippedDependencyFailure, started, true).await;
        return;
    }

    if cancellation.is_cancelled() {
        finish(
            &node,
            &reports,
            &metrics,
            StepOutcome::Failed { message: EngineError::ContextCancelled.to_string() },
            started,
            true,
        )
        .await;
        return;
    }

    // Seed this step's shared context with each dependency's published
    // result before invoking the plugin.
    {
        let mut shared = node.shared.lock().await;
        for &dep_idx in &node.dependencies {
            let dep = &plan.nodes[dep_idx];
            let dep_result = dep.result.lock().await;
            if let Some(value) = dep_result.as_ref() {
                shared.record_dependency_result(&dep.step.plugin_ref, value);
            }
        }
    }

    let plugin = match registry.lookup(&node.step.plugin_ref) {
        Ok(plugin) => plugin,
        Err(err) => {
            finish(&node, &reports, &metrics, StepOutcome::Failed { message: err.to_string() }, started, true).await;
            return;
        }
    };

    let step_token = cancellation.child_token();
    let execute_result = {
        let mut shared = node.shared.lock().await;
        plugin.execute(step_token, &request, &mut shared).await
    };

    let outcome = match execute_result {
        Ok(value) => {
            let formatted = plugin.format_result(&value).unwrap_or_else(|_| value.to_string());
            if let Some(lines) = split_multiline_log(&formatted) {
                for line in lines {
                    tracing::info!(step = %node.step.plugin_ref, "{line}");
                }
            } else {
                tracing::info!(step = %node.step.plugin_ref, result = %formatted, "step completed");
            }
            *node.result.lock().await = Some(value.clone());
            StepOutcome::Succeeded { result: value, formatted }
        }
        Err(err) => StepOutcome::Failed { message: err.to_string() },
    };

    let is_error = matches!(outcome, StepOutcome::Failed { .. });
    finish(&node, &reports, &metrics, outcome, started, is_error).await;
}

/// `status` label for `expressops_steps_executed_total`/`..._duration_seconds`.
fn step_status_label(outcome: &StepOutcome) -> &'static str {
    match outcome {
        StepOutcome::Succeeded { .. } => "success",
        StepOutcome::SkippedDependencyFailure => "error_dependency_failure",
        StepOutcome::Failed { .. } => "error",
    }
}

/// Classifies a `StepOutcome::Failed` message into `plugin_errors_total`'s
/// `error_type` label, reusing the same substring conventions
/// `EngineError`'s `Display` impls produce.
fn classify_failure(message: &str) -> &'static str {
    if message.contains("not found") {
        "plugin_not_found"
    } else if message.contains("cancelled") {
        "cancelled"
    } else {
        "execution_error"
    }
}

async fn finish(
    node: &Arc<StepNode>,
    reports: &Arc<Mutex<Vec<StepReport>>>,
    metrics: &Arc<Metrics>,
    outcome: StepOutcome,
    started: Instant,
    is_error: bool,
) {
    node.has_error.store(is_error, Ordering::Release);
    node.executed.store(true, Ordering::Release);
    node.notify.notify_waiters();

    let duration = started.elapsed();
    metrics.record_step_execution(&node.step.plugin_ref, step_status_label(&outcome), duration.as_secs_f64());
    if let StepOutcome::Failed { message } = &outcome {
        metrics.record_plugin_error(&node.step.plugin_ref, classify_failure(message));
    }

    let report = StepReport { plugin_ref: node.step.plugin_ref.clone(), outcome, duration };
    reports.lock().await.push(report);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::SharedContext;
    use crate::flow::{Flow, Step};
    use crate::planner::ExecutionPlanner;
    use crate::plugin::{Plugin, PluginConfig, PluginError};
    use crate::registry::PluginRegistryBuilder;
    use async_trait::async_trait;
    use std::collections::BTreeMap;
    use tokio_util::sync::CancellationToken;

    struct Adder {
        name: &'static str,
        amount: i64,
    }

    #[async_trait]
    impl Plugin for Adder {
        fn name(&self) -> &'static str {
            self.name
        }
        async fn initialize(&self, _config: &PluginConfig) -> Result<(), PluginError> {
            Ok(())
        }
        async fn execute(
            &self,
            _cancellation: CancellationToken,
            _request: &PluginRequest,
            shared: &mut SharedContext,
        ) -> Result<Value, PluginError> {
            let base = match shared.get("previous_result") {
                Some(Value::Int(i)) => *i,
                _ => 0,
            };
            Ok(Value::Int(base + self.amount))
        }
    }

    struct AlwaysFails;

    #[async_trait]
    impl Plugin for AlwaysFails {
        fn name(&self) -> &'static str {
            "fails"
        }
        async fn initialize(&self, _config: &PluginConfig) -> Result<(), PluginError> {
            Ok(())
        }
        async fn execute(
            &self,
            _cancellation: CancellationToken,
            _request: &PluginRequest,
            _shared: &mut SharedContext,
        ) -> Result<Value, PluginError> {
            Err(PluginError::Execute("boom".into()))
        }
    }

    fn step(plugin_ref: &str, depends_on: &[&str], parallel: bool) -> Step {
        Step { plugin_ref: plugin_ref.to_string(), parameters: BTreeMap::new(), depends_on: depends_on.iter().map(|s| s.to_string()).collect(), parallel }
    }

    fn test_metrics() -> Arc<Metrics> {
        Arc::new(Metrics::new().unwrap())
    }

    #[tokio::test]
    async fn sequential_chain_accumulates_through_previous_result() {
        let mut builder = PluginRegistryBuilder::new();
        builder.register("a", Arc::new(Adder { name: "a", amount: 1 }));
        builder.register("b", Arc::new(Adder { name: "b", amount: 10 }));
        let registry = builder.build();

        let flow = Flow {
            name: "chain".into(),
            custom_handler: None,
            pipeline: vec![step("a", &[], false), step("b", &[], false)],
        };
        let plan = Arc::new(ExecutionPlanner::plan(&flow, &BTreeMap::new()).unwrap());
        let scheduler = StepScheduler::new(registry, test_metrics());
        let reports = scheduler
            .run(plan, Arc::new(PluginRequest::default()), RequestCancellation::new())
            .await;

        assert_eq!(reports.len(), 2);
        let b_report = reports.iter().find(|r| r.plugin_ref == "b").unwrap();
        match &b_report.outcome {
            StepOutcome::Succeeded { result: Value::Int(n), .. } => assert_eq!(*n, 11),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn dependency_failure_skips_dependents() {
        let mut builder = PluginRegistryBuilder::new();
        builder.register("fails", Arc::new(AlwaysFails));
        builder.register("after", Arc::new(Adder { name: "after", amount: 1 }));
        let registry = builder.build();

        let flow = Flow {
            name: "failure-chain".into(),
            custom_handler: None,
            pipeline: vec![step("fails", &[], true), step("after", &["fails"], true)],
        };
        let plan = Arc::new(ExecutionPlanner::plan(&flow, &BTreeMap::new()).unwrap());
        let scheduler = StepScheduler::new(registry, test_metrics());
        let reports = scheduler
            .run(plan, Arc::new(PluginRequest::default()), RequestCancellation::new())
            .await;

        let after_report = reports.iter().find(|r| r.plugin_ref == "after").unwrap();
        assert!(matches!(after_report.outcome, StepOutcome::SkippedDependencyFailure));
    }

    #[tokio::test]
    async fn unknown_plugin_ref_fails_its_own_step_only() {
        let registry = PluginRegistryBuilder::new().build();
        let flow = Flow { name: "missing".into(), custom_handler: None, pipeline: vec![step("ghost", &[], true)] };
        let plan = Arc::new(ExecutionPlanner::plan(&flow, &BTreeMap::new()).unwrap());
        let scheduler = StepScheduler::new(registry, test_metrics());
        let reports = scheduler
            .run(plan, Arc::new(PluginRequest::default()), RequestCancellation::new())
            .await;
        assert_eq!(reports.len(), 1);
        assert!(matches!(reports[0].outcome, StepOutcome::Failed { .. }));
    }

    #[tokio::test]
    async fn parallel_fan_out_runs_independent_roots_concurrently() {
        let mut builder = PluginRegistryBuilder::new();
        builder.register("left", Arc::new(Adder { name: "left", amount: 1 }));
        builder.register("right", Arc::new(Adder { name: "right", amount: 2 }));
        let registry = builder.build();

        let flow = Flow {
            name: "fan-out".into(),
            custom_handler: None,
            pipeline: vec![step("left", &[], true), step("right", &[], true)],
        };
        let plan = Arc::new(ExecutionPlanner::plan(&flow, &BTreeMap::new()).unwrap());
        assert_eq!(plan.roots.len(), 2);
        let scheduler = StepScheduler::new(registry, test_metrics());
        let reports = scheduler
            .run(plan, Arc::new(PluginRequest::default()), RequestCancellation::new())
            .await;
        assert_eq!(reports.len(), 2);
        assert!(reports.iter().all(|r| matches!(r.outcome, StepOutcome::Succeeded { .. })));
    }

    #[tokio::test]
    async fn wide_parallel_fan_out_collects_every_report() {
        let mut builder = PluginRegistryBuilder::new();
        let names: Vec<String> = (0..10).map(|i| format!("root-{i}")).collect();
        for name in &names {
            builder.register(name, Arc::new(Adder { name: "root", amount: 1 }));
        }
        let registry = builder.build();

        let flow = Flow {
            name: "wide-fan-out".into(),
            custom_handler: None,
            pipeline: names.iter().map(|n| step(n, &[], true)).collect(),
        };
        let plan = Arc::new(ExecutionPlanner::plan(&flow, &BTreeMap::new()).unwrap());
        assert_eq!(plan.roots.len(), 10);
        let scheduler = StepScheduler::new(registry, test_metrics());
        let reports = scheduler
            .run(plan, Arc::new(PluginRequest::default()), RequestCancellation::new())
            .await;
        assert_eq!(reports.len(), 10);
    }

    #[tokio::test]
    async fn pre_cancelled_request_skips_all_steps() {
        let mut builder = PluginRegistryBuilder::new();
        builder.register("a", Arc::new(Adder { name: "a", amount: 1 }));
        let registry = builder.build();
        let flow = Flow { name: "cancelled".into(), custom_handler: None, pipeline: vec![step("a", &[], true)] };
        let plan = Arc::new(ExecutionPlanner::plan(&flow, &BTreeMap::new()).unwrap());
        let cancellation = RequestCancellation::new();
        cancellation.cancel();
        let scheduler = StepScheduler::new(registry, test_metrics());
        let reports = scheduler.run(plan, Arc::new(PluginRequest::default()), cancellation).await;
        assert_eq!(reports.len(), 1);
        assert!(matches!(reports[0].outcome, StepOutcome::Failed { .. }));
    }
}
