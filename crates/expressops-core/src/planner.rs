//! Per-request dependency-DAG planner.
//!
//! Converts a [`Flow`] plus a base shared-context mapping into a list of
//! [`StepNode`]s with dependency edges resolved. The cycle-detection DFS
//! below is the same shape as `gini_core::stage_manager::dependency::DependencyGraph::detect_cycle_dfs`,
//! adapted to run per-request instead of over a process-wide graph: the
//! reverse-dependency index is owned by one request's plan and can't leak
//! into another request running concurrently.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{Mutex, Notify};

use crate::context::SharedContext;
use crate::error::EngineError;
use crate::flow::{Flow, Step};
use crate::value::Value;

/// The runtime node for one `Step` in one request.
#[derive(Debug)]
pub struct StepNode {
    pub index: usize,
    pub step: Step,
    pub shared: Mutex<SharedContext>,
    /// Indices, within this plan's `nodes`, of this node's dependencies.
    pub dependencies: Vec<usize>,
    /// Indices of nodes that depend on this one (reverse edges), filled
    /// once during planning and read-only thereafter.
    pub dependents: Vec<usize>,
    /// Signalled exactly once, when this node transitions to `executed`.
    pub notify: Notify,
    pub executed: AtomicBool,
    pub has_error: AtomicBool,
    pub result: Mutex<Option<Value>>,
}

impl StepNode {
    pub fn is_executed(&self) -> bool {
        self.executed.load(Ordering::Acquire)
    }

    pub fn has_error(&self) -> bool {
        self.has_error.load(Ordering::Acquire)
    }
}

/// Output of planning: an ordered set of nodes and the subset that have no
/// dependencies (the DAG's roots).
#[derive(Debug)]
pub struct ExecutionPlan {
    pub flow_name: String,
    pub nodes: Vec<Arc<StepNode>>,
    pub roots: Vec<usize>,
}

pub struct ExecutionPlanner;

impl ExecutionPlanner {
    /// Plans `flow` against `base_context`. Pure function of its inputs:
    /// planning the same flow twice produces the same dependency edges.
    pub fn plan(flow: &Flow, base_context: &BTreeMap<String, Value>) -> Result<ExecutionPlan, EngineError> {
        // Pass 1 — materialize.
        let mut materialized: Vec<Step> = Vec::new();
        let mut plugin_ref_to_index: HashMap<String, usize> = HashMap::new();
        for step in &flow.pipeline {
            if step.is_comment() {
                continue;
            }
            let idx = materialized.len();
            // Last materialized occurrence of a pluginRef wins when a flow
            // repeats one.
            plugin_ref_to_index.insert(step.plugin_ref.clone(), idx);
            materialized.push(step.clone());
        }

        // Pass 2 — wire dependencies.
        let mut dependencies: Vec<Vec<usize>> = Vec::with_capacity(materialized.len());
        for (idx, step) in materialized.iter().enumerate() {
            let deps = if !step.depends_on.is_empty() {
                step.depends_on
                    .iter()
                    .filter_map(|dep_ref| {
                        let resolved = plugin_ref_to_index.get(dep_ref).copied();
                        if resolved.is_none() {
                            tracing::debug!(
                                flow = %flow.name,
                                step = %step.plugin_ref,
                                dependency = %dep_ref,
                                "dropping unresolved dependsOn reference"
                            );
                        }
                        resolved
                    })
                    .collect::<Vec<_>>()
            } else if !step.parallel && idx > 0 {
                // Legacy sequential fallback: depend on the immediately
                // preceding materialized step.
                vec![idx - 1]
            } else {
                Vec::new()
            };
            dependencies.push(deps);
        }

        detect_cycle(&flow.name, &dependencies)?;

        // Reverse edges, built once here and read-only for the rest of
        // the request (per-request state only; never shared across
        // requests).
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); materialized.len()];
        for (idx, deps) in dependencies.iter().enumerate() {
            for &dep in deps {
                dependents[dep].push(idx);
            }
        }

        let mut nodes = Vec::with_capacity(materialized.len());
        for (idx, step) in materialized.into_iter().enumerate() {
            let shared = SharedContext::seeded(base_context, &step.parameters);
            nodes.push(Arc::new(StepNode {
                index: idx,
                step,
                shared: Mutex::new(shared),
                dependencies: std::mem::take(&mut dependencies[idx]),
                dependents: std::mem::take(&mut dependents[idx]),
                notify: Notify::new(),
                executed: AtomicBool::new(false),
                has_error: AtomicBool::new(false),
                result: Mutex::new(None),
            }));
        }

        let roots = nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.dependencies.is_empty())
            .map(|(i, _)| i)
            .collect();

        Ok(ExecutionPlan { flow_name: flow.name.clone(), nodes, roots })
    }
}

/// DFS-based cycle detection over the per-request dependency edges.
/// Self-dependencies (a step whose `dependsOn` ultimately resolves back to
/// itself, e.g. via the duplicate-pluginRef tie-break) surface as a cycle
/// of length one.
fn detect_cycle(flow_name: &str, dependencies: &[Vec<usize>]) -> Result<(), EngineError> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        Unvisited,
        InProgress,
        Done,
    }

    let mut marks = vec![Mark::Unvisited; dependencies.len()];

    fn visit(
        node: usize,
        dependencies: &[Vec<usize>],
        marks: &mut [Mark],
    ) -> Result<(), ()> {
        match marks[node] {
            Mark::Done => return Ok(()),
            Mark::InProgress => return Err(()),
            Mark::Unvisited => {}
        }
        marks[node] = Mark::InProgress;
        for &dep in &dependencies[node] {
            visit(dep, dependencies, marks)?;
        }
        marks[node] = Mark::Done;
        Ok(())
    }

    for node in 0..dependencies.len() {
        if visit(node, dependencies, &mut marks).is_err() {
            return Err(EngineError::InvalidFlow {
                flow: flow_name.to_string(),
                reason: "dependency cycle detected".to_string(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::Step;

    fn step(plugin_ref: &str, depends_on: &[&str], parallel: bool) -> Step {
        Step {
            plugin_ref: plugin_ref.to_string(),
            parameters: BTreeMap::new(),
            depends_on: depends_on.iter().map(|s| s.to_string()).collect(),
            parallel,
        }
    }

    #[test]
    fn sequential_chain_wires_previous_step() {
        let flow = Flow {
            name: "chain".into(),
            custom_handler: None,
            pipeline: vec![step("A", &[], false), step("B", &[], false), step("C", &[], false)],
        };
        let plan = ExecutionPlanner::plan(&flow, &BTreeMap::new()).unwrap();
        assert_eq!(plan.roots, vec![0]);
        assert_eq!(plan.nodes[1].dependencies, vec![0]);
        assert_eq!(plan.nodes[2].dependencies, vec![1]);
    }

    #[test]
    fn diamond_dag_wires_explicit_dependencies() {
        let flow = Flow {
            name: "diamond".into(),
            custom_handler: None,
            pipeline: vec![
                step("root", &[], true),
                step("left", &["root"], true),
                step("right", &["root"], true),
                step("join", &["left", "right"], true),
            ],
        };
        let plan = ExecutionPlanner::plan(&flow, &BTreeMap::new()).unwrap();
        assert_eq!(plan.roots, vec![0]);
        assert_eq!(plan.nodes[1].dependencies, vec![0]);
        assert_eq!(plan.nodes[2].dependencies, vec![0]);
        let mut join_deps = plan.nodes[3].dependencies.clone();
        join_deps.sort();
        assert_eq!(join_deps, vec![1, 2]);
    }

    #[test]
    fn empty_pipeline_plans_to_no_nodes() {
        let flow = Flow { name: "empty".into(), custom_handler: None, pipeline: vec![] };
        let plan = ExecutionPlanner::plan(&flow, &BTreeMap::new()).unwrap();
        assert!(plan.nodes.is_empty());
        assert!(plan.roots.is_empty());
    }

    #[test]
    fn comment_only_pipeline_behaves_like_empty() {
        let flow = Flow {
            name: "comments".into(),
            custom_handler: None,
            pipeline: vec![step("", &[], false), step("", &[], false)],
        };
        let plan = ExecutionPlanner::plan(&flow, &BTreeMap::new()).unwrap();
        assert!(plan.nodes.is_empty());
    }

    #[test]
    fn unresolved_dependency_is_dropped_and_step_becomes_root() {
        let flow = Flow {
            name: "dangling".into(),
            custom_handler: None,
            pipeline: vec![step("A", &["ghost"], true)],
        };
        let plan = ExecutionPlanner::plan(&flow, &BTreeMap::new()).unwrap();
        assert_eq!(plan.roots, vec![0]);
    }

    #[test]
    fn duplicate_plugin_ref_resolves_dependency_to_last_occurrence() {
        let flow = Flow {
            name: "dup".into(),
            custom_handler: None,
            pipeline: vec![
                step("A", &[], true),
                step("A", &[], true),
                step("B", &["A"], true),
            ],
        };
        let plan = ExecutionPlanner::plan(&flow, &BTreeMap::new()).unwrap();
        assert_eq!(plan.nodes[2].dependencies, vec![1]);
    }

    #[test]
    fn cycle_is_rejected() {
        let flow = Flow {
            name: "cyclic".into(),
            custom_handler: None,
            pipeline: vec![step("A", &["B"], true), step("B", &["A"], true)],
        };
        let err = ExecutionPlanner::plan(&flow, &BTreeMap::new()).unwrap_err();
        assert!(matches!(err, EngineError::InvalidFlow { .. }));
    }
}
