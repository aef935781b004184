//! JSON-facing summary of a flow run, built from the scheduler's
//! [`StepReport`](crate::scheduler::StepReport)s.

use serde::Serialize;

use crate::scheduler::{StepOutcome, StepReport};
use crate::value::Value;

#[derive(Debug, Serialize)]
pub struct StepResult {
    pub plugin: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub formatted_result: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u128,
}

#[derive(Debug, Serialize)]
pub struct FlowResponse {
    pub flow: String,
    pub success: bool,
    pub count: usize,
    pub results: Vec<StepResult>,
}

impl FlowResponse {
    /// Assembles the response body for one flow run. `success` is false
    /// as soon as any step failed or was skipped for a failed dependency —
    /// a flow with zero steps is vacuously successful.
    pub fn from_reports(flow: String, reports: Vec<StepReport>) -> Self {
        let mut success = true;
        let results = reports
            .into_iter()
            .map(|report| match report.outcome {
                StepOutcome::Succeeded { result, formatted } => StepResult {
                    plugin: report.plugin_ref,
                    result: Some(render(&result)),
                    formatted_result: Some(formatted),
                    error: None,
                    duration_ms: report.duration.as_millis(),
                },
                StepOutcome::Failed { message } => {
                    success = false;
                    StepResult {
                        plugin: report.plugin_ref,
                        result: None,
                        formatted_result: None,
                        error: Some(message),
                        duration_ms: report.duration.as_millis(),
                    }
                }
                StepOutcome::SkippedDependencyFailure => {
                    success = false;
                    StepResult {
                        plugin: report.plugin_ref,
                        result: None,
                        formatted_result: None,
                        error: Some("skipped due to dependency failure".to_string()),
                        duration_ms: report.duration.as_millis(),
                    }
                }
            })
            .collect::<Vec<_>>();
        let count = results.len();
        Self { flow, success, count, results }
    }
}

fn render(value: &Value) -> serde_json::Value {
    serde_json::Value::from(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn report(plugin_ref: &str, outcome: StepOutcome) -> StepReport {
        StepReport { plugin_ref: plugin_ref.to_string(), outcome, duration: Duration::from_millis(5) }
    }

    #[test]
    fn all_succeeded_reports_overall_success() {
        let reports = vec![
            report("a", StepOutcome::Succeeded { result: Value::Int(1), formatted: "1".into() }),
            report("b", StepOutcome::Succeeded { result: Value::Int(2), formatted: "2".into() }),
        ];
        let response = FlowResponse::from_reports("flow".into(), reports);
        assert!(response.success);
        assert_eq!(response.count, 2);
    }

    #[test]
    fn any_failure_marks_overall_failure() {
        let reports = vec![
            report("a", StepOutcome::Succeeded { result: Value::Int(1), formatted: "1".into() }),
            report("b", StepOutcome::Failed { message: "boom".into() }),
        ];
        let response = FlowResponse::from_reports("flow".into(), reports);
        assert!(!response.success);
    }

    #[test]
    fn empty_pipeline_is_vacuously_successful() {
        let response = FlowResponse::from_reports("empty".into(), vec![]);
        assert!(response.success);
        assert_eq!(response.count, 0);
    }
}
