//! Run outcome reporting.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::executor::ExecutionResult;
use crate::kernel::error::{PlanningError, UnitFailure};
use crate::kernel::progress::RunStatus;
use crate::planner::types::{ExecutionPlan, ExecutionStatus, PlanComplexity, PlanId};
use crate::planner::BASE_UNIT_COST_MS;

pub const CONVERSATIONAL_HINT: &str =
    "No actionable request detected; continue in conversational mode or rephrase as a concrete board action";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportSummary {
    pub total_actions: usize,
    pub completed_actions: usize,
    pub failed_actions: usize,
    pub cancelled_actions: usize,
    /// Dropped by the confidence threshold before planning.
    pub skipped_actions: usize,
    pub total_time_ms: u64,
    pub estimated_time_ms: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub parallel_efficiency: f64,
    pub time_vs_budget: f64,
    pub success_rate: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QualityMetrics {
    pub nodes_created: usize,
    pub edges_created: usize,
    pub average_confidence: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub plan_id: PlanId,
    pub status: RunStatus,
    pub success: bool,
    pub summary: ReportSummary,
    pub results: Vec<ExecutionResult>,
    pub errors: Vec<UnitFailure>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub planning_error: Option<String>,
    pub performance: PerformanceMetrics,
    pub quality: QualityMetrics,
    pub recommendations: Vec<String>,
}

impl ExecutionReport {
    /// Nothing cleared the confidence threshold. Not a failure.
    pub fn skipped(skipped_actions: usize, elapsed: Duration) -> Self {
        Self {
            plan_id: PlanId::new(),
            status: RunStatus::Completed,
            success: true,
            summary: ReportSummary {
                skipped_actions,
                total_time_ms: elapsed.as_millis() as u64,
                ..ReportSummary::default()
            },
            results: Vec::new(),
            errors: Vec::new(),
            planning_error: None,
            performance: PerformanceMetrics::default(),
            quality: QualityMetrics::default(),
            recommendations: vec![CONVERSATIONAL_HINT.to_string()],
        }
    }

    /// Planning failed, so nothing ran.
    pub fn catastrophic(error: &PlanningError, total_actions: usize, skipped_actions: usize, elapsed: Duration) -> Self {
        Self {
            plan_id: PlanId::new(),
            status: RunStatus::Failed,
            success: false,
            summary: ReportSummary {
                total_actions,
                skipped_actions,
                total_time_ms: elapsed.as_millis() as u64,
                ..ReportSummary::default()
            },
            results: Vec::new(),
            errors: Vec::new(),
            planning_error: Some(error.to_string()),
            performance: PerformanceMetrics::default(),
            quality: QualityMetrics::default(),
            recommendations: vec![format!(
                "The request could not be planned ({}); remove the conflicting dependency and try again",
                error
            )],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.summary.total_actions == 0
    }
}

/// Pure function: finished plan -> report.
pub fn generate(plan: &ExecutionPlan, status: RunStatus, elapsed: Duration, skipped_actions: usize) -> ExecutionReport {
    let total = plan.actions.len();
    let completed = plan.count_status(ExecutionStatus::Completed);
    let failed = plan.actions.iter().filter(|a| a.is_failure()).count();
    let cancelled = plan.count_status(ExecutionStatus::Cancelled);

    let results: Vec<ExecutionResult> = plan.actions.iter().filter_map(|a| a.result().cloned()).collect();
    // Failed units plus cancelled units that carry a reason.
    let errors: Vec<UnitFailure> = plan.actions.iter().filter_map(|a| a.error().cloned()).collect();

    let actual_ms = elapsed.as_millis() as u64;
    let estimated_ms = plan.estimated_time.as_millis() as u64;

    let performance = PerformanceMetrics {
        parallel_efficiency: parallel_efficiency(total, actual_ms),
        time_vs_budget: ratio(actual_ms as f64, estimated_ms as f64),
        success_rate: ratio(completed as f64, total as f64),
    };

    let quality = QualityMetrics {
        nodes_created: results.iter().map(|r| r.metadata.created_nodes.len()).sum(),
        edges_created: results.iter().map(|r| r.metadata.created_edges.len()).sum(),
        average_confidence: if total == 0 {
            0.0
        } else {
            plan.actions.iter().map(|a| a.confidence).sum::<f32>() / total as f32
        },
    };

    let summary = ReportSummary {
        total_actions: total,
        completed_actions: completed,
        failed_actions: failed,
        cancelled_actions: cancelled,
        skipped_actions,
        total_time_ms: actual_ms,
        estimated_time_ms: estimated_ms,
    };

    let recommendations = recommend(&summary, plan.complexity, status);

    ExecutionReport {
        plan_id: plan.id,
        status,
        success: failed == 0,
        summary,
        results,
        errors,
        planning_error: None,
        performance,
        quality,
        recommendations,
    }
}

/// Sequential cost over actual cost, capped at 1. A run that took no
/// measurable time counts as fully efficient.
pub fn parallel_efficiency(total_actions: usize, actual_ms: u64) -> f64 {
    if total_actions == 0 {
        return 0.0;
    }
    if actual_ms == 0 {
        return 1.0;
    }
    ((total_actions as u64 * BASE_UNIT_COST_MS) as f64 / actual_ms as f64).min(1.0)
}

fn ratio(num: f64, den: f64) -> f64 {
    if den <= 0.0 {
        0.0
    } else {
        num / den
    }
}

fn recommend(summary: &ReportSummary, complexity: PlanComplexity, status: RunStatus) -> Vec<String> {
    let mut out = Vec::new();
    if summary.total_actions == 0 {
        out.push(CONVERSATIONAL_HINT.to_string());
        return out;
    }
    if summary.failed_actions > 0 {
        out.push(format!(
            "Review the {} failed action{} and retry once the cause is fixed",
            summary.failed_actions,
            if summary.failed_actions == 1 { "" } else { "s" }
        ));
    }
    if complexity == PlanComplexity::Complex {
        out.push("Break large requests into smaller steps for faster, more predictable runs".to_string());
    }
    if status == RunStatus::Cancelled {
        out.push("Execution was cancelled; re-run the request to resume the remaining actions".to_string());
    }
    if summary.completed_actions > 0 {
        out.push("Save this request as a template to reuse the same workflow".to_string());
    }
    out
}
