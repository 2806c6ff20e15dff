use serde::{Deserialize, Serialize};

use crate::planner::types::PlanId;

/// Run-level state machine: Planning -> Executing -> {Completed | Failed | Cancelled}.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Planning,
    Executing,
    Completed,
    Failed,
    Cancelled,
}

/// Live view of one run, pushed to the progress sink after every group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionProgress {
    pub plan_id: PlanId,
    pub total_actions: usize,
    pub completed_actions: usize,
    pub failed_actions: usize,
    /// Index of the group being (or last) executed, 1-based. 0 before the first group.
    pub current_step: usize,
    pub total_steps: usize,
    pub elapsed_ms: u64,
    pub estimated_time_remaining_ms: u64,
    pub status: RunStatus,
}

impl ExecutionProgress {
    pub fn planning(plan_id: PlanId, total_actions: usize, total_steps: usize, estimated_ms: u64) -> Self {
        Self {
            plan_id,
            total_actions,
            completed_actions: 0,
            failed_actions: 0,
            current_step: 0,
            total_steps,
            elapsed_ms: 0,
            estimated_time_remaining_ms: estimated_ms,
            status: RunStatus::Planning,
        }
    }
}

/// Pure function: remaining time estimate from the plan budget and elapsed time.
///
/// Uses the per-group share of the estimate for the groups still ahead, so a
/// slow run does not report a negative or frozen remainder.
pub fn estimate_remaining(estimated_ms: u64, total_steps: usize, current_step: usize, elapsed_ms: u64) -> u64 {
    if total_steps == 0 || current_step >= total_steps {
        return 0;
    }
    let per_step = estimated_ms / total_steps as u64;
    let remaining_steps = (total_steps - current_step) as u64;
    let by_budget = per_step * remaining_steps;
    if current_step == 0 {
        return by_budget;
    }
    // Observed pace so far, projected over the remaining groups.
    let observed = elapsed_ms / current_step as u64 * remaining_steps;
    by_budget.max(observed.min(by_budget * 4))
}
