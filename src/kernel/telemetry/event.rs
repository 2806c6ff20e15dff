use serde::{Deserialize, Serialize};

use crate::intent::types::ActionType;
use crate::kernel::error::UnitErrorKind;
use crate::planner::types::{ExecutionId, PlanComplexity, PlanId};

// Allowed: IDs, Durations, Counts, Enums
// Forbidden: request text, node titles or content, model completions

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TelemetryEvent {
    PlanBuilt {
        plan_id: PlanId,
        units: usize,
        groups: usize,
        complexity: PlanComplexity,
        estimated_ms: u64,
    },

    /// Actions dropped by the confidence threshold before planning.
    ActionsSkipped {
        count: usize,
    },

    PlanRejected {
        reason: PlanRejection,
    },

    GroupCompleted {
        plan_id: PlanId,
        step: usize,
        completed: usize,
        failed: usize,
        duration_ms: u64,
    },

    UnitRetried {
        execution_id: ExecutionId,
        action_type: ActionType,
        retry: u32,
        kind: UnitErrorKind,
    },

    UnitTimedOut {
        execution_id: ExecutionId,
        timeout_ms: u64,
    },

    UnitRolledBack {
        execution_id: ExecutionId,
        removed: usize,
    },

    RunFinished {
        plan_id: PlanId,
        outcome: RunOutcome,
        duration_ms: u64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlanRejection {
    UnknownDependency,
    DependencyCycle,
    DuplicateAction,
    Unschedulable,
}

impl From<&crate::kernel::error::PlanningError> for PlanRejection {
    fn from(e: &crate::kernel::error::PlanningError) -> Self {
        use crate::kernel::error::PlanningError;
        match e {
            PlanningError::UnknownDependency { .. } => PlanRejection::UnknownDependency, // ids STRIPPED
            PlanningError::DependencyCycle(_) => PlanRejection::DependencyCycle,
            PlanningError::DuplicateAction(_) => PlanRejection::DuplicateAction,
            PlanningError::Unschedulable { .. } => PlanRejection::Unschedulable,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunOutcome {
    Completed,
    Failed,
    Cancelled,
}
