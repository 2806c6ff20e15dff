use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

use crate::executor::ExecutionResult;
use crate::intent::types::{ActionId, ActionType};
use crate::kernel::error::UnitFailure;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ExecutionId(pub Uuid);

impl ExecutionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ExecutionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PlanId(pub Uuid);

impl PlanId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for PlanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle of one execution unit.
///
/// Pending -> WaitingDependencies -> Ready -> Running -> {Completed | Failed | Cancelled | RolledBack}
/// A retry moves Running back to Pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Pending,
    WaitingDependencies,
    Ready,
    Running,
    Completed,
    Failed,
    Cancelled,
    RolledBack,
}

impl ExecutionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExecutionStatus::Completed
                | ExecutionStatus::Failed
                | ExecutionStatus::Cancelled
                | ExecutionStatus::RolledBack
        )
    }

    /// Pure function: is `self -> next` a legal move?
    pub fn can_transition(&self, next: ExecutionStatus) -> bool {
        use ExecutionStatus::*;
        match (*self, next) {
            (from, _) if from.is_terminal() => false,
            (Pending, WaitingDependencies) | (Pending, Ready) => true,
            (WaitingDependencies, Ready) => true,
            (Ready, Running) => true,
            (Running, Pending) => true, // retry
            (Running, Completed) | (Running, Failed) | (Running, RolledBack) => true,
            (_, Cancelled) => true,
            _ => false,
        }
    }
}

/// Either the result or the error of a unit, never both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "data", rename_all = "snake_case")]
pub enum UnitOutcome {
    Success(ExecutionResult),
    Failure(UnitFailure),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidTransition {
    pub from: ExecutionStatus,
    pub to: ExecutionStatus,
}

/// One scheduled unit, derived 1:1 from a detected action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionExecution {
    pub id: ExecutionId,
    pub action_id: ActionId,
    pub plan_id: PlanId,
    pub action_type: ActionType,
    pub confidence: f32,
    status: ExecutionStatus,
    pub retry_count: u32,
    pub attempts: u32,
    pub dependencies: Vec<ExecutionId>,
    pub dependents: Vec<ExecutionId>,
    outcome: Option<UnitOutcome>,
    pub duration_ms: u64,
}

impl ActionExecution {
    pub fn new(plan_id: PlanId, action_id: ActionId, action_type: ActionType, confidence: f32) -> Self {
        Self {
            id: ExecutionId::new(),
            action_id,
            plan_id,
            action_type,
            confidence,
            status: ExecutionStatus::Pending,
            retry_count: 0,
            attempts: 0,
            dependencies: Vec::new(),
            dependents: Vec::new(),
            outcome: None,
            duration_ms: 0,
        }
    }

    pub fn status(&self) -> ExecutionStatus {
        self.status
    }

    /// Terminal states are final; everything else must follow the lifecycle.
    pub fn transition(&mut self, next: ExecutionStatus) -> Result<(), InvalidTransition> {
        if !self.status.can_transition(next) {
            return Err(InvalidTransition { from: self.status, to: next });
        }
        self.status = next;
        Ok(())
    }

    pub fn outcome(&self) -> Option<&UnitOutcome> {
        self.outcome.as_ref()
    }

    pub fn result(&self) -> Option<&ExecutionResult> {
        match &self.outcome {
            Some(UnitOutcome::Success(r)) => Some(r),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&UnitFailure> {
        match &self.outcome {
            Some(UnitOutcome::Failure(f)) => Some(f),
            _ => None,
        }
    }

    pub fn complete(&mut self, result: ExecutionResult) -> Result<(), InvalidTransition> {
        self.transition(ExecutionStatus::Completed)?;
        self.outcome = Some(UnitOutcome::Success(result));
        Ok(())
    }

    pub fn fail(&mut self, failure: UnitFailure) -> Result<(), InvalidTransition> {
        let next = if failure.rolled_back {
            ExecutionStatus::RolledBack
        } else {
            ExecutionStatus::Failed
        };
        self.transition(next)?;
        self.outcome = Some(UnitOutcome::Failure(failure));
        Ok(())
    }

    /// Flip to Cancelled if not already terminal. Returns whether it changed.
    pub fn cancel(&mut self, failure: Option<UnitFailure>) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = ExecutionStatus::Cancelled;
        self.outcome = failure.map(UnitOutcome::Failure);
        true
    }

    pub fn is_failure(&self) -> bool {
        matches!(self.status, ExecutionStatus::Failed | ExecutionStatus::RolledBack)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanComplexity {
    Simple,
    Moderate,
    Complex,
}

/// The DAG of units plus grouping and timing estimates for one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionPlan {
    pub id: PlanId,
    pub actions: Vec<ActionExecution>,
    /// Each inner list runs concurrently; lists run strictly in order.
    pub parallel_groups: Vec<Vec<ExecutionId>>,
    /// Heuristic: every unit with at least one dependency.
    /// This is not a longest-path computation and carries no scheduling guarantee.
    pub critical_path: Vec<ExecutionId>,
    #[serde(with = "duration_ms")]
    pub estimated_time: Duration,
    pub complexity: PlanComplexity,
}

impl ExecutionPlan {
    pub fn get(&self, id: ExecutionId) -> Option<&ActionExecution> {
        self.actions.iter().find(|a| a.id == id)
    }

    pub fn get_mut(&mut self, id: ExecutionId) -> Option<&mut ActionExecution> {
        self.actions.iter_mut().find(|a| a.id == id)
    }

    pub fn dependency_edges(&self) -> usize {
        self.actions.iter().map(|a| a.dependencies.len()).sum()
    }

    pub fn count_status(&self, status: ExecutionStatus) -> usize {
        self.actions.iter().filter(|a| a.status() == status).count()
    }
}

pub(crate) mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}
