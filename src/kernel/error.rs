use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::planner::types::ExecutionId;
use crate::services::board::{EdgeId, NodeId};

/// Marker that makes any unit failure non-retryable.
pub const FATAL_MARKER: &str = "FATAL";

/// Failures while turning detected actions into an execution plan.
/// These never reach the UI as errors; the scheduler folds them into a report.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlanningError {
    #[error("action {action} depends on unknown action {dependency}")]
    UnknownDependency { action: String, dependency: String },

    #[error("dependency cycle detected through action {0}")]
    DependencyCycle(String),

    #[error("duplicate action id {0}")]
    DuplicateAction(String),

    #[error("unable to partition {remaining} actions into parallel groups")]
    Unschedulable { remaining: usize },
}

/// Errors raised by a Graph Document implementation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BoardError {
    #[error("node not found: {0}")]
    NodeNotFound(NodeId),

    #[error("edge not found: {0}")]
    EdgeNotFound(EdgeId),

    #[error("board rejected operation: {0}")]
    Rejected(String),

    #[error("board unavailable: {0}")]
    Unavailable(String),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid configuration file: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitErrorKind {
    Board,
    Timeout,
    Cancelled,
    Unsupported,
    Handler,
}

/// Graph mutations a handler completed before it failed.
/// Rollback replays these in reverse.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartialEffects {
    pub nodes: Vec<NodeId>,
    pub edges: Vec<EdgeId>,
}

impl PartialEffects {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty()
    }
}

/// A failure of one execution unit. Contained to that unit.
#[derive(Error, Debug, Clone)]
#[error("{kind:?}: {message}")]
pub struct UnitError {
    pub kind: UnitErrorKind,
    pub message: String,
    pub fatal: bool,
    pub partial: PartialEffects,
}

impl UnitError {
    pub fn new(kind: UnitErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            fatal: false,
            partial: PartialEffects::default(),
        }
    }

    pub fn fatal(kind: UnitErrorKind, message: impl Into<String>) -> Self {
        Self {
            fatal: true,
            ..Self::new(kind, message)
        }
    }

    pub fn timeout(timeout_ms: u64) -> Self {
        Self::new(UnitErrorKind::Timeout, format!("unit exceeded {}ms deadline", timeout_ms))
    }

    pub fn cancelled() -> Self {
        Self::fatal(UnitErrorKind::Cancelled, "execution cancelled")
    }

    pub fn with_partial(mut self, partial: PartialEffects) -> Self {
        self.partial = partial;
        self
    }

    /// Anything not flagged fatal, and not carrying the FATAL marker, may be retried.
    pub fn recoverable(&self) -> bool {
        !self.fatal && !self.message.contains(FATAL_MARKER)
    }
}

impl From<BoardError> for UnitError {
    fn from(e: BoardError) -> Self {
        UnitError::new(UnitErrorKind::Board, e.to_string())
    }
}

/// User-visible failure record carried in reports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitFailure {
    pub execution_id: ExecutionId,
    pub action_type: crate::intent::types::ActionType,
    pub kind: UnitErrorKind,
    pub message: String,
    pub recoverable: bool,
    pub attempts: u32,
    pub rolled_back: bool,
}
