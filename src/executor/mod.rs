//! Command execution: one unit's action type becomes concrete graph effects.

pub mod content;
pub mod handlers;
pub mod placement;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::intent::types::{ActionContext, ActionType, DetectedAction};
use crate::kernel::error::{BoardError, PartialEffects, UnitError};
use crate::planner::types::ActionExecution;
use crate::services::board::{EdgeId, GraphDocument, NodeId};
use crate::services::llm::{LanguageModelGateway, TokenUsage};

use content::ContentSynthesizer;
use placement::PlacementLedger;
use handlers::{AnalyzeHandler, ConnectHandler, CreateMultipleHandler, CreateSingleHandler, PlanTemplateHandler};

/// Execution-time context handed down from the caller.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionContext {
    /// The user's original request, used as a hint when writing node text.
    pub request: String,
    pub board: ActionContext,
}

impl ExecutionContext {
    pub fn new(request: impl Into<String>, board: ActionContext) -> Self {
        Self {
            request: request.into(),
            board,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedNode {
    pub id: NodeId,
    pub title: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultMetadata {
    pub created_nodes: Vec<CreatedNode>,
    pub created_edges: Vec<EdgeId>,
    pub findings: Vec<String>,
    pub token_usage: TokenUsage,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub success: bool,
    pub action_type: ActionType,
    pub message: String,
    pub metadata: ResultMetadata,
    pub duration_ms: u64,
}

impl ExecutionResult {
    pub fn unsupported(action_type: ActionType) -> Self {
        Self {
            success: false,
            action_type,
            message: format!("no handler registered for action type {}", action_type),
            metadata: ResultMetadata::default(),
            duration_ms: 0,
        }
    }
}

/// Everything a handler may look at for one invocation.
pub struct UnitRequest<'a> {
    pub action: &'a DetectedAction,
    pub context: &'a ExecutionContext,
    pub cancel: &'a CancellationToken,
}

/// What a handler produced. The executor wraps it into an `ExecutionResult`.
#[derive(Debug, Clone, Default)]
pub struct HandlerOutput {
    pub message: String,
    pub metadata: ResultMetadata,
}

#[async_trait]
pub trait ActionHandler: Send + Sync {
    /// Every successful graph mutation must be recorded in `effects` so a
    /// failed attempt can be undone.
    async fn handle(&self, request: UnitRequest<'_>, effects: &mut PartialEffects) -> Result<HandlerOutput, UnitError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandlerKind {
    CreateSingle,
    CreateMultiple,
    PlanTemplate,
    Analyze,
    Connect,
}

/// Exhaustive routing table. Adding an `ActionType` variant fails to compile
/// until it is routed here.
pub fn route(action_type: ActionType) -> Option<HandlerKind> {
    match action_type {
        ActionType::CreateSingle | ActionType::ResearchTopic | ActionType::ImproveContent => {
            Some(HandlerKind::CreateSingle)
        }
        ActionType::CreateMultiple
        | ActionType::CreateSequence
        | ActionType::CreateHierarchy
        | ActionType::BrainstormIdeas
        | ActionType::ExpandConcept => Some(HandlerKind::CreateMultiple),
        ActionType::PlanProject => Some(HandlerKind::PlanTemplate),
        ActionType::AnalyzeBoard | ActionType::AnalyzeNode | ActionType::AnalyzeGap => Some(HandlerKind::Analyze),
        ActionType::ConnectNodes => Some(HandlerKind::Connect),
        ActionType::OrganizeNodes | ActionType::DocumentProcess | ActionType::CustomWorkflow => None,
    }
}

/// The only component that mutates the Graph Document.
pub struct CommandExecutor {
    board: Arc<dyn GraphDocument>,
    placements: Arc<PlacementLedger>,
    handlers: HashMap<ActionType, Arc<dyn ActionHandler>>,
}

impl CommandExecutor {
    pub fn new(board: Arc<dyn GraphDocument>) -> Self {
        Self::with_synthesizer(board, ContentSynthesizer::templated())
    }

    pub fn with_gateway(board: Arc<dyn GraphDocument>, gateway: Arc<dyn LanguageModelGateway>) -> Self {
        Self::with_synthesizer(board, ContentSynthesizer::with_gateway(gateway))
    }

    pub fn with_synthesizer(board: Arc<dyn GraphDocument>, synthesizer: ContentSynthesizer) -> Self {
        let synthesizer = Arc::new(synthesizer);
        let placements = Arc::new(PlacementLedger::new());
        let create_single: Arc<dyn ActionHandler> = Arc::new(CreateSingleHandler::new(
            board.clone(),
            placements.clone(),
            synthesizer.clone(),
        ));
        let create_multiple: Arc<dyn ActionHandler> = Arc::new(CreateMultipleHandler::new(
            board.clone(),
            placements.clone(),
            synthesizer.clone(),
        ));
        let plan: Arc<dyn ActionHandler> =
            Arc::new(PlanTemplateHandler::new(board.clone(), placements.clone(), synthesizer));
        let analyze: Arc<dyn ActionHandler> = Arc::new(AnalyzeHandler::new(board.clone()));
        let connect: Arc<dyn ActionHandler> = Arc::new(ConnectHandler::new(board.clone(), placements.clone()));

        let mut handlers = HashMap::new();
        for action_type in ActionType::ALL {
            let handler = match route(action_type) {
                Some(HandlerKind::CreateSingle) => create_single.clone(),
                Some(HandlerKind::CreateMultiple) => create_multiple.clone(),
                Some(HandlerKind::PlanTemplate) => plan.clone(),
                Some(HandlerKind::Analyze) => analyze.clone(),
                Some(HandlerKind::Connect) => connect.clone(),
                None => continue,
            };
            handlers.insert(action_type, handler);
        }

        Self {
            board,
            placements,
            handlers,
        }
    }

    /// Install or replace the handler for one action type.
    pub fn register(&mut self, action_type: ActionType, handler: Arc<dyn ActionHandler>) {
        self.handlers.insert(action_type, handler);
    }

    pub fn supports(&self, action_type: ActionType) -> bool {
        self.handlers.contains_key(&action_type)
    }

    /// Positions claimed by nodes this executor created. Shared with custom
    /// handlers that place nodes of their own.
    pub fn placements(&self) -> Arc<PlacementLedger> {
        self.placements.clone()
    }

    /// Dispatch strictly on `action.action_type`.
    ///
    /// Unsupported types come back as `Ok` with `success: false` so one bad
    /// action never aborts its siblings. On error the mutations completed
    /// before the failure ride along in `UnitError::partial`.
    pub async fn execute(
        &self,
        execution: &ActionExecution,
        action: &DetectedAction,
        context: &ExecutionContext,
        cancel: &CancellationToken,
    ) -> Result<ExecutionResult, UnitError> {
        let mut effects = PartialEffects::default();
        match self.execute_tracked(execution, action, context, cancel, &mut effects).await {
            Ok(result) => Ok(result),
            Err(e) => Err(e.with_partial(effects)),
        }
    }

    /// Same as `execute`, but effects are recorded into a caller-owned buffer
    /// that stays valid even if this future is dropped mid-flight.
    pub async fn execute_tracked(
        &self,
        execution: &ActionExecution,
        action: &DetectedAction,
        context: &ExecutionContext,
        cancel: &CancellationToken,
        effects: &mut PartialEffects,
    ) -> Result<ExecutionResult, UnitError> {
        let Some(handler) = self.handlers.get(&action.action_type) else {
            warn!("Unit {} has unsupported action type {}", execution.id, action.action_type);
            return Ok(ExecutionResult::unsupported(action.action_type));
        };

        if cancel.is_cancelled() {
            return Err(UnitError::cancelled());
        }

        let started = Instant::now();
        let request = UnitRequest { action, context, cancel };
        let output = handler.handle(request, effects).await?;

        debug!(
            "Unit {} ({}) created {} nodes, {} edges",
            execution.id,
            action.action_type,
            output.metadata.created_nodes.len(),
            output.metadata.created_edges.len()
        );
        Ok(ExecutionResult {
            success: true,
            action_type: action.action_type,
            message: output.message,
            metadata: output.metadata,
            duration_ms: started.elapsed().as_millis() as u64,
        })
    }

    /// Undo recorded effects, newest first. Returns how many were removed.
    pub async fn rollback(&self, effects: &PartialEffects) -> usize {
        let mut removed = 0;
        for edge in effects.edges.iter().rev() {
            match self.board.remove_edge(*edge).await {
                Ok(()) => removed += 1,
                Err(BoardError::EdgeNotFound(_)) => {}
                Err(e) => warn!("Rollback could not remove edge {}: {}", edge, e),
            }
        }
        for node in effects.nodes.iter().rev() {
            match self.board.remove_node(*node).await {
                Ok(()) => {
                    removed += 1;
                    self.placements.release_node(*node);
                }
                Err(BoardError::NodeNotFound(_)) => self.placements.release_node(*node),
                Err(e) => warn!("Rollback could not remove node {}: {}", node, e),
            }
        }
        removed
    }
}
