//! Per-action-type handlers.
//!
//! Handlers check the cancellation token before every graph mutation and
//! record each completed mutation so a failed attempt can be undone.

use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::content::{ContentSynthesizer, DraftRequest, NodeDraft};
use super::placement::PlacementLedger;
use super::{ActionHandler, CreatedNode, HandlerOutput, ResultMetadata, UnitRequest};
use crate::intent::types::{ActionParameters, ActionType};
use crate::kernel::error::{PartialEffects, UnitError, UnitErrorKind};
use crate::services::board::{EdgeAttrs, EdgeId, GraphDocument, GraphState, Node, NodeId, NodeKind, NodeSpec, Position};
use crate::services::llm::TokenUsage;

pub const MAX_BATCH: u32 = 20;
pub const DEFAULT_CONNECT_COUNT: usize = 3;
pub const PROJECT_PHASES: [&str; 4] = ["Discovery", "Planning", "Execution", "Review"];

/// Tracks placement and effects for one handler invocation.
struct NodeWriter<'a> {
    board: &'a dyn GraphDocument,
    ledger: &'a PlacementLedger,
    cancel: &'a CancellationToken,
    effects: &'a mut PartialEffects,
    occupied: Vec<Position>,
    metadata: ResultMetadata,
}

impl<'a> NodeWriter<'a> {
    async fn open(
        board: &'a dyn GraphDocument,
        ledger: &'a PlacementLedger,
        cancel: &'a CancellationToken,
        effects: &'a mut PartialEffects,
    ) -> Result<NodeWriter<'a>, UnitError> {
        ensure_live(cancel)?;
        let occupied = board.list_nodes().await?.into_iter().map(|n| n.position).collect();
        Ok(Self {
            board,
            ledger,
            cancel,
            effects,
            occupied,
            metadata: ResultMetadata::default(),
        })
    }

    fn absorb(&mut self, usage: TokenUsage) {
        self.metadata.token_usage.prompt_tokens += usage.prompt_tokens;
        self.metadata.token_usage.completion_tokens += usage.completion_tokens;
    }

    async fn node(&mut self, draft: NodeDraft, kind: NodeKind, tags: &[&str]) -> Result<NodeId, UnitError> {
        ensure_live(self.cancel)?;
        let reservation = self.ledger.reserve(&self.occupied);
        let title = draft.title.clone();
        let added = self
            .board
            .add_node(NodeSpec {
                title: draft.title,
                content: draft.content,
                kind,
                position: reservation.position,
                tags: tags.iter().map(|t| t.to_string()).collect(),
            })
            .await;
        let id = match added {
            Ok(id) => id,
            Err(e) => {
                self.ledger.release(reservation);
                return Err(e.into());
            }
        };
        self.ledger.confirm(reservation, id);
        self.effects.nodes.push(id);
        self.metadata.created_nodes.push(CreatedNode { id, title });
        Ok(id)
    }

    async fn edge(&mut self, source: NodeId, target: NodeId, label: &str) -> Result<EdgeId, UnitError> {
        ensure_live(self.cancel)?;
        let id = self.board.add_edge(source, target, EdgeAttrs::labelled(label)).await?;
        self.effects.edges.push(id);
        self.metadata.created_edges.push(id);
        Ok(id)
    }

    fn finish(self, message: String) -> HandlerOutput {
        HandlerOutput {
            message,
            metadata: self.metadata,
        }
    }
}

fn ensure_live(cancel: &CancellationToken) -> Result<(), UnitError> {
    if cancel.is_cancelled() {
        return Err(UnitError::cancelled());
    }
    Ok(())
}

/// Pure function: resolve the node an action refers to.
///
/// `target` may be a node id or a title (case-insensitive). Falls back to the
/// first selected node that still exists.
pub fn resolve_target(nodes: &[Node], target: Option<&str>, selected: &[NodeId]) -> Option<NodeId> {
    if let Some(target) = target.map(str::trim).filter(|t| !t.is_empty()) {
        if let Ok(uuid) = Uuid::parse_str(target) {
            if let Some(node) = nodes.iter().find(|n| n.id == NodeId(uuid)) {
                return Some(node.id);
            }
        }
        if let Some(node) = nodes.iter().find(|n| n.title.eq_ignore_ascii_case(target)) {
            return Some(node.id);
        }
    }
    selected.iter().copied().find(|id| nodes.iter().any(|n| n.id == *id))
}

fn batch_size(parameters: &ActionParameters, default: u32) -> usize {
    parameters.count.unwrap_or(default).clamp(1, MAX_BATCH) as usize
}

fn plural(n: usize, word: &str) -> String {
    if n == 1 {
        format!("1 {}", word)
    } else {
        format!("{} {}s", n, word)
    }
}

/// One node per action: plain notes, research briefs and revisions.
pub struct CreateSingleHandler {
    board: Arc<dyn GraphDocument>,
    ledger: Arc<PlacementLedger>,
    synthesizer: Arc<ContentSynthesizer>,
}

impl CreateSingleHandler {
    pub fn new(board: Arc<dyn GraphDocument>, ledger: Arc<PlacementLedger>, synthesizer: Arc<ContentSynthesizer>) -> Self {
        Self {
            board,
            ledger,
            synthesizer,
        }
    }
}

#[async_trait]
impl ActionHandler for CreateSingleHandler {
    async fn handle(&self, request: UnitRequest<'_>, effects: &mut PartialEffects) -> Result<HandlerOutput, UnitError> {
        let action = request.action;
        let params = &action.parameters;
        let (role, kind, link) = match action.action_type {
            ActionType::ResearchTopic => ("Research brief", NodeKind::Research, Some("researches")),
            ActionType::ImproveContent => ("Revision", NodeKind::Note, Some("revises")),
            _ => ("Note", NodeKind::Note, None),
        };

        let mut writer = NodeWriter::open(self.board.as_ref(), &self.ledger, request.cancel, effects).await?;
        let source = match link {
            Some(_) => {
                let nodes = self.board.list_nodes().await?;
                resolve_target(&nodes, params.target.as_deref(), &request.context.board.selected_node_ids)
            }
            None => None,
        };

        let (draft, usage) = self
            .synthesizer
            .draft(&DraftRequest {
                action_type: action.action_type,
                parameters: params,
                role: role.to_string(),
                index: 0,
                request_text: &request.context.request,
            })
            .await;
        writer.absorb(usage);

        let title = draft.title.clone();
        let id = writer.node(draft, kind, &[action.action_type.as_str()]).await?;
        if let (Some(source), Some(label)) = (source, link) {
            writer.edge(source, id, label).await?;
        }

        Ok(writer.finish(format!("Created node '{}'", title)))
    }
}

/// Batches of nodes: plain lists, brainstorms, sequences, hierarchies and
/// concept expansions.
pub struct CreateMultipleHandler {
    board: Arc<dyn GraphDocument>,
    ledger: Arc<PlacementLedger>,
    synthesizer: Arc<ContentSynthesizer>,
}

impl CreateMultipleHandler {
    pub fn new(board: Arc<dyn GraphDocument>, ledger: Arc<PlacementLedger>, synthesizer: Arc<ContentSynthesizer>) -> Self {
        Self {
            board,
            ledger,
            synthesizer,
        }
    }

    async fn draft(&self, request: &UnitRequest<'_>, role: String, index: usize) -> (NodeDraft, TokenUsage) {
        self.synthesizer
            .draft(&DraftRequest {
                action_type: request.action.action_type,
                parameters: &request.action.parameters,
                role,
                index,
                request_text: &request.context.request,
            })
            .await
    }
}

#[async_trait]
impl ActionHandler for CreateMultipleHandler {
    async fn handle(&self, request: UnitRequest<'_>, effects: &mut PartialEffects) -> Result<HandlerOutput, UnitError> {
        let action_type = request.action.action_type;
        let params = &request.action.parameters;
        let default_count = match action_type {
            ActionType::CreateSequence => 4,
            ActionType::BrainstormIdeas => 5,
            _ => 3,
        };
        let count = batch_size(params, default_count);
        let tag = action_type.as_str();

        let existing = match action_type {
            ActionType::ExpandConcept => {
                let nodes = self.board.list_nodes().await?;
                resolve_target(&nodes, params.target.as_deref(), &request.context.board.selected_node_ids)
            }
            _ => None,
        };

        let mut writer = NodeWriter::open(self.board.as_ref(), &self.ledger, request.cancel, effects).await?;

        // Hierarchies always get a fresh root; expansions reuse the target when there is one.
        let root = match action_type {
            ActionType::CreateHierarchy => Some(("Root topic", "contains")),
            ActionType::ExpandConcept => Some(("Root concept", "expands")),
            _ => None,
        };
        let hub = match (root, existing) {
            (Some(_), Some(existing)) if action_type == ActionType::ExpandConcept => Some(existing),
            (Some((role, _)), _) => {
                let (draft, usage) = self.draft(&request, role.to_string(), 0).await;
                writer.absorb(usage);
                Some(writer.node(draft, NodeKind::Idea, &[tag]).await?)
            }
            (None, _) => None,
        };
        let hub_label = root.map(|(_, label)| label).unwrap_or("related");

        let (kind, role_prefix) = match action_type {
            ActionType::CreateSequence => (NodeKind::Task, "Step"),
            ActionType::BrainstormIdeas => (NodeKind::Idea, "Idea"),
            ActionType::CreateHierarchy | ActionType::ExpandConcept => (NodeKind::Note, "Subtopic"),
            _ => (NodeKind::Note, "Item"),
        };

        let mut previous: Option<NodeId> = None;
        for i in 0..count {
            let role = format!("{} {} of {}", role_prefix, i + 1, count);
            let (draft, usage) = self.draft(&request, role, i).await;
            writer.absorb(usage);
            let id = writer.node(draft, kind, &[tag]).await?;

            if let Some(hub) = hub {
                writer.edge(hub, id, hub_label).await?;
            }
            if action_type == ActionType::CreateSequence {
                if let Some(prev) = previous {
                    writer.edge(prev, id, "next").await?;
                }
            }
            previous = Some(id);
        }

        let created = writer.metadata.created_nodes.len();
        let linked = writer.metadata.created_edges.len();
        let message = if linked > 0 {
            format!("Created {} linked by {}", plural(created, "node"), plural(linked, "edge"))
        } else {
            format!("Created {}", plural(created, "node"))
        };
        Ok(writer.finish(message))
    }
}

/// Fixed four-phase project skeleton, chained in order.
pub struct PlanTemplateHandler {
    board: Arc<dyn GraphDocument>,
    ledger: Arc<PlacementLedger>,
    synthesizer: Arc<ContentSynthesizer>,
}

impl PlanTemplateHandler {
    pub fn new(board: Arc<dyn GraphDocument>, ledger: Arc<PlacementLedger>, synthesizer: Arc<ContentSynthesizer>) -> Self {
        Self {
            board,
            ledger,
            synthesizer,
        }
    }
}

#[async_trait]
impl ActionHandler for PlanTemplateHandler {
    async fn handle(&self, request: UnitRequest<'_>, effects: &mut PartialEffects) -> Result<HandlerOutput, UnitError> {
        let action = request.action;
        let mut writer = NodeWriter::open(self.board.as_ref(), &self.ledger, request.cancel, effects).await?;

        let mut previous: Option<NodeId> = None;
        for (i, phase) in PROJECT_PHASES.iter().copied().enumerate() {
            let (draft, usage) = self
                .synthesizer
                .draft(&DraftRequest {
                    action_type: action.action_type,
                    parameters: &action.parameters,
                    role: format!("Phase: {}", phase),
                    index: i,
                    request_text: &request.context.request,
                })
                .await;
            writer.absorb(usage);
            let id = writer.node(draft, NodeKind::Phase, &["plan_project", phase]).await?;
            if let Some(prev) = previous {
                writer.edge(prev, id, "then").await?;
            }
            previous = Some(id);
        }

        Ok(writer.finish(format!("Laid out a {}-phase project plan", PROJECT_PHASES.len())))
    }
}

/// Read-only analysis. Produces findings, never mutates the board.
pub struct AnalyzeHandler {
    board: Arc<dyn GraphDocument>,
}

impl AnalyzeHandler {
    pub fn new(board: Arc<dyn GraphDocument>) -> Self {
        Self { board }
    }
}

/// Pure function: whole-board observations.
pub fn board_findings(state: &GraphState) -> Vec<String> {
    if state.nodes.is_empty() {
        return vec!["Board is empty".to_string()];
    }
    let mut findings = vec![format!(
        "Board has {} and {}",
        plural(state.nodes.len(), "node"),
        plural(state.edges.len(), "edge")
    )];

    let isolated = state.nodes.iter().filter(|n| state.degree(n.id) == 0).count();
    if isolated > 0 {
        findings.push(format!("{} not connected to anything", plural(isolated, "node")));
    }

    if let Some(hub) = state
        .nodes
        .iter()
        .map(|n| (state.degree(n.id), n))
        .filter(|(d, _)| *d > 0)
        .max_by_key(|(d, _)| *d)
    {
        findings.push(format!("'{}' is the most connected node ({})", hub.1.title, plural(hub.0, "edge")));
    }
    findings
}

/// Pure function: observations about one node.
pub fn node_findings(state: &GraphState, id: NodeId) -> Vec<String> {
    let Some(node) = state.nodes.iter().find(|n| n.id == id) else {
        return Vec::new();
    };
    let mut findings = vec![format!("'{}' has {}", node.title, plural(state.degree(id), "connection"))];
    let words = node.content.split_whitespace().count();
    if words == 0 {
        findings.push(format!("'{}' has no content yet", node.title));
    } else {
        findings.push(format!("'{}' holds {}", node.title, plural(words, "word")));
    }
    let neighbours: Vec<&str> = state
        .edges
        .iter()
        .filter_map(|e| match (e.source == id, e.target == id) {
            (true, _) => Some(e.target),
            (_, true) => Some(e.source),
            _ => None,
        })
        .filter_map(|other| state.nodes.iter().find(|n| n.id == other))
        .map(|n| n.title.as_str())
        .collect();
    if !neighbours.is_empty() {
        findings.push(format!("Linked to: {}", neighbours.join(", ")));
    }
    findings
}

/// Pure function: what is missing from the board.
pub fn gap_findings(state: &GraphState) -> Vec<String> {
    if state.nodes.is_empty() {
        return vec!["Board is empty; start with a single idea".to_string()];
    }
    let mut findings = Vec::new();
    let isolated: Vec<&str> = state
        .nodes
        .iter()
        .filter(|n| state.degree(n.id) == 0)
        .map(|n| n.title.as_str())
        .collect();
    if !isolated.is_empty() {
        let shown: Vec<&str> = isolated.iter().take(5).copied().collect();
        findings.push(format!("Unconnected: {}", shown.join(", ")));
    }
    let empty = state.nodes.iter().filter(|n| n.content.trim().is_empty()).count();
    if empty > 0 {
        findings.push(format!("{} without content", plural(empty, "node")));
    }
    if state.edges.is_empty() && state.nodes.len() > 1 {
        findings.push("No relationships recorded between ideas".to_string());
    }
    if findings.is_empty() {
        findings.push("No obvious gaps".to_string());
    }
    findings
}

#[async_trait]
impl ActionHandler for AnalyzeHandler {
    async fn handle(&self, request: UnitRequest<'_>, _effects: &mut PartialEffects) -> Result<HandlerOutput, UnitError> {
        ensure_live(request.cancel)?;
        let state = self.board.snapshot().await?;
        let action = request.action;

        let findings = match action.action_type {
            ActionType::AnalyzeNode => {
                let target = resolve_target(
                    &state.nodes,
                    action.parameters.target.as_deref(),
                    &request.context.board.selected_node_ids,
                )
                .ok_or_else(|| UnitError::fatal(UnitErrorKind::Handler, "no node selected to analyze"))?;
                node_findings(&state, target)
            }
            ActionType::AnalyzeGap => gap_findings(&state),
            _ => board_findings(&state),
        };

        Ok(HandlerOutput {
            message: format!("Analysis produced {}", plural(findings.len(), "finding")),
            metadata: ResultMetadata {
                findings,
                ..ResultMetadata::default()
            },
        })
    }
}

/// Links the selected nodes in order, or the most recent ones when nothing
/// is selected.
pub struct ConnectHandler {
    board: Arc<dyn GraphDocument>,
    ledger: Arc<PlacementLedger>,
}

impl ConnectHandler {
    pub fn new(board: Arc<dyn GraphDocument>, ledger: Arc<PlacementLedger>) -> Self {
        Self { board, ledger }
    }
}

#[async_trait]
impl ActionHandler for ConnectHandler {
    async fn handle(&self, request: UnitRequest<'_>, effects: &mut PartialEffects) -> Result<HandlerOutput, UnitError> {
        let state = {
            ensure_live(request.cancel)?;
            self.board.snapshot().await?
        };

        let selected: Vec<NodeId> = request
            .context
            .board
            .selected_node_ids
            .iter()
            .copied()
            .filter(|id| state.nodes.iter().any(|n| n.id == *id))
            .collect();
        let chain: Vec<NodeId> = if selected.len() >= 2 {
            selected
        } else {
            let take = request
                .action
                .parameters
                .count
                .map(|c| c as usize)
                .unwrap_or(DEFAULT_CONNECT_COUNT)
                .max(2);
            let skip = state.nodes.len().saturating_sub(take);
            state.nodes.iter().skip(skip).map(|n| n.id).collect()
        };

        if chain.len() < 2 {
            return Err(UnitError::fatal(
                UnitErrorKind::Handler,
                format!("need at least 2 nodes to connect, found {}", chain.len()),
            ));
        }

        let mut writer = NodeWriter::open(self.board.as_ref(), &self.ledger, request.cancel, effects).await?;
        let mut skipped = 0;
        for pair in chain.windows(2) {
            let already = state
                .edges
                .iter()
                .any(|e| (e.source == pair[0] && e.target == pair[1]) || (e.source == pair[1] && e.target == pair[0]));
            if already {
                skipped += 1;
                continue;
            }
            writer.edge(pair[0], pair[1], "related").await?;
        }

        let made = writer.metadata.created_edges.len();
        let message = if skipped > 0 {
            format!("Connected {} ({} already linked)", plural(made, "pair"), skipped)
        } else {
            format!("Connected {}", plural(made, "pair"))
        };
        Ok(writer.finish(message))
    }
}
