use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use weaver::executor::content::{parse_completion, template_draft, DraftRequest};
use weaver::executor::placement::{find_position, grid_position, PlacementLedger, COLUMNS, GRID_ORIGIN, MIN_DISTANCE, ROWS, STEP_X, STEP_Y};
use weaver::executor::{route, CommandExecutor, ExecutionContext};
use weaver::intent::types::{ActionContext, ActionParameters, ActionType, DetectedAction};
use weaver::kernel::error::{BoardError, UnitErrorKind};
use weaver::planner::types::{ActionExecution, PlanId};
use weaver::services::board::{
    EdgeAttrs, EdgeId, GraphDocument, GraphState, InMemoryBoard, Node, NodeId, NodeKind, NodeSpec, Position,
};
use weaver::services::llm::{Completion, LanguageModelGateway, TokenUsage};

/// Accepts nodes, refuses every edge.
struct NoEdgeBoard {
    inner: InMemoryBoard,
}

#[async_trait]
impl GraphDocument for NoEdgeBoard {
    async fn add_node(&self, spec: NodeSpec) -> Result<NodeId, BoardError> {
        self.inner.add_node(spec).await
    }
    async fn add_edge(&self, _source: NodeId, _target: NodeId, _attrs: EdgeAttrs) -> Result<EdgeId, BoardError> {
        Err(BoardError::Unavailable("edge store offline".into()))
    }
    async fn list_nodes(&self) -> Result<Vec<Node>, BoardError> {
        self.inner.list_nodes().await
    }
    async fn snapshot(&self) -> Result<GraphState, BoardError> {
        self.inner.snapshot().await
    }
    async fn remove_node(&self, id: NodeId) -> Result<(), BoardError> {
        self.inner.remove_node(id).await
    }
    async fn remove_edge(&self, id: EdgeId) -> Result<(), BoardError> {
        self.inner.remove_edge(id).await
    }
}

struct CannedGateway {
    reply: Option<&'static str>,
}

#[async_trait]
impl LanguageModelGateway for CannedGateway {
    async fn complete(&self, _prompt: &str, _system: &str, _temperature: f32, _max_tokens: u32) -> anyhow::Result<Completion> {
        match self.reply {
            Some(text) => Ok(Completion {
                text: text.to_string(),
                usage: TokenUsage {
                    prompt_tokens: 12,
                    completion_tokens: 8,
                },
            }),
            None => Err(anyhow::anyhow!("gateway down")),
        }
    }
}

fn params(topic: &str, count: Option<u32>) -> ActionParameters {
    ActionParameters {
        topic: Some(topic.to_string()),
        count,
        ..ActionParameters::default()
    }
}

fn unit_for(action: &DetectedAction) -> ActionExecution {
    ActionExecution::new(PlanId::new(), action.id, action.action_type, action.confidence)
}

fn ctx() -> ExecutionContext {
    ExecutionContext::new("test request", ActionContext::empty_board())
}

#[test]
fn test_grid_scan_skips_occupied_cells() {
    assert_eq!(grid_position(&[]), Some(GRID_ORIGIN));

    let next = grid_position(&[GRID_ORIGIN]).expect("free cell");
    assert_eq!(next, Position::new(GRID_ORIGIN.x + STEP_X, GRID_ORIGIN.y));

    // A node just off-grid still blocks the cells within the exclusion radius.
    let near = Position::new(GRID_ORIGIN.x + 10.0, GRID_ORIGIN.y + 10.0);
    let pos = grid_position(&[near]).expect("free cell");
    assert!(pos.distance(&near) >= MIN_DISTANCE);
}

#[test]
fn test_full_grid_falls_back_below_it() {
    let occupied: Vec<Position> = (0..ROWS)
        .flat_map(|r| (0..COLUMNS).map(move |c| (r, c)))
        .map(|(r, c)| Position::new(GRID_ORIGIN.x + c as f32 * STEP_X, GRID_ORIGIN.y + r as f32 * STEP_Y))
        .collect();
    assert_eq!(grid_position(&occupied), None);

    let pos = find_position(&occupied);
    assert!(pos.y >= GRID_ORIGIN.y + ROWS as f32 * STEP_Y, "Fallback lands below the grid: {:?}", pos);
}

#[test]
fn test_routing_is_closed() {
    for action_type in ActionType::ALL {
        let routed = route(action_type).is_some();
        let unsupported = matches!(
            action_type,
            ActionType::OrganizeNodes | ActionType::DocumentProcess | ActionType::CustomWorkflow
        );
        assert_eq!(routed, !unsupported, "Routing mismatch for {}", action_type);
    }
    let executor = CommandExecutor::new(Arc::new(InMemoryBoard::new()));
    assert!(executor.supports(ActionType::ResearchTopic));
    assert!(!executor.supports(ActionType::CustomWorkflow));
}

#[tokio::test]
async fn test_create_single_node() {
    let board = Arc::new(InMemoryBoard::new());
    let executor = CommandExecutor::new(board.clone());
    let action = DetectedAction::new(ActionType::CreateSingle, params("marketing", None), 0.9);

    let result = executor
        .execute(&unit_for(&action), &action, &ctx(), &CancellationToken::new())
        .await
        .expect("create succeeds");

    assert!(result.success);
    assert_eq!(result.metadata.created_nodes.len(), 1);
    assert_eq!(result.metadata.created_nodes[0].title, "Marketing");
    assert_eq!(board.node_count(), 1);
    assert_eq!(board.state().nodes[0].position, GRID_ORIGIN);
}

#[tokio::test]
async fn test_sequence_chains_edges() {
    let board = Arc::new(InMemoryBoard::new());
    let executor = CommandExecutor::new(board.clone());
    let action = DetectedAction::new(ActionType::CreateSequence, params("onboarding", Some(3)), 0.9);

    let result = executor
        .execute(&unit_for(&action), &action, &ctx(), &CancellationToken::new())
        .await
        .expect("sequence succeeds");

    assert_eq!(result.metadata.created_nodes.len(), 3);
    assert_eq!(result.metadata.created_edges.len(), 2);
    let titles: Vec<&str> = result.metadata.created_nodes.iter().map(|n| n.title.as_str()).collect();
    assert_eq!(titles, vec!["Step 1: Onboarding", "Step 2: Onboarding", "Step 3: Onboarding"]);

    let state = board.state();
    assert!(state.nodes.iter().all(|n| n.kind == NodeKind::Task));
    for (i, a) in state.nodes.iter().enumerate() {
        for b in state.nodes.iter().skip(i + 1) {
            assert!(a.position.distance(&b.position) >= MIN_DISTANCE, "Placed nodes must not overlap");
        }
    }
}

#[tokio::test]
async fn test_hierarchy_adds_root() {
    let board = Arc::new(InMemoryBoard::new());
    let executor = CommandExecutor::new(board.clone());
    let action = DetectedAction::new(ActionType::CreateHierarchy, params("biology", Some(3)), 0.9);

    let result = executor
        .execute(&unit_for(&action), &action, &ctx(), &CancellationToken::new())
        .await
        .expect("hierarchy succeeds");

    assert_eq!(result.metadata.created_nodes.len(), 4, "Root plus three children");
    assert_eq!(result.metadata.created_edges.len(), 3);
    assert_eq!(result.metadata.created_nodes[0].title, "Biology");
    let root = result.metadata.created_nodes[0].id;
    assert!(board.state().edges.iter().all(|e| e.source == root));
}

#[tokio::test]
async fn test_expand_reuses_existing_target() {
    let board = Arc::new(InMemoryBoard::with_nodes(2));
    let executor = CommandExecutor::new(board.clone());
    let mut parameters = params("note 1", Some(3));
    parameters.target = Some("note 1".to_string());
    let action = DetectedAction::new(ActionType::ExpandConcept, parameters, 0.9);

    let result = executor
        .execute(&unit_for(&action), &action, &ctx(), &CancellationToken::new())
        .await
        .expect("expand succeeds");

    let target = board.state().nodes[0].id;
    assert_eq!(result.metadata.created_nodes.len(), 3, "No new root when the target exists");
    assert_eq!(board.node_count(), 5);
    assert!(board.state().edges.iter().all(|e| e.source == target));
}

#[tokio::test]
async fn test_project_plan_template() {
    let board = Arc::new(InMemoryBoard::new());
    let executor = CommandExecutor::new(board.clone());
    let action = DetectedAction::new(ActionType::PlanProject, params("launch", None), 0.9);

    let result = executor
        .execute(&unit_for(&action), &action, &ctx(), &CancellationToken::new())
        .await
        .expect("plan succeeds");

    let titles: Vec<&str> = result.metadata.created_nodes.iter().map(|n| n.title.as_str()).collect();
    assert_eq!(
        titles,
        vec!["Discovery · Launch", "Planning · Launch", "Execution · Launch", "Review · Launch"]
    );
    assert_eq!(result.metadata.created_edges.len(), 3);
}

#[tokio::test]
async fn test_improve_links_from_target() {
    let board = Arc::new(InMemoryBoard::with_nodes(1));
    let executor = CommandExecutor::new(board.clone());
    let original = board.state().nodes[0].id;
    let mut parameters = params("pricing", None);
    parameters.target = Some(original.to_string());
    let action = DetectedAction::new(ActionType::ImproveContent, parameters, 0.9);

    let result = executor
        .execute(&unit_for(&action), &action, &ctx(), &CancellationToken::new())
        .await
        .expect("improve succeeds");

    assert_eq!(result.metadata.created_nodes[0].title, "Revised: Pricing");
    let edges = board.state().edges;
    assert_eq!(edges.len(), 1);
    assert_eq!(edges[0].source, original);
    assert_eq!(edges[0].attrs.label.as_deref(), Some("revises"));
}

#[tokio::test]
async fn test_analysis_is_read_only() {
    let board = Arc::new(InMemoryBoard::with_nodes(3));
    let executor = CommandExecutor::new(board.clone());
    let action = DetectedAction::new(ActionType::AnalyzeBoard, ActionParameters::default(), 0.9);

    let result = executor
        .execute(&unit_for(&action), &action, &ctx(), &CancellationToken::new())
        .await
        .expect("analysis succeeds");

    assert_eq!(result.metadata.findings[0], "Board has 3 nodes and 0 edges");
    assert!(result.metadata.created_nodes.is_empty());
    assert_eq!(board.node_count(), 3, "Analysis never mutates the board");
}

#[tokio::test]
async fn test_node_analysis_without_target_is_fatal() {
    let executor = CommandExecutor::new(Arc::new(InMemoryBoard::new()));
    let action = DetectedAction::new(ActionType::AnalyzeNode, ActionParameters::default(), 0.9);

    let err = executor
        .execute(&unit_for(&action), &action, &ctx(), &CancellationToken::new())
        .await
        .expect_err("nothing to analyze");
    assert!(!err.recoverable(), "Missing target is not worth retrying");
}

#[tokio::test]
async fn test_connect_links_latest_nodes() {
    let board = Arc::new(InMemoryBoard::with_nodes(4));
    let executor = CommandExecutor::new(board.clone());
    let action = DetectedAction::new(ActionType::ConnectNodes, ActionParameters::default(), 0.9);

    let result = executor
        .execute(&unit_for(&action), &action, &ctx(), &CancellationToken::new())
        .await
        .expect("connect succeeds");

    assert_eq!(result.metadata.created_edges.len(), 2, "Three latest nodes chained");
    let first = board.state().nodes[0].id;
    assert!(board.state().edges.iter().all(|e| e.source != first && e.target != first));
}

#[tokio::test]
async fn test_connect_needs_two_nodes() {
    let executor = CommandExecutor::new(Arc::new(InMemoryBoard::with_nodes(1)));
    let action = DetectedAction::new(ActionType::ConnectNodes, ActionParameters::default(), 0.9);
    let err = executor
        .execute(&unit_for(&action), &action, &ctx(), &CancellationToken::new())
        .await
        .expect_err("one node cannot be connected");
    assert_eq!(err.kind, UnitErrorKind::Handler);
    assert!(!err.recoverable());
}

#[tokio::test]
async fn test_unsupported_type_is_not_an_error() {
    let board = Arc::new(InMemoryBoard::with_nodes(3));
    let executor = CommandExecutor::new(board.clone());
    let action = DetectedAction::new(ActionType::OrganizeNodes, ActionParameters::default(), 0.9);

    let result = executor
        .execute(&unit_for(&action), &action, &ctx(), &CancellationToken::new())
        .await
        .expect("unsupported returns a result");
    assert!(!result.success);
    assert_eq!(result.action_type, ActionType::OrganizeNodes);
}

#[tokio::test]
async fn test_cancelled_token_stops_before_mutation() {
    let board = Arc::new(InMemoryBoard::new());
    let executor = CommandExecutor::new(board.clone());
    let action = DetectedAction::new(ActionType::CreateMultiple, params("ideas", Some(4)), 0.9);
    let token = CancellationToken::new();
    token.cancel();

    let err = executor
        .execute(&unit_for(&action), &action, &ctx(), &token)
        .await
        .expect_err("cancelled");
    assert_eq!(err.kind, UnitErrorKind::Cancelled);
    assert_eq!(board.node_count(), 0);
}

#[test]
fn test_ledger_claims_are_exclusive() {
    let ledger = PlacementLedger::new();
    let stale_board: Vec<Position> = Vec::new();

    let first = ledger.reserve(&stale_board);
    let second = ledger.reserve(&stale_board);
    assert_eq!(first.position, GRID_ORIGIN);
    assert!(
        first.position.distance(&second.position) >= MIN_DISTANCE,
        "Second claim must avoid the first even though the board shows neither"
    );

    ledger.release(first);
    assert_eq!(ledger.claimed(), 1);
    assert_eq!(ledger.reserve(&stale_board).position, GRID_ORIGIN, "Released cells are reused");

    let node = NodeId::new();
    ledger.confirm(second, node);
    ledger.release_node(node);
    assert_eq!(ledger.claimed(), 1);
}

#[tokio::test]
async fn test_partial_effects_can_be_rolled_back() {
    let board = Arc::new(NoEdgeBoard {
        inner: InMemoryBoard::new(),
    });
    let executor = CommandExecutor::new(board.clone());
    let action = DetectedAction::new(ActionType::CreateSequence, params("release", Some(3)), 0.9);

    let err = executor
        .execute(&unit_for(&action), &action, &ctx(), &CancellationToken::new())
        .await
        .expect_err("edges fail");
    assert_eq!(err.kind, UnitErrorKind::Board);
    assert!(err.recoverable(), "Board errors may be retried");
    assert_eq!(err.partial.nodes.len(), 2, "Second node was placed before the first edge failed");
    assert_eq!(board.inner.node_count(), 2);

    let removed = executor.rollback(&err.partial).await;
    assert_eq!(removed, 2);
    assert_eq!(board.inner.node_count(), 0);
    assert_eq!(executor.placements().claimed(), 0, "Undone nodes give their cells back");
    assert_eq!(executor.rollback(&err.partial).await, 0, "Rollback is idempotent");
}

#[tokio::test]
async fn test_gateway_text_used_when_available() {
    let board = Arc::new(InMemoryBoard::new());
    let executor = CommandExecutor::with_gateway(
        board.clone(),
        Arc::new(CannedGateway {
            reply: Some("Title: Go-to-market basics\nWho we sell to and how."),
        }),
    );
    let action = DetectedAction::new(ActionType::CreateSingle, params("marketing", None), 0.9);

    let result = executor
        .execute(&unit_for(&action), &action, &ctx(), &CancellationToken::new())
        .await
        .expect("create succeeds");
    assert_eq!(result.metadata.created_nodes[0].title, "Go-to-market basics");
    assert_eq!(result.metadata.token_usage.prompt_tokens, 12);
    assert_eq!(board.state().nodes[0].content, "Who we sell to and how.");
}

#[tokio::test]
async fn test_gateway_failure_falls_back_to_template() {
    let board = Arc::new(InMemoryBoard::new());
    let executor = CommandExecutor::with_gateway(board.clone(), Arc::new(CannedGateway { reply: None }));
    let action = DetectedAction::new(ActionType::ResearchTopic, params("solar", None), 0.9);

    let result = executor
        .execute(&unit_for(&action), &action, &ctx(), &CancellationToken::new())
        .await
        .expect("template fallback succeeds");
    assert_eq!(result.metadata.created_nodes[0].title, "Research: Solar");
    assert_eq!(result.metadata.token_usage, TokenUsage::default());
}

#[test]
fn test_completion_parsing() {
    let draft = parse_completion("# Title: \"Launch plan\"\nLine one\n\nLine two").expect("draft");
    assert_eq!(draft.title, "Launch plan");
    assert_eq!(draft.content, "Line one\nLine two");
    assert!(parse_completion("   \n  ").is_none());
}

#[test]
fn test_template_titles() {
    let parameters = params("ideas", None);
    let draft = template_draft(&DraftRequest {
        action_type: ActionType::BrainstormIdeas,
        parameters: &parameters,
        role: "Idea 2 of 5".to_string(),
        index: 1,
        request_text: "",
    });
    assert_eq!(draft.title, "Idea 2: Ideas");
    assert_eq!(draft.content, "Idea 2 of 5 for ideas.");
}
