use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use weaver::executor::placement::MIN_DISTANCE;
use weaver::executor::{ActionHandler, ExecutionContext, HandlerOutput, UnitRequest};
use weaver::intent::types::{ActionContext, ActionParameters, ActionType, DetectedAction};
use weaver::kernel::error::{BoardError, PartialEffects, UnitError, UnitErrorKind};
use weaver::kernel::progress::{ExecutionProgress, RunStatus};
use weaver::planner::types::PlanId;
use weaver::services::board::{EdgeAttrs, EdgeId, GraphDocument, GraphState, InMemoryBoard, Node, NodeId, NodeSpec};
use weaver::{ActionDetector, ExecutionCapabilities, Orchestrator};

/// Refuses any node whose title contains "Broken".
struct PickyBoard {
    inner: InMemoryBoard,
}

#[async_trait]
impl GraphDocument for PickyBoard {
    async fn add_node(&self, spec: NodeSpec) -> Result<NodeId, BoardError> {
        if spec.title.contains("Broken") {
            return Err(BoardError::Unavailable("shard offline".into()));
        }
        self.inner.add_node(spec).await
    }
    async fn add_edge(&self, source: NodeId, target: NodeId, attrs: EdgeAttrs) -> Result<EdgeId, BoardError> {
        self.inner.add_edge(source, target, attrs).await
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

/// Suspends before every call, the way a remote board would.
struct YieldingBoard {
    inner: InMemoryBoard,
}

#[async_trait]
impl GraphDocument for YieldingBoard {
    async fn add_node(&self, spec: NodeSpec) -> Result<NodeId, BoardError> {
        tokio::task::yield_now().await;
        self.inner.add_node(spec).await
    }
    async fn add_edge(&self, source: NodeId, target: NodeId, attrs: EdgeAttrs) -> Result<EdgeId, BoardError> {
        tokio::task::yield_now().await;
        self.inner.add_edge(source, target, attrs).await
    }
    async fn list_nodes(&self) -> Result<Vec<Node>, BoardError> {
        tokio::task::yield_now().await;
        self.inner.list_nodes().await
    }
    async fn snapshot(&self) -> Result<GraphState, BoardError> {
        tokio::task::yield_now().await;
        self.inner.snapshot().await
    }
    async fn remove_node(&self, id: NodeId) -> Result<(), BoardError> {
        self.inner.remove_node(id).await
    }
    async fn remove_edge(&self, id: EdgeId) -> Result<(), BoardError> {
        self.inner.remove_edge(id).await
    }
}

struct FailingHandler {
    calls: Arc<AtomicU32>,
    message: &'static str,
}

#[async_trait]
impl ActionHandler for FailingHandler {
    async fn handle(&self, _request: UnitRequest<'_>, _effects: &mut PartialEffects) -> Result<HandlerOutput, UnitError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(UnitError::new(UnitErrorKind::Handler, self.message))
    }
}

struct SlowHandler;

#[async_trait]
impl ActionHandler for SlowHandler {
    async fn handle(&self, _request: UnitRequest<'_>, _effects: &mut PartialEffects) -> Result<HandlerOutput, UnitError> {
        tokio::time::sleep(Duration::from_millis(500)).await;
        Ok(HandlerOutput::default())
    }
}

fn caps() -> ExecutionCapabilities {
    ExecutionCapabilities {
        retry_backoff_ms: 0,
        ..ExecutionCapabilities::default()
    }
}

fn single(topic: &str) -> DetectedAction {
    DetectedAction::new(
        ActionType::CreateSingle,
        ActionParameters {
            topic: Some(topic.to_string()),
            ..ActionParameters::default()
        },
        0.9,
    )
}

fn ctx() -> ExecutionContext {
    ExecutionContext::new("test request", ActionContext::empty_board())
}

#[tokio::test]
async fn test_marketing_node_end_to_end() {
    let board = Arc::new(InMemoryBoard::new());
    let orchestrator = Orchestrator::new(caps(), board.clone());
    let context = ActionContext::empty_board();
    let actions = ActionDetector::new().detect("create a marketing node", &context);

    let report = orchestrator
        .execute(actions, &ExecutionContext::new("create a marketing node", context), |_| {})
        .await;

    assert!(report.success, "Report: {:?}", report);
    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(report.summary.total_actions, 1);
    assert_eq!(report.summary.completed_actions, 1);
    assert_eq!(report.quality.nodes_created, 1);
    assert_eq!(board.node_count(), 1);
    assert_eq!(board.state().nodes[0].title, "Marketing");
    assert!(report.recommendations.iter().any(|r| r.contains("template")));
}

#[tokio::test]
async fn test_threshold_skips_everything() {
    let orchestrator = Orchestrator::new(
        ExecutionCapabilities {
            confidence_threshold: Some(0.4),
            ..caps()
        },
        Arc::new(InMemoryBoard::new()),
    );
    let actions = vec![
        DetectedAction::new(ActionType::CreateSingle, ActionParameters::default(), 0.1),
        DetectedAction::new(ActionType::AnalyzeBoard, ActionParameters::default(), 0.2),
    ];

    let report = orchestrator.execute(actions, &ctx(), |_| {}).await;

    assert!(report.success, "Nothing actionable is not a failure");
    assert_eq!(report.summary.total_actions, 0);
    assert_eq!(report.summary.skipped_actions, 2);
    assert!(report.recommendations.iter().any(|r| r.contains("conversational")));
    assert_eq!(orchestrator.telemetry_snapshot().run_stats.skipped_actions, 2);
}

#[tokio::test]
async fn test_threshold_drops_dependents_of_skipped() {
    let board = Arc::new(InMemoryBoard::new());
    let orchestrator = Orchestrator::new(
        ExecutionCapabilities {
            confidence_threshold: Some(0.5),
            ..caps()
        },
        board.clone(),
    );
    let weak = DetectedAction::new(ActionType::CreateSingle, ActionParameters::default(), 0.3);
    let dependent = single("follow-up").depends_on(weak.id);
    let independent = single("standalone");

    let report = orchestrator.execute(vec![weak, dependent, independent], &ctx(), |_| {}).await;

    assert!(report.success);
    assert_eq!(report.summary.total_actions, 1);
    assert_eq!(report.summary.skipped_actions, 2);
    assert_eq!(board.node_count(), 1);
}

#[tokio::test]
async fn test_failure_is_isolated_within_group() {
    let board = Arc::new(PickyBoard {
        inner: InMemoryBoard::new(),
    });
    let orchestrator = Orchestrator::new(caps(), board.clone());
    let actions = vec![single("alpha"), single("broken"), single("gamma")];

    let report = orchestrator.execute(actions, &ctx(), |_| {}).await;

    assert_eq!(report.summary.completed_actions, 2, "Siblings of a failed unit still complete");
    assert_eq!(report.summary.failed_actions, 1);
    assert!(!report.success);
    assert_eq!(report.status, RunStatus::Failed);
    assert_eq!(board.inner.node_count(), 2);

    let failure = &report.errors[0];
    assert_eq!(failure.kind, UnitErrorKind::Board);
    assert!(failure.recoverable);
    assert_eq!(failure.attempts, 3, "Board errors are retried up to max_retries");
    assert!(report.recommendations.iter().any(|r| r.contains("1 failed action")));
}

#[tokio::test]
async fn test_retry_bound() {
    let calls = Arc::new(AtomicU32::new(0));
    let orchestrator = Orchestrator::new(caps(), Arc::new(InMemoryBoard::new())).with_handler(
        ActionType::CreateSingle,
        Arc::new(FailingHandler {
            calls: calls.clone(),
            message: "upstream hiccup",
        }),
    );

    let report = orchestrator.execute(vec![single("retry me")], &ctx(), |_| {}).await;

    assert_eq!(calls.load(Ordering::SeqCst), 3, "max_retries = 2 means three attempts");
    assert_eq!(report.summary.failed_actions, 1);
    assert_eq!(report.errors[0].attempts, 3);
    assert_eq!(orchestrator.telemetry_snapshot().unit_stats.retries, 2);
}

#[tokio::test]
async fn test_fatal_marker_skips_retries() {
    let calls = Arc::new(AtomicU32::new(0));
    let orchestrator = Orchestrator::new(caps(), Arc::new(InMemoryBoard::new())).with_handler(
        ActionType::CreateSingle,
        Arc::new(FailingHandler {
            calls: calls.clone(),
            message: "FATAL: malformed parameters",
        }),
    );

    let report = orchestrator.execute(vec![single("once")], &ctx(), |_| {}).await;

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(report.errors[0].attempts, 1);
    assert!(!report.errors[0].recoverable);
}

#[tokio::test]
async fn test_unsupported_action_fails_without_retry() {
    let orchestrator = Orchestrator::new(caps(), Arc::new(InMemoryBoard::with_nodes(12)));
    let organize = DetectedAction::new(ActionType::OrganizeNodes, ActionParameters::default(), 0.8);

    let report = orchestrator.execute(vec![organize, single("sibling")], &ctx(), |_| {}).await;

    assert_eq!(report.summary.completed_actions, 1, "Sibling still runs");
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].kind, UnitErrorKind::Unsupported);
    assert_eq!(report.errors[0].attempts, 1);
}

#[tokio::test]
async fn test_timeout_is_recoverable() {
    let orchestrator = Orchestrator::new(
        ExecutionCapabilities {
            timeout_ms: 20,
            max_retries: 1,
            ..caps()
        },
        Arc::new(InMemoryBoard::new()),
    )
    .with_handler(ActionType::CreateSingle, Arc::new(SlowHandler));

    let report = orchestrator.execute(vec![single("slow")], &ctx(), |_| {}).await;

    let failure = &report.errors[0];
    assert_eq!(failure.kind, UnitErrorKind::Timeout);
    assert!(failure.recoverable);
    assert_eq!(failure.attempts, 2, "Timed-out attempts are retried");
    assert_eq!(orchestrator.telemetry_snapshot().unit_stats.timeouts, 2);
}

#[tokio::test]
async fn test_failed_group_halts_run_without_rollback() {
    let board = Arc::new(InMemoryBoard::new());
    let orchestrator = Orchestrator::new(caps(), board.clone());
    let organize = DetectedAction::new(ActionType::OrganizeNodes, ActionParameters::default(), 0.8);
    let next = single("after").depends_on(organize.id);

    let report = orchestrator.execute(vec![organize, next], &ctx(), |_| {}).await;

    assert_eq!(report.status, RunStatus::Failed);
    assert_eq!(report.summary.failed_actions, 1);
    assert_eq!(report.summary.cancelled_actions, 1, "Later group never launched");
    assert_eq!(board.node_count(), 0);
}

#[tokio::test]
async fn test_rollback_undoes_partial_effects_and_continues() {
    let board = Arc::new(NoEdgeBoard {
        inner: InMemoryBoard::new(),
    });
    let orchestrator = Orchestrator::new(
        ExecutionCapabilities {
            rollback_enabled: true,
            max_retries: 1,
            ..caps()
        },
        board.clone(),
    );
    let sequence = DetectedAction::new(
        ActionType::CreateSequence,
        ActionParameters {
            topic: Some("release".into()),
            count: Some(3),
            ..ActionParameters::default()
        },
        0.9,
    );
    let independent = single("independent");
    let blocked = single("blocked").depends_on(sequence.id);
    let follow_up = single("follow up").depends_on(independent.id);

    let report = orchestrator
        .execute(vec![sequence, independent, blocked, follow_up], &ctx(), |_| {})
        .await;

    assert_eq!(report.status, RunStatus::Failed);
    assert_eq!(report.summary.completed_actions, 2, "Independent branch runs to the end");
    assert_eq!(report.summary.failed_actions, 1);
    assert_eq!(report.summary.cancelled_actions, 1, "Dependent of the failed unit is cancelled");
    assert!(report.errors[0].rolled_back);
    assert_eq!(report.errors.len(), 2, "The cancelled dependent explains why it never ran");
    assert_eq!(report.errors[1].kind, UnitErrorKind::Cancelled);
    assert_eq!(report.errors[1].attempts, 0);
    assert!(report.errors[1].message.contains("did not complete"));
    assert_eq!(board.inner.node_count(), 2, "Only the two single nodes remain");

    let telemetry = orchestrator.telemetry_snapshot();
    assert_eq!(telemetry.unit_stats.rollbacks, 2, "Each failed attempt is undone");
}

#[tokio::test]
async fn test_cancel_before_first_group() {
    let board = Arc::new(InMemoryBoard::new());
    let orchestrator = Arc::new(Orchestrator::new(caps(), board.clone()));
    let cancelled = Arc::new(AtomicBool::new(false));

    let handle = orchestrator.clone();
    let flag = cancelled.clone();
    let report = orchestrator
        .execute(vec![single("one"), single("two")], &ctx(), move |p: &ExecutionProgress| {
            if p.status == RunStatus::Planning {
                flag.store(handle.cancel_execution(p.plan_id), Ordering::SeqCst);
            }
        })
        .await;

    assert!(cancelled.load(Ordering::SeqCst), "Live plan accepts cancellation");
    assert_eq!(report.status, RunStatus::Cancelled);
    assert!(report.success, "Cancelling is not a failure");
    assert_eq!(report.summary.cancelled_actions, 2);
    assert_eq!(report.summary.completed_actions, 0);
    assert_eq!(board.node_count(), 0);
    assert!(orchestrator.execution_progress(report.plan_id).is_none());
    assert!(report.recommendations.iter().any(|r| r.contains("cancelled")));
}

#[tokio::test]
async fn test_cancel_after_last_group_keeps_completed() {
    let orchestrator = Arc::new(Orchestrator::new(caps(), Arc::new(InMemoryBoard::new())));
    let handle = orchestrator.clone();
    let report = orchestrator
        .execute(vec![single("done")], &ctx(), move |p: &ExecutionProgress| {
            if p.status == RunStatus::Executing && p.current_step == p.total_steps {
                handle.cancel_execution(p.plan_id);
            }
        })
        .await;

    assert_eq!(report.status, RunStatus::Completed, "Every unit had already finished");
    assert!(report.success);
    assert_eq!(report.summary.completed_actions, 1);
    assert_eq!(report.summary.cancelled_actions, 0);
}

#[tokio::test]
async fn test_concurrent_units_never_share_a_position() {
    let board = Arc::new(YieldingBoard {
        inner: InMemoryBoard::with_nodes(1),
    });
    let orchestrator = Orchestrator::new(caps(), board.clone());
    let actions = vec![single("alpha"), single("beta"), single("gamma")];

    let report = orchestrator.execute(actions, &ctx(), |_| {}).await;
    assert_eq!(report.summary.completed_actions, 3);

    let positions: Vec<_> = board.inner.state().nodes.iter().map(|n| n.position).collect();
    assert_eq!(positions.len(), 4);
    for (i, a) in positions.iter().enumerate() {
        for b in positions.iter().skip(i + 1) {
            assert!(
                a.distance(b) >= MIN_DISTANCE,
                "Nodes overlap: {:?} vs {:?} in {:?}",
                a,
                b,
                positions
            );
        }
    }
}

#[tokio::test]
async fn test_cancel_unknown_plan() {
    let orchestrator = Orchestrator::new(caps(), Arc::new(InMemoryBoard::new()));
    assert!(!orchestrator.cancel_execution(PlanId::new()));
}

#[tokio::test]
async fn test_progress_reports_each_group() {
    let orchestrator = Arc::new(Orchestrator::new(caps(), Arc::new(InMemoryBoard::new())));
    let seen: Arc<Mutex<Vec<ExecutionProgress>>> = Arc::new(Mutex::new(Vec::new()));
    let live: Arc<Mutex<Vec<bool>>> = Arc::new(Mutex::new(Vec::new()));

    let first = single("first");
    let second = single("second").depends_on(first.id);

    let sink = seen.clone();
    let live_sink = live.clone();
    let handle = orchestrator.clone();
    let report = orchestrator
        .execute(vec![first, second], &ctx(), move |p: &ExecutionProgress| {
            sink.lock().push(p.clone());
            if p.status == RunStatus::Executing {
                live_sink.lock().push(handle.execution_progress(p.plan_id).is_some());
            }
        })
        .await;

    let seen = seen.lock();
    assert_eq!(seen.len(), 4, "Planning, two groups, final");
    assert_eq!(seen[0].status, RunStatus::Planning);
    assert_eq!(seen[0].total_steps, 2);
    assert_eq!(seen[1].current_step, 1);
    assert_eq!(seen[1].completed_actions, 1);
    assert_eq!(seen[2].current_step, 2);
    assert_eq!(seen[3].status, RunStatus::Completed);
    assert_eq!(seen[3].completed_actions, 2);
    assert_eq!(seen[3].estimated_time_remaining_ms, 0);
    assert!(live.lock().iter().all(|l| *l), "Progress is queryable while the run is live");
    assert!(orchestrator.execution_progress(report.plan_id).is_none(), "Bookkeeping released");
}

#[tokio::test]
async fn test_cycle_produces_catastrophic_report() {
    let orchestrator = Orchestrator::new(caps(), Arc::new(InMemoryBoard::new()));
    let mut a = single("a");
    let mut b = single("b");
    a.dependencies.push(b.id);
    b.dependencies.push(a.id);

    let report = orchestrator.execute(vec![a, b], &ctx(), |_| {}).await;

    assert!(!report.success);
    assert_eq!(report.status, RunStatus::Failed);
    assert_eq!(report.summary.completed_actions, 0);
    assert!(report.planning_error.as_deref().is_some_and(|e| e.contains("cycle")));
    assert_eq!(orchestrator.telemetry_snapshot().run_stats.plans_rejected, 1);
}

#[tokio::test]
async fn test_telemetry_counts_runs() {
    let orchestrator = Orchestrator::new(caps(), Arc::new(InMemoryBoard::new()));
    orchestrator.execute(vec![single("one")], &ctx(), |_| {}).await;
    orchestrator.execute(vec![single("two"), single("three")], &ctx(), |_| {}).await;

    let snap = orchestrator.telemetry_snapshot();
    assert_eq!(snap.run_stats.plans_built, 2);
    assert_eq!(snap.run_stats.completed, 2);
    assert_eq!(snap.group_stats.groups, 2);
    assert_eq!(snap.unit_stats.retries, 0);
}
