//! Group-synchronous plan execution.
//!
//! One parallel group is in flight at a time. Members of a group run
//! concurrently on the caller's task and are joined before the next group
//! starts. Nothing is spawned.

use futures::future::join_all;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::cancel::CancellationRegistry;
use super::config::ExecutionCapabilities;
use super::error::{PartialEffects, UnitError, UnitErrorKind, UnitFailure};
use super::progress::{estimate_remaining, ExecutionProgress, RunStatus};
use super::telemetry::event::{PlanRejection, RunOutcome, TelemetryEvent};
use super::telemetry::{TelemetryRecorder, TelemetrySnapshot};
use crate::executor::{ActionHandler, CommandExecutor, ExecutionContext};
use crate::intent::types::{ActionId, ActionType, DetectedAction};
use crate::planner::build_plan;
use crate::planner::types::{ActionExecution, ExecutionId, ExecutionPlan, ExecutionStatus, PlanId};
use crate::report::{self, ExecutionReport};
use crate::services::board::GraphDocument;
use crate::services::llm::LanguageModelGateway;

pub struct Orchestrator {
    capabilities: ExecutionCapabilities,
    board: Arc<dyn GraphDocument>,
    executor: CommandExecutor,
    cancels: CancellationRegistry,
    active: Mutex<HashMap<PlanId, ExecutionProgress>>,
    telemetry: Mutex<TelemetryRecorder>,
}

impl Orchestrator {
    pub fn new(capabilities: ExecutionCapabilities, board: Arc<dyn GraphDocument>) -> Self {
        let executor = CommandExecutor::new(board.clone());
        Self {
            capabilities,
            board,
            executor,
            cancels: CancellationRegistry::new(),
            active: Mutex::new(HashMap::new()),
            telemetry: Mutex::new(TelemetryRecorder::new()),
        }
    }

    /// Route node text through a language model. Replaces the executor, so
    /// call this before `with_handler`.
    pub fn with_gateway(mut self, gateway: Arc<dyn LanguageModelGateway>) -> Self {
        self.executor = CommandExecutor::with_gateway(self.board.clone(), gateway);
        self
    }

    /// Install or override the handler for one action type.
    pub fn with_handler(mut self, action_type: ActionType, handler: Arc<dyn ActionHandler>) -> Self {
        self.executor.register(action_type, handler);
        self
    }

    pub fn capabilities(&self) -> &ExecutionCapabilities {
        &self.capabilities
    }

    pub fn executor(&self) -> &CommandExecutor {
        &self.executor
    }

    /// Live snapshot while the run exists; `None` once it finished or was cancelled.
    pub fn execution_progress(&self, plan_id: PlanId) -> Option<ExecutionProgress> {
        self.active.lock().get(&plan_id).cloned()
    }

    /// Request cooperative cancellation. Units not yet started become
    /// Cancelled; in-flight handlers stop at their next graph mutation.
    pub fn cancel_execution(&self, plan_id: PlanId) -> bool {
        if !self.cancels.cancel(plan_id) {
            return false;
        }
        if let Some(mut progress) = self.active.lock().remove(&plan_id) {
            progress.status = RunStatus::Cancelled;
            debug!("Released bookkeeping for plan {} at step {}", plan_id, progress.current_step);
        }
        info!("Plan {} cancelled", plan_id);
        true
    }

    pub fn telemetry_snapshot(&self) -> TelemetrySnapshot {
        self.telemetry.lock().snapshot()
    }

    fn record(&self, event: TelemetryEvent) {
        self.telemetry.lock().record(event);
    }

    /// Run detected actions against the board and report the outcome.
    ///
    /// Never returns an error: planning failures become a catastrophic
    /// report and unit failures are contained to their unit.
    pub async fn execute<F>(&self, actions: Vec<DetectedAction>, ctx: &ExecutionContext, on_progress: F) -> ExecutionReport
    where
        F: Fn(&ExecutionProgress),
    {
        let started = Instant::now();
        let input_count = actions.len();

        let actions = apply_threshold(actions, self.capabilities.confidence_threshold);
        let skipped = input_count - actions.len();
        if skipped > 0 {
            self.record(TelemetryEvent::ActionsSkipped { count: skipped });
        }
        if actions.is_empty() {
            info!("No actions above threshold ({} skipped); conversational mode", skipped);
            return ExecutionReport::skipped(skipped, started.elapsed());
        }

        let mut plan = match build_plan(&actions, self.capabilities.max_parallel_actions) {
            Ok(plan) => plan,
            Err(e) => {
                error!("Planning failed: {}", e);
                self.record(TelemetryEvent::PlanRejected {
                    reason: PlanRejection::from(&e),
                });
                return ExecutionReport::catastrophic(&e, actions.len(), skipped, started.elapsed());
            }
        };

        // Owned for this call only.
        let lookup: HashMap<ActionId, DetectedAction> = actions.into_iter().map(|a| (a.id, a)).collect();

        let estimated_ms = plan.estimated_time.as_millis() as u64;
        let token = self.cancels.register(plan.id);
        let mut progress =
            ExecutionProgress::planning(plan.id, plan.actions.len(), plan.parallel_groups.len(), estimated_ms);
        self.active.lock().insert(plan.id, progress.clone());
        self.record(TelemetryEvent::PlanBuilt {
            plan_id: plan.id,
            units: plan.actions.len(),
            groups: plan.parallel_groups.len(),
            complexity: plan.complexity,
            estimated_ms,
        });
        info!(
            "Executing plan {}: {} units in {} groups",
            plan.id,
            plan.actions.len(),
            plan.parallel_groups.len()
        );
        on_progress(&progress);

        let groups = plan.parallel_groups.clone();
        let mut halted = false;
        // Units stopped by the cancellation token, as opposed to by a failed dependency or a halt.
        let mut interrupted = 0;
        for (step, group) in groups.iter().enumerate() {
            if token.is_cancelled() || halted {
                break;
            }
            let group_started = Instant::now();
            progress.status = RunStatus::Executing;
            progress.current_step = step + 1;

            let launch = self.promote(&mut plan, group);
            debug!("Group {}/{}: launching {} of {} units", step + 1, groups.len(), launch.len(), group.len());

            let runs = plan
                .actions
                .iter_mut()
                .filter(|unit| launch.contains(&unit.id))
                .filter_map(|unit| {
                    lookup
                        .get(&unit.action_id)
                        .map(|action| self.run_unit(unit, action, ctx, &token))
                });
            interrupted += join_all(runs).await.into_iter().filter(|stopped| *stopped).count();

            let group_failed = group
                .iter()
                .filter_map(|id| plan.get(*id))
                .filter(|u| u.is_failure())
                .count();
            let group_completed = group
                .iter()
                .filter_map(|id| plan.get(*id))
                .filter(|u| u.status() == ExecutionStatus::Completed)
                .count();

            progress.completed_actions = plan.count_status(ExecutionStatus::Completed);
            progress.failed_actions = plan.actions.iter().filter(|u| u.is_failure()).count();
            progress.elapsed_ms = started.elapsed().as_millis() as u64;
            progress.estimated_time_remaining_ms =
                estimate_remaining(estimated_ms, progress.total_steps, progress.current_step, progress.elapsed_ms);

            self.record(TelemetryEvent::GroupCompleted {
                plan_id: plan.id,
                step: step + 1,
                completed: group_completed,
                failed: group_failed,
                duration_ms: group_started.elapsed().as_millis() as u64,
            });

            if group_failed > 0 && !self.capabilities.rollback_enabled {
                warn!(
                    "Group {} had {} failed units; not launching further groups",
                    step + 1,
                    group_failed
                );
                halted = true;
            }

            // Cancellation already removed the bookkeeping entry; do not resurrect it.
            {
                let mut active = self.active.lock();
                if let Some(entry) = active.get_mut(&plan.id) {
                    *entry = progress.clone();
                }
            }
            on_progress(&progress);
        }

        let cancelled = token.is_cancelled();
        let mut never_started = 0;
        for unit in plan.actions.iter_mut() {
            if unit.cancel(None) {
                never_started += 1;
            }
        }
        if never_started > 0 {
            debug!("{} units of plan {} never started", never_started, plan.id);
        }
        if cancelled {
            interrupted += never_started;
        }

        // A cancel that lands after the last unit finished changes nothing.
        let status = if interrupted > 0 {
            RunStatus::Cancelled
        } else if plan.actions.iter().any(|u| u.is_failure()) {
            RunStatus::Failed
        } else {
            RunStatus::Completed
        };

        self.cancels.release(plan.id);
        self.active.lock().remove(&plan.id);

        let elapsed = started.elapsed();
        progress.status = status;
        progress.completed_actions = plan.count_status(ExecutionStatus::Completed);
        progress.failed_actions = plan.actions.iter().filter(|u| u.is_failure()).count();
        progress.elapsed_ms = elapsed.as_millis() as u64;
        progress.estimated_time_remaining_ms = 0;
        on_progress(&progress);

        self.record(TelemetryEvent::RunFinished {
            plan_id: plan.id,
            outcome: match status {
                RunStatus::Cancelled => RunOutcome::Cancelled,
                RunStatus::Failed => RunOutcome::Failed,
                _ => RunOutcome::Completed,
            },
            duration_ms: elapsed.as_millis() as u64,
        });
        info!(
            "Plan {} finished {:?}: {}/{} completed in {:?}",
            plan.id,
            status,
            progress.completed_actions,
            plan.actions.len(),
            elapsed
        );

        report::generate(&plan, status, elapsed, skipped)
    }

    /// Move a group's units to Ready. Units whose dependencies did not all
    /// complete are cancelled without starting.
    fn promote(&self, plan: &mut ExecutionPlan, group: &[ExecutionId]) -> HashSet<ExecutionId> {
        let blocked: Vec<(ExecutionId, Option<ExecutionId>)> = group
            .iter()
            .filter_map(|id| plan.get(*id))
            .map(|unit| {
                let broken = unit
                    .dependencies
                    .iter()
                    .copied()
                    .find(|dep| plan.get(*dep).map(|d| d.status()) != Some(ExecutionStatus::Completed));
                (unit.id, broken)
            })
            .collect();

        let mut launch = HashSet::with_capacity(group.len());
        for (id, broken) in blocked {
            let Some(unit) = plan.get_mut(id) else { continue };
            match broken {
                None => {
                    if unit.transition(ExecutionStatus::Ready).is_ok() {
                        launch.insert(id);
                    }
                }
                Some(dep) => {
                    warn!("Unit {} skipped: dependency {} did not complete", id, dep);
                    let failure = UnitFailure {
                        execution_id: id,
                        action_type: unit.action_type,
                        kind: UnitErrorKind::Cancelled,
                        message: format!("dependency {} did not complete", dep),
                        recoverable: false,
                        attempts: 0,
                        rolled_back: false,
                    };
                    unit.cancel(Some(failure));
                }
            }
        }
        launch
    }

    /// Attempt loop for one unit: Ready -> Running -> (Pending -> Ready -> Running)* -> terminal.
    /// Returns true when the cancellation token stopped the unit.
    async fn run_unit(
        &self,
        unit: &mut ActionExecution,
        action: &DetectedAction,
        ctx: &ExecutionContext,
        token: &CancellationToken,
    ) -> bool {
        let started = Instant::now();
        let caps = &self.capabilities;
        let mut undone_any = false;

        loop {
            if unit.status() == ExecutionStatus::Pending {
                let _ = unit.transition(ExecutionStatus::Ready);
            }
            if token.is_cancelled() {
                return unit.cancel(None);
            }
            if unit.transition(ExecutionStatus::Running).is_err() {
                warn!("Unit {} could not start from {:?}", unit.id, unit.status());
                return false;
            }
            unit.attempts += 1;

            let mut effects = PartialEffects::default();
            let attempt = tokio::time::timeout(
                caps.unit_timeout(),
                self.executor.execute_tracked(unit, action, ctx, token, &mut effects),
            )
            .await;

            let err = match attempt {
                Ok(Ok(result)) if result.success => {
                    unit.duration_ms = started.elapsed().as_millis() as u64;
                    let _ = unit.complete(result);
                    return false;
                }
                Ok(Ok(result)) => UnitError::fatal(UnitErrorKind::Unsupported, result.message),
                Ok(Err(e)) => e,
                Err(_) => {
                    warn!("Unit {} timed out after {}ms", unit.id, caps.timeout_ms);
                    self.record(TelemetryEvent::UnitTimedOut {
                        execution_id: unit.id,
                        timeout_ms: caps.timeout_ms,
                    });
                    UnitError::timeout(caps.timeout_ms)
                }
            };

            if caps.rollback_enabled && !effects.is_empty() {
                let removed = self.executor.rollback(&effects).await;
                self.record(TelemetryEvent::UnitRolledBack {
                    execution_id: unit.id,
                    removed,
                });
                debug!("Rolled back {} effects of unit {}", removed, unit.id);
                undone_any = true;
            }

            if err.kind == UnitErrorKind::Cancelled || token.is_cancelled() {
                let failure = failure_record(unit, action.action_type, &err, undone_any);
                return unit.cancel(Some(failure));
            }

            if err.recoverable() && unit.retry_count < caps.max_retries {
                unit.retry_count += 1;
                warn!(
                    "Unit {} ({}) failed: {}; retry {}/{}",
                    unit.id, action.action_type, err, unit.retry_count, caps.max_retries
                );
                self.record(TelemetryEvent::UnitRetried {
                    execution_id: unit.id,
                    action_type: action.action_type,
                    retry: unit.retry_count,
                    kind: err.kind,
                });
                let _ = unit.transition(ExecutionStatus::Pending);
                let backoff = caps.backoff_for(unit.retry_count);
                if backoff > Duration::ZERO {
                    tokio::select! {
                        _ = tokio::time::sleep(backoff) => {}
                        _ = token.cancelled() => {}
                    }
                }
                continue;
            }

            error!("Unit {} ({}) failed permanently: {}", unit.id, action.action_type, err);
            unit.duration_ms = started.elapsed().as_millis() as u64;
            let failure = failure_record(unit, action.action_type, &err, undone_any);
            let _ = unit.fail(failure);
            return false;
        }
    }
}

fn failure_record(unit: &ActionExecution, action_type: ActionType, err: &UnitError, rolled_back: bool) -> UnitFailure {
    UnitFailure {
        execution_id: unit.id,
        action_type,
        kind: err.kind,
        message: err.message.clone(),
        recoverable: err.recoverable(),
        attempts: unit.attempts,
        rolled_back,
    }
}

/// Pure function: drop actions below `threshold`, and transitively any
/// action that depends on a dropped one.
pub fn apply_threshold(actions: Vec<DetectedAction>, threshold: Option<f32>) -> Vec<DetectedAction> {
    let Some(threshold) = threshold else {
        return actions;
    };
    let mut dropped: HashSet<ActionId> = actions
        .iter()
        .filter(|a| a.confidence < threshold)
        .map(|a| a.id)
        .collect();
    loop {
        let before = dropped.len();
        for action in &actions {
            if action.dependencies.iter().any(|d| dropped.contains(d)) {
                dropped.insert(action.id);
            }
        }
        if dropped.len() == before {
            break;
        }
    }
    actions.into_iter().filter(|a| !dropped.contains(&a.id)).collect()
}
