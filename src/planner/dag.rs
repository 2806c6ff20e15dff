use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tracing::debug;

use super::types::*;
use crate::intent::types::{ActionId, DetectedAction};
use crate::kernel::error::PlanningError;

/// Cost assumed for every unit when estimating plan duration.
pub const BASE_UNIT_COST_MS: u64 = 2_000;
/// Discount applied per group for running members concurrently.
pub const PARALLEL_EFFICIENCY: f64 = 0.8;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Done,
}

/// Pure function: detected actions -> execution plan.
pub fn build_plan(actions: &[DetectedAction], max_parallel: usize) -> Result<ExecutionPlan, PlanningError> {
    let plan_id = PlanId::new();
    let max_parallel = max_parallel.max(1);

    let mut by_action: HashMap<ActionId, usize> = HashMap::with_capacity(actions.len());
    let mut units: Vec<ActionExecution> = Vec::with_capacity(actions.len());
    for action in actions {
        if by_action.insert(action.id, units.len()).is_some() {
            return Err(PlanningError::DuplicateAction(action.id.to_string()));
        }
        units.push(ActionExecution::new(plan_id, action.id, action.action_type, action.confidence));
    }

    // Wire adjacency by execution id.
    for (idx, action) in actions.iter().enumerate() {
        for dep in &action.dependencies {
            let dep_idx = *by_action.get(dep).ok_or_else(|| PlanningError::UnknownDependency {
                action: action.id.to_string(),
                dependency: dep.to_string(),
            })?;
            let dep_exec = units[dep_idx].id;
            let exec = units[idx].id;
            if !units[idx].dependencies.contains(&dep_exec) {
                units[idx].dependencies.push(dep_exec);
                units[dep_idx].dependents.push(exec);
            }
        }
    }

    let order = topological_order(&units)?;
    let parallel_groups = partition_groups(&units, &order, max_parallel)?;

    for unit in units.iter_mut() {
        if !unit.dependencies.is_empty() {
            // Pending -> WaitingDependencies is always legal for a fresh unit.
            let _ = unit.transition(ExecutionStatus::WaitingDependencies);
        }
    }

    let critical_path = units
        .iter()
        .filter(|u| !u.dependencies.is_empty())
        .map(|u| u.id)
        .collect();

    let estimated_time = estimate_time(&parallel_groups);
    let mut plan = ExecutionPlan {
        id: plan_id,
        actions: units,
        parallel_groups,
        critical_path,
        estimated_time,
        complexity: PlanComplexity::Simple,
    };
    plan.complexity = classify_complexity(plan.actions.len(), plan.dependency_edges());

    debug!(
        "Built plan {} with {} units in {} groups ({:?}, est {:?})",
        plan.id,
        plan.actions.len(),
        plan.parallel_groups.len(),
        plan.complexity,
        plan.estimated_time
    );
    Ok(plan)
}

/// DFS topological sort: every dependency is emitted before its dependent.
/// Back edges are reported as cycles.
pub fn topological_order(units: &[ActionExecution]) -> Result<Vec<ExecutionId>, PlanningError> {
    let index: HashMap<ExecutionId, usize> = units.iter().enumerate().map(|(i, u)| (u.id, i)).collect();
    let mut marks: HashMap<ExecutionId, Mark> = HashMap::with_capacity(units.len());
    let mut order = Vec::with_capacity(units.len());

    fn visit(
        id: ExecutionId,
        units: &[ActionExecution],
        index: &HashMap<ExecutionId, usize>,
        marks: &mut HashMap<ExecutionId, Mark>,
        order: &mut Vec<ExecutionId>,
    ) -> Result<(), PlanningError> {
        match marks.get(&id) {
            Some(Mark::Done) => return Ok(()),
            Some(Mark::Visiting) => {
                let action = index.get(&id).map(|&i| units[i].action_id.to_string()).unwrap_or_default();
                return Err(PlanningError::DependencyCycle(action));
            }
            None => {}
        }
        marks.insert(id, Mark::Visiting);
        if let Some(&i) = index.get(&id) {
            for dep in &units[i].dependencies {
                visit(*dep, units, index, marks, order)?;
            }
        }
        marks.insert(id, Mark::Done);
        order.push(id);
        Ok(())
    }

    for unit in units {
        visit(unit.id, units, &index, &mut marks, &mut order)?;
    }
    Ok(order)
}

/// Greedy grouping over the topological order. A unit joins the current
/// group once all of its dependencies sit in earlier groups.
pub fn partition_groups(
    units: &[ActionExecution],
    order: &[ExecutionId],
    max_parallel: usize,
) -> Result<Vec<Vec<ExecutionId>>, PlanningError> {
    let deps: HashMap<ExecutionId, &[ExecutionId]> =
        units.iter().map(|u| (u.id, u.dependencies.as_slice())).collect();
    let mut placed: HashSet<ExecutionId> = HashSet::with_capacity(order.len());
    let mut groups: Vec<Vec<ExecutionId>> = Vec::new();

    while placed.len() < order.len() {
        let mut group = Vec::new();
        for id in order {
            if group.len() >= max_parallel {
                break;
            }
            if placed.contains(id) {
                continue;
            }
            let ready = deps
                .get(id)
                .map(|ds| ds.iter().all(|d| placed.contains(d)))
                .unwrap_or(true);
            if ready {
                group.push(*id);
            }
        }
        if group.is_empty() {
            return Err(PlanningError::Unschedulable {
                remaining: order.len() - placed.len(),
            });
        }
        placed.extend(group.iter().copied());
        groups.push(group);
    }

    Ok(groups)
}

pub fn classify_complexity(units: usize, edges: usize) -> PlanComplexity {
    if units <= 3 && edges <= 2 {
        PlanComplexity::Simple
    } else if units <= 8 && edges <= 6 {
        PlanComplexity::Moderate
    } else {
        PlanComplexity::Complex
    }
}

/// Sum over groups of the slowest member, discounted for parallelism.
/// Every unit currently costs `BASE_UNIT_COST_MS`, so each group costs one unit.
pub fn estimate_time(groups: &[Vec<ExecutionId>]) -> Duration {
    let total: f64 = groups
        .iter()
        .filter(|g| !g.is_empty())
        .map(|_| BASE_UNIT_COST_MS as f64 * PARALLEL_EFFICIENCY)
        .sum();
    Duration::from_millis(total.round() as u64)
}
