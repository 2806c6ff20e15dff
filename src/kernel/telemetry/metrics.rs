use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use super::event::{RunOutcome, TelemetryEvent};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySnapshot {
    pub run_stats: RunStats,
    pub unit_stats: UnitStats,
    pub group_stats: GroupStats,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunStats {
    pub plans_built: u64,
    pub plans_rejected: u64,
    pub completed: u64,
    pub failed: u64,
    pub cancelled: u64,
    pub skipped_actions: u64,
    pub avg_run_ms: f64,
    /// Mean of actual / estimated over finished runs with a plan.
    pub avg_time_vs_budget: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UnitStats {
    pub retries: u64,
    pub timeouts: u64,
    pub rollbacks: u64,
    pub effects_undone: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GroupStats {
    pub groups: u64,
    pub avg_group_ms: f64,
    pub max_group_ms: u64,
}

/// Pure function: event buffer -> aggregate counters.
pub fn compute_snapshot(events: &VecDeque<TelemetryEvent>) -> TelemetrySnapshot {
    let mut snap = TelemetrySnapshot::default();

    let mut finished_runs = 0u64;
    let mut total_run_ms = 0u64;
    let mut total_group_ms = 0u64;
    let mut budget_ratios = Vec::new();
    let mut estimates = std::collections::HashMap::new();

    for event in events {
        match event {
            TelemetryEvent::PlanBuilt { plan_id, estimated_ms, .. } => {
                snap.run_stats.plans_built += 1;
                estimates.insert(*plan_id, *estimated_ms);
            }
            TelemetryEvent::ActionsSkipped { count } => {
                snap.run_stats.skipped_actions += *count as u64;
            }
            TelemetryEvent::PlanRejected { .. } => snap.run_stats.plans_rejected += 1,
            TelemetryEvent::GroupCompleted { duration_ms, .. } => {
                snap.group_stats.groups += 1;
                total_group_ms += duration_ms;
                snap.group_stats.max_group_ms = snap.group_stats.max_group_ms.max(*duration_ms);
            }
            TelemetryEvent::UnitRetried { .. } => snap.unit_stats.retries += 1,
            TelemetryEvent::UnitTimedOut { .. } => snap.unit_stats.timeouts += 1,
            TelemetryEvent::UnitRolledBack { removed, .. } => {
                snap.unit_stats.rollbacks += 1;
                snap.unit_stats.effects_undone += *removed as u64;
            }
            TelemetryEvent::RunFinished {
                plan_id,
                outcome,
                duration_ms,
            } => {
                match outcome {
                    RunOutcome::Completed => snap.run_stats.completed += 1,
                    RunOutcome::Failed => snap.run_stats.failed += 1,
                    RunOutcome::Cancelled => snap.run_stats.cancelled += 1,
                }
                finished_runs += 1;
                total_run_ms += duration_ms;
                if let Some(estimated) = estimates.get(plan_id).filter(|e| **e > 0) {
                    budget_ratios.push(*duration_ms as f64 / *estimated as f64);
                }
            }
        }
    }

    if finished_runs > 0 {
        snap.run_stats.avg_run_ms = total_run_ms as f64 / finished_runs as f64;
    }
    if !budget_ratios.is_empty() {
        snap.run_stats.avg_time_vs_budget = budget_ratios.iter().sum::<f64>() / budget_ratios.len() as f64;
    }
    if snap.group_stats.groups > 0 {
        snap.group_stats.avg_group_ms = total_group_ms as f64 / snap.group_stats.groups as f64;
    }

    snap
}
