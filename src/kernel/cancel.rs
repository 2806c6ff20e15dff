use parking_lot::Mutex;
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::planner::types::PlanId;

/// One cancellation token per live plan.
///
/// Tokens are handed to every unit of the plan; the registry only decides
/// which plan a cancel request reaches.
#[derive(Debug, Default)]
pub struct CancellationRegistry {
    tokens: Mutex<HashMap<PlanId, CancellationToken>>,
}

impl CancellationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, plan_id: PlanId) -> CancellationToken {
        let token = CancellationToken::new();
        self.tokens.lock().insert(plan_id, token.clone());
        token
    }

    /// Fire and drop the token. Returns false for unknown or finished plans.
    pub fn cancel(&self, plan_id: PlanId) -> bool {
        match self.tokens.lock().remove(&plan_id) {
            Some(token) => {
                token.cancel();
                debug!("Cancellation requested for plan {}", plan_id);
                true
            }
            None => false,
        }
    }

    pub fn release(&self, plan_id: PlanId) {
        self.tokens.lock().remove(&plan_id);
    }

    pub fn is_live(&self, plan_id: PlanId) -> bool {
        self.tokens.lock().contains_key(&plan_id)
    }

    pub fn live_count(&self) -> usize {
        self.tokens.lock().len()
    }
}
