use parking_lot::Mutex;
use rand::Rng;

use crate::services::board::{NodeId, Position};

pub const GRID_ORIGIN: Position = Position { x: 100.0, y: 100.0 };
pub const STEP_X: f32 = 260.0;
pub const STEP_Y: f32 = 180.0;
pub const COLUMNS: usize = 6;
pub const ROWS: usize = 20;
/// No new node may land closer than this to an existing one.
pub const MIN_DISTANCE: f32 = 200.0;

const RANDOM_ATTEMPTS: usize = 64;

fn is_free(candidate: &Position, occupied: &[Position]) -> bool {
    occupied.iter().all(|p| p.distance(candidate) >= MIN_DISTANCE)
}

/// Deterministic row-major grid scan. `None` once the grid is exhausted.
pub fn grid_position(occupied: &[Position]) -> Option<Position> {
    (0..ROWS)
        .flat_map(|row| (0..COLUMNS).map(move |col| (row, col)))
        .map(|(row, col)| Position::new(GRID_ORIGIN.x + col as f32 * STEP_X, GRID_ORIGIN.y + row as f32 * STEP_Y))
        .find(|candidate| is_free(candidate, occupied))
}

/// Random placement below the grid. Best effort: after a bounded number of
/// attempts the last candidate is returned even if it overlaps.
pub fn random_position(occupied: &[Position]) -> Position {
    let mut rng = rand::thread_rng();
    let min_y = GRID_ORIGIN.y + ROWS as f32 * STEP_Y;
    let max_x = GRID_ORIGIN.x + (COLUMNS * 2) as f32 * STEP_X;
    let mut candidate = Position::new(GRID_ORIGIN.x, min_y);
    for _ in 0..RANDOM_ATTEMPTS {
        candidate = Position::new(rng.gen_range(GRID_ORIGIN.x..max_x), rng.gen_range(min_y..min_y + 2_000.0));
        if is_free(&candidate, occupied) {
            break;
        }
    }
    candidate
}

/// Non-overlapping placement: grid first, random fallback.
pub fn find_position(occupied: &[Position]) -> Position {
    grid_position(occupied).unwrap_or_else(|| random_position(occupied))
}

/// A position claimed before its node exists.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reservation {
    ticket: u64,
    pub position: Position,
}

#[derive(Debug)]
struct Claim {
    ticket: u64,
    node: Option<NodeId>,
    position: Position,
}

#[derive(Debug, Default)]
struct LedgerInner {
    claims: Vec<Claim>,
    next_ticket: u64,
}

/// Positions handed out to nodes created through one executor.
///
/// Units of a parallel group read the board independently, so their
/// snapshots never contain each other's nodes. Picking a cell and claiming
/// it happen under one lock; the claim stays until its node is removed.
#[derive(Debug, Default)]
pub struct PlacementLedger {
    inner: Mutex<LedgerInner>,
}

impl PlacementLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pick a free position against `board` plus every live claim, and claim it.
    pub fn reserve(&self, board: &[Position]) -> Reservation {
        let mut inner = self.inner.lock();
        let mut occupied = board.to_vec();
        occupied.extend(inner.claims.iter().map(|c| c.position));
        let position = find_position(&occupied);
        let ticket = inner.next_ticket;
        inner.next_ticket += 1;
        inner.claims.push(Claim {
            ticket,
            node: None,
            position,
        });
        Reservation { ticket, position }
    }

    /// The node now exists; keep the claim until the node is removed.
    pub fn confirm(&self, reservation: Reservation, node: NodeId) {
        let mut inner = self.inner.lock();
        if let Some(claim) = inner.claims.iter_mut().find(|c| c.ticket == reservation.ticket) {
            claim.node = Some(node);
        }
    }

    /// The node was never created.
    pub fn release(&self, reservation: Reservation) {
        self.inner.lock().claims.retain(|c| c.ticket != reservation.ticket);
    }

    pub fn release_node(&self, node: NodeId) {
        self.inner.lock().claims.retain(|c| c.node != Some(node));
    }

    pub fn claimed(&self) -> usize {
        self.inner.lock().claims.len()
    }
}
