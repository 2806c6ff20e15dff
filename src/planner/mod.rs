//! Execution planning: detected actions become a dependency-ordered DAG
//! partitioned into parallel groups.

pub mod dag;
pub mod types;

pub use dag::{build_plan, BASE_UNIT_COST_MS, PARALLEL_EFFICIENCY};
pub use types::*;
