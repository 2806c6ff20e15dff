//! Orchestration telemetry.
//!
//! # SAFETY INVARIANT
//! Telemetry is a read-only side-effect layer. Scheduling decisions must never
//! consult it.
//!
//! # PRIVACY INVARIANT
//! Events carry ids, counts, durations and enums only. Request text, node
//! titles and model output never enter the buffer.

pub mod event;
pub mod metrics;
pub mod recorder;

pub use event::{RunOutcome, TelemetryEvent};
pub use metrics::{compute_snapshot, TelemetrySnapshot};
pub use recorder::TelemetryRecorder;
