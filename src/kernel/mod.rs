pub mod cancel;
pub mod config;
pub mod error;
pub mod progress;
pub mod scheduler;
pub mod telemetry;
