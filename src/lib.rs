pub mod executor;
pub mod intent;
pub mod kernel;
pub mod planner;
pub mod report;
pub mod services;

pub use executor::{CommandExecutor, ExecutionContext, ExecutionResult};
pub use intent::ActionDetector;
pub use kernel::config::ExecutionCapabilities;
pub use kernel::progress::{ExecutionProgress, RunStatus};
pub use kernel::scheduler::Orchestrator;
pub use report::ExecutionReport;
pub use services::board::{GraphDocument, InMemoryBoard};
