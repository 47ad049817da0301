mod orchestrator;
mod policy;
mod scheduler;

pub use orchestrator::{CycleReport, CycleRun, RefreshOrchestrator};
pub use policy::{BackoffPolicy, DueCriteria, RefreshPolicy};
pub use scheduler::{next_delay, RefreshScheduler, SchedulerError};
