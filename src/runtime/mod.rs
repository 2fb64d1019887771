//! Runtime
//!
//! Injectable clock, event bus, periodic scheduler and the wiring that puts
//! every component on its own job.

pub mod clock;
pub mod events;
pub mod jobs;
pub mod scheduler;
pub mod sentinel;

pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use events::{EventBus, EventPublisher, SharedPublisher, Subscription, SystemEvent};
pub use jobs::SentinelJob;
pub use scheduler::{Job, JobStatus, RunOutcome, ScheduledJob, Scheduler};
pub use sentinel::{CycleSummary, Sentinel};
