//! Monitoring pipeline.
//!
//! - `detect`: decide what is new against persisted state
//! - `compose`: render change events into webhook payloads
//! - `monitor`: tweet and stats checks, health and lifecycle messages
//! - `scheduler`: periodic triggers and the service loop

pub mod compose;
pub mod detect;
pub mod monitor;
pub mod scheduler;

pub use compose::NotificationComposer;
pub use detect::{ChangeDetector, StatsChange, TweetDetection};
pub use monitor::{ComponentHealth, CycleReport, HealthReport, HealthStatus, Monitor};
pub use scheduler::{
    Clock, ManualClock, Scheduler, SystemClock, TaskKind, TaskRunner, serve, shutdown_signal,
};
