//! Cierre Poller
//!
//! Tracks long-running backend jobs of the closing workflow until they finish.
//!
//! Architecture:
//! - Configuration: per-kind intervals, timeouts and thresholds
//! - Repositories: HTTP communication with the backend (start, upload, status, entity)
//! - Services: initiation, entity status mirroring, reconciliation, notifications
//! - Scheduler: one polling session per job handle, with a shared stop guard
//!
//! The [`Tracker`] façade ties the layers together: it starts an operation,
//! and when the backend answers with a task id it polls the status endpoint
//! until the job reaches a terminal status, mirroring the result into the
//! [`EntityStatusStore`](service::EntityStatusStore).

pub mod config;
pub mod error;
pub mod repository;
pub mod scheduler;
pub mod service;
pub mod tracker;

#[cfg(test)]
mod testing;

pub use config::PollerConfig;
pub use error::{InitiationError, TrackerError};
pub use repository::{HttpTaskRepository, TaskRepository};
pub use scheduler::{Poller, SessionHandle, SessionOutcome, StopGuard, StopReason};
pub use service::{EntityKey, EntityStatusStore, Notification, NotificationLevel, Notifier, TracingNotifier};
pub use tracker::{TrackedRun, Tracker};
