//! User-visible notifications
//!
//! Every outcome of a tracked job reaches the user through a [`Notifier`].
//! The library ships a tracing-backed implementation; front-ends provide
//! their own (the CLI prints coloured lines).

use chrono::{DateTime, Utc};
use cierre_core::domain::job::{JobHandle, JobKind, Progress};
use serde::Serialize;
use tracing::{error, info, warn};

/// Severity of a notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationLevel {
    Info,
    Success,
    Warning,
    Error,
}

/// A toast-style message about one job
#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub level: NotificationLevel,
    pub task_id: Option<String>,
    pub kind: JobKind,
    pub message: String,
    pub at: DateTime<Utc>,
}

impl Notification {
    pub fn new(level: NotificationLevel, kind: JobKind, message: impl Into<String>) -> Self {
        Self {
            level,
            task_id: None,
            kind,
            message: message.into(),
            at: Utc::now(),
        }
    }

    /// Notification about a job that already has a handle
    pub fn for_job(level: NotificationLevel, handle: &JobHandle, message: impl Into<String>) -> Self {
        Self {
            task_id: Some(handle.task_id.clone()),
            ..Self::new(level, handle.kind, message)
        }
    }
}

/// Sink for user-visible job notifications
pub trait Notifier: Send + Sync {
    /// Shows a notification
    fn notify(&self, notification: Notification);

    /// Updates the progress indicator of a job
    fn progress(&self, _handle: &JobHandle, _progress: &Progress) {}
}

/// Notifier that emits structured tracing events
#[derive(Debug, Clone, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, n: Notification) {
        let task_id = n.task_id.as_deref().unwrap_or("-");
        match n.level {
            NotificationLevel::Info | NotificationLevel::Success => {
                info!(task_id, kind = %n.kind, "{}", n.message)
            }
            NotificationLevel::Warning => warn!(task_id, kind = %n.kind, "{}", n.message),
            NotificationLevel::Error => error!(task_id, kind = %n.kind, "{}", n.message),
        }
    }

    fn progress(&self, handle: &JobHandle, progress: &Progress) {
        info!(
            task_id = %handle.task_id,
            percentage = progress.percentage,
            "{}",
            progress.description
        );
    }
}
