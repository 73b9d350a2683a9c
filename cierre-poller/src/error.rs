//! Error types for the task tracker

use cierre_client::ClientError;
use thiserror::Error;

/// The call that starts a backend job failed
///
/// No polling session exists when this is returned, and any optimistic status
/// written before the call has been reverted.
#[derive(Debug, Error)]
#[error("Failed to start {operation} on {resource}/{entity_id}: {source}")]
pub struct InitiationError {
    pub operation: String,
    pub resource: String,
    pub entity_id: i64,
    #[source]
    pub source: ClientError,
}

impl InitiationError {
    /// Message suitable for a user-facing notification
    pub fn user_message(&self) -> String {
        match &self.source {
            ClientError::ApiError { message, .. } if !message.is_empty() => message.clone(),
            other => other.to_string(),
        }
    }
}

/// Errors surfaced by the tracker façade
#[derive(Debug, Error)]
pub enum TrackerError {
    #[error(transparent)]
    Initiation(#[from] InitiationError),

    /// Manual refresh of an entity failed
    #[error("Failed to refresh {resource}/{entity_id}: {source}")]
    Refresh {
        resource: String,
        entity_id: i64,
        #[source]
        source: ClientError,
    },

    /// The task driving a polling session panicked
    #[error("Polling session for task {task_id} panicked: {message}")]
    SessionPanicked { task_id: String, message: String },
}
