//! Tasks repository
//!
//! Handles communication with the backend for job-related operations:
//! - Starting operations and uploading files
//! - Polling task status
//! - Fetching the owning entity for reconciliation

use async_trait::async_trait;
use cierre_client::{CierreClient, Result};
use cierre_core::domain::entity::Entity;
use cierre_core::domain::job::{JobHandle, JobStatusSnapshot};
use cierre_core::dto::task::{StartOperation, StartResponse};
use std::path::Path;

/// Repository trait for task-related operations with the backend
#[async_trait]
pub trait TaskRepository: Send + Sync {
    /// Starts an operation and returns the classified response
    async fn start_operation(&self, req: &StartOperation) -> Result<StartResponse>;

    /// Uploads a file to a resource and returns the classified response
    async fn upload_file(&self, resource: &str, entity_id: i64, path: &Path)
    -> Result<StartResponse>;

    /// Fetches one status snapshot for a job
    async fn task_status(&self, handle: &JobHandle) -> Result<JobStatusSnapshot>;

    /// Fetches the entity that owns a job, with its authoritative status
    async fn fetch_entity(&self, resource: &str, entity_id: i64) -> Result<Entity>;
}

/// HTTP implementation of TaskRepository
#[derive(Debug, Clone)]
pub struct HttpTaskRepository {
    client: CierreClient,
}

impl HttpTaskRepository {
    /// Creates a new HTTP task repository
    pub fn new(client: CierreClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl TaskRepository for HttpTaskRepository {
    async fn start_operation(&self, req: &StartOperation) -> Result<StartResponse> {
        self.client.start_operation(req).await
    }

    async fn upload_file(
        &self,
        resource: &str,
        entity_id: i64,
        path: &Path,
    ) -> Result<StartResponse> {
        self.client.upload_file(resource, entity_id, path).await
    }

    async fn task_status(&self, handle: &JobHandle) -> Result<JobStatusSnapshot> {
        self.client.task_status(handle).await
    }

    async fn fetch_entity(&self, resource: &str, entity_id: i64) -> Result<Entity> {
        self.client.get_entity(resource, entity_id).await
    }
}
