//! Job initiator
//!
//! Issues the call that starts backend work and classifies the answer as a
//! synchronous result or a job handle to poll.

use cierre_client::ClientError;
use cierre_core::domain::entity::EntityStatus;
use cierre_core::domain::job::{JobHandle, JobKind};
use cierre_core::dto::task::{StartOperation, StartResponse};
use serde_json::Value as JsonValue;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::InitiationError;
use crate::repository::TaskRepository;
use crate::service::store::{EntityKey, EntityStatusStore, OptimisticWrite};

/// Outcome of a successful initiating call
#[derive(Debug, Clone, PartialEq)]
pub enum Initiation {
    /// Backend finished the work synchronously
    Completed(JsonValue),
    /// Backend started an asynchronous job
    Started(JobHandle),
}

/// Starts backend jobs, with optional optimistic status
pub struct JobInitiator {
    repository: Arc<dyn TaskRepository>,
    store: EntityStatusStore,
}

impl JobInitiator {
    pub fn new(repository: Arc<dyn TaskRepository>, store: EntityStatusStore) -> Self {
        Self { repository, store }
    }

    /// Starts an operation
    ///
    /// When `optimistic` is set, that status is written to the store before
    /// the call and reverted if the call fails.
    pub async fn start(
        &self,
        req: &StartOperation,
        optimistic: Option<EntityStatus>,
    ) -> Result<Initiation, InitiationError> {
        info!(
            "Starting {} on {}/{}",
            req.operation, req.resource, req.entity_id
        );
        let key = EntityKey::new(req.resource.clone(), req.entity_id);
        let result = self
            .guarded(&key, optimistic, self.repository.start_operation(req))
            .await;

        self.classify(&key, req.kind, &req.operation, result)
    }

    /// Uploads a file, optimistically marking the entity as `procesando`
    pub async fn upload(
        &self,
        resource: &str,
        entity_id: i64,
        path: &Path,
    ) -> Result<Initiation, InitiationError> {
        info!("Uploading {} to {}/{}", path.display(), resource, entity_id);
        let key = EntityKey::new(resource, entity_id);
        let result = self
            .guarded(
                &key,
                Some(EntityStatus::Procesando),
                self.repository.upload_file(resource, entity_id, path),
            )
            .await;

        self.classify(&key, JobKind::FileProcessing, "upload", result)
    }

    /// Runs the initiating call between an optimistic write and its revert
    async fn guarded<F>(
        &self,
        key: &EntityKey,
        optimistic: Option<EntityStatus>,
        call: F,
    ) -> Result<(StartResponse, Option<OptimisticWrite>), ClientError>
    where
        F: std::future::Future<Output = Result<StartResponse, ClientError>>,
    {
        let write = optimistic.map(|status| self.store.force_optimistic(key, status));

        match call.await {
            Ok(response) => Ok((response, write)),
            Err(e) => {
                if let Some(write) = write {
                    if self.store.revert(write) {
                        debug!("Reverted optimistic status of {}", key);
                    }
                }
                Err(e)
            }
        }
    }

    fn classify(
        &self,
        key: &EntityKey,
        kind: JobKind,
        operation: &str,
        result: Result<(StartResponse, Option<OptimisticWrite>), ClientError>,
    ) -> Result<Initiation, InitiationError> {
        let (response, write) = result.map_err(|source| {
            warn!("Failed to start {} on {}: {}", operation, key, source);
            InitiationError {
                operation: operation.to_string(),
                resource: key.resource.clone(),
                entity_id: key.id,
                source,
            }
        })?;

        match response {
            StartResponse::Accepted { task_id } => {
                info!("Backend accepted {} as task {}", operation, task_id);
                Ok(Initiation::Started(JobHandle::new(
                    task_id,
                    kind,
                    key.resource.clone(),
                    key.id,
                )))
            }
            StartResponse::Completed(body) => {
                // Nothing will confirm the optimistic status, so settle it now.
                match body.get("estado").and_then(|v| v.as_str()) {
                    Some(estado) => {
                        self.store.set(key, EntityStatus::from(estado));
                    }
                    None => {
                        if let Some(write) = write {
                            self.store.revert(write);
                        }
                    }
                }
                info!("{} on {} completed synchronously", operation, key);
                Ok(Initiation::Completed(body))
            }
        }
    }
}
