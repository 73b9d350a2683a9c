//! Tracker façade
//!
//! Entry point for front-ends. Starts an operation (or upload), and when the
//! backend hands back a job handle, polls it to a terminal status through the
//! shared [`Poller`]. Every tracker owns one entity status store, one session
//! registry and one stop guard.

use cierre_core::domain::entity::EntityStatus;
use cierre_core::domain::job::{JobHandle, JobKind};
use cierre_core::dto::task::StartOperation;
use serde_json::Value as JsonValue;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::PollerConfig;
use crate::error::{InitiationError, TrackerError};
use crate::repository::TaskRepository;
use crate::scheduler::{Poller, SessionHandle, SessionRegistry, StopGuard};
use crate::service::reconciler::success_message;
use crate::service::{
    CompletionCallback, EntityKey, EntityStatusStore, Initiation, JobInitiator, Notification,
    NotificationLevel, Notifier, StateReconciler,
};

/// What became of a successfully initiated operation
#[derive(Debug)]
pub enum TrackedRun {
    /// Backend answered synchronously; nothing to poll
    Completed(JsonValue),
    /// Backend started a job that is now being polled
    Polling(SessionHandle),
    /// Backend started a job but no session was created for it, because the
    /// stop guard is stopped or the handle is already being polled
    Detached(JobHandle),
}

/// Starts and tracks backend jobs
pub struct Tracker {
    repository: Arc<dyn TaskRepository>,
    store: EntityStatusStore,
    notifier: Arc<dyn Notifier>,
    initiator: JobInitiator,
    poller: Poller,
}

impl Tracker {
    /// Creates a tracker with its own stop guard
    pub fn new(
        repository: Arc<dyn TaskRepository>,
        notifier: Arc<dyn Notifier>,
        config: PollerConfig,
    ) -> Self {
        Self::with_guard(repository, notifier, config, StopGuard::new())
    }

    /// Creates a tracker whose sessions observe an existing stop guard
    pub fn with_guard(
        repository: Arc<dyn TaskRepository>,
        notifier: Arc<dyn Notifier>,
        config: PollerConfig,
        guard: StopGuard,
    ) -> Self {
        let store = EntityStatusStore::new();
        Self {
            initiator: JobInitiator::new(Arc::clone(&repository), store.clone()),
            poller: Poller::new(Arc::clone(&repository), config, guard),
            repository,
            store,
            notifier,
        }
    }

    pub fn guard(&self) -> &StopGuard {
        self.poller.guard()
    }

    pub fn store(&self) -> &EntityStatusStore {
        &self.store
    }

    pub fn registry(&self) -> &SessionRegistry {
        self.poller.registry()
    }

    /// Starts an operation and polls its job, if any
    ///
    /// `optimistic` is shown as the entity status while the job runs and
    /// reverted if initiation fails.
    pub async fn start_operation(
        &self,
        req: &StartOperation,
        optimistic: Option<EntityStatus>,
    ) -> Result<TrackedRun, InitiationError> {
        let initiation = self.initiator.start(req, optimistic).await;
        self.track(initiation, req.kind, &EntityKey::new(req.resource.clone(), req.entity_id))
            .await
    }

    /// Uploads a file and polls its processing job
    pub async fn upload_file(
        &self,
        resource: &str,
        entity_id: i64,
        path: &Path,
    ) -> Result<TrackedRun, InitiationError> {
        let initiation = self.initiator.upload(resource, entity_id, path).await;
        self.track(
            initiation,
            JobKind::FileProcessing,
            &EntityKey::new(resource, entity_id),
        )
        .await
    }

    /// Attaches to a job started elsewhere
    ///
    /// Returns `None` if the guard is stopped or the job is already polled.
    pub fn watch(&self, handle: JobHandle) -> Option<SessionHandle> {
        self.poller.spawn(self.reconciler(handle))
    }

    /// Attaches to a job, running `callback` once when it succeeds
    pub fn watch_with(&self, handle: JobHandle, callback: CompletionCallback) -> Option<SessionHandle> {
        self.poller
            .spawn(self.reconciler(handle).on_complete(callback))
    }

    /// Reads the authoritative status of an entity into the store
    ///
    /// The write is stamped before the request goes out, so a poll answer
    /// requested later wins over it.
    pub async fn refresh(&self, resource: &str, entity_id: i64) -> Result<EntityStatus, TrackerError> {
        let key = EntityKey::new(resource, entity_id);
        let seq = self.store.stamp();

        let entity = self
            .repository
            .fetch_entity(resource, entity_id)
            .await
            .map_err(|source| TrackerError::Refresh {
                resource: resource.to_string(),
                entity_id,
                source,
            })?;

        if !self.store.apply(&key, entity.estado.clone(), seq) {
            info!("Refresh of {} superseded by a newer status", key);
        }
        Ok(self.store.get(&key).unwrap_or(entity.estado))
    }

    fn reconciler(&self, handle: JobHandle) -> StateReconciler {
        StateReconciler::new(
            handle,
            self.store.clone(),
            Arc::clone(&self.repository),
            Arc::clone(&self.notifier),
        )
    }

    async fn track(
        &self,
        initiation: Result<Initiation, InitiationError>,
        kind: JobKind,
        key: &EntityKey,
    ) -> Result<TrackedRun, InitiationError> {
        let initiation = match initiation {
            Ok(initiation) => initiation,
            Err(e) => {
                self.notifier.notify(Notification::new(
                    NotificationLevel::Error,
                    kind,
                    e.user_message(),
                ));
                return Err(e);
            }
        };

        match initiation {
            Initiation::Completed(body) => {
                if body.get("estado").is_none() {
                    if let Err(e) = self.refresh(&key.resource, key.id).await {
                        warn!("{}", e);
                    }
                }
                self.notifier.notify(Notification::new(
                    NotificationLevel::Success,
                    kind,
                    success_message(Some(&body), kind),
                ));
                Ok(TrackedRun::Completed(body))
            }
            Initiation::Started(handle) => match self.watch(handle.clone()) {
                Some(session) => Ok(TrackedRun::Polling(session)),
                None => {
                    info!("Not polling {}", handle);
                    Ok(TrackedRun::Detached(handle))
                }
            },
        }
    }
}
