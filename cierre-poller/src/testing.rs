//! Scripted collaborators for unit tests

use async_trait::async_trait;
use cierre_client::{ClientError, Result};
use cierre_core::domain::entity::{Entity, EntityStatus};
use cierre_core::domain::job::{JobHandle, JobStatusSnapshot, Progress};
use cierre_core::dto::task::{StartOperation, StartResponse};
use std::collections::VecDeque;
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::repository::TaskRepository;
use crate::service::notifier::{Notification, NotificationLevel, Notifier};

/// One scripted answer of the status endpoint
pub enum Step {
    Snapshot(JobStatusSnapshot),
    TransportError,
    Hang,
    /// Answers after a delay, to test responses that outlive cancellation
    Delayed(std::time::Duration, JobStatusSnapshot),
}

/// Backend double answering status polls from a script
///
/// Once the script runs out every poll answers PENDING.
pub struct ScriptedRepository {
    steps: Mutex<VecDeque<Step>>,
    status_calls: AtomicUsize,
    entity_calls: AtomicUsize,
    start_calls: AtomicUsize,
    entity_status: Mutex<EntityStatus>,
    entity_fails: AtomicBool,
    entity_delay: Mutex<Option<std::time::Duration>>,
    start_response: Mutex<std::result::Result<StartResponse, u16>>,
}

impl ScriptedRepository {
    pub fn new() -> Self {
        Self {
            steps: Mutex::new(VecDeque::new()),
            status_calls: AtomicUsize::new(0),
            entity_calls: AtomicUsize::new(0),
            start_calls: AtomicUsize::new(0),
            entity_status: Mutex::new(EntityStatus::NoSubido),
            entity_fails: AtomicBool::new(false),
            entity_delay: Mutex::new(None),
            start_response: Mutex::new(Ok(StartResponse::Accepted {
                task_id: "abc".to_string(),
            })),
        }
    }

    pub fn with_steps(steps: impl IntoIterator<Item = Step>) -> Self {
        let repository = Self::new();
        repository.steps.lock().unwrap().extend(steps);
        repository
    }

    pub fn set_entity_status(&self, status: EntityStatus) {
        *self.entity_status.lock().unwrap() = status;
    }

    pub fn fail_entity_fetch(&self) {
        self.entity_fails.store(true, Ordering::SeqCst);
    }

    /// Makes every entity fetch answer only after `delay`
    pub fn set_entity_delay(&self, delay: std::time::Duration) {
        *self.entity_delay.lock().unwrap() = Some(delay);
    }

    pub fn set_start_response(&self, response: std::result::Result<StartResponse, u16>) {
        *self.start_response.lock().unwrap() = response;
    }

    pub fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }

    pub fn entity_calls(&self) -> usize {
        self.entity_calls.load(Ordering::SeqCst)
    }

    pub fn start_calls(&self) -> usize {
        self.start_calls.load(Ordering::SeqCst)
    }

    fn start(&self) -> Result<StartResponse> {
        self.start_calls.fetch_add(1, Ordering::SeqCst);
        match &*self.start_response.lock().unwrap() {
            Ok(response) => Ok(response.clone()),
            Err(status) => Err(ClientError::api_error(*status, "Cierre bloqueado")),
        }
    }
}

#[async_trait]
impl TaskRepository for ScriptedRepository {
    async fn start_operation(&self, _req: &StartOperation) -> Result<StartResponse> {
        self.start()
    }

    async fn upload_file(
        &self,
        _resource: &str,
        _entity_id: i64,
        _path: &Path,
    ) -> Result<StartResponse> {
        self.start()
    }

    async fn task_status(&self, _handle: &JobHandle) -> Result<JobStatusSnapshot> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        let step = self.steps.lock().unwrap().pop_front();
        match step {
            Some(Step::Snapshot(snapshot)) => Ok(snapshot),
            Some(Step::TransportError) => {
                Err(ClientError::api_error(503, "Service Unavailable"))
            }
            Some(Step::Hang) => std::future::pending::<Result<JobStatusSnapshot>>().await,
            Some(Step::Delayed(delay, snapshot)) => {
                tokio::time::sleep(delay).await;
                Ok(snapshot)
            }
            None => Ok(JobStatusSnapshot::pending()),
        }
    }

    async fn fetch_entity(&self, _resource: &str, entity_id: i64) -> Result<Entity> {
        self.entity_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.entity_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.entity_fails.load(Ordering::SeqCst) {
            return Err(ClientError::api_error(500, "Internal Server Error"));
        }
        Ok(Entity {
            id: entity_id,
            estado: self.entity_status.lock().unwrap().clone(),
            fields: Default::default(),
        })
    }
}

/// Notifier that keeps everything it is told
#[derive(Default)]
pub struct RecordingNotifier {
    notifications: Mutex<Vec<Notification>>,
    progress: AtomicUsize,
}

impl RecordingNotifier {
    pub fn count(&self, level: NotificationLevel) -> usize {
        self.notifications
            .lock()
            .unwrap()
            .iter()
            .filter(|n| n.level == level)
            .count()
    }

    pub fn messages(&self, level: NotificationLevel) -> Vec<String> {
        self.notifications
            .lock()
            .unwrap()
            .iter()
            .filter(|n| n.level == level)
            .map(|n| n.message.clone())
            .collect()
    }

    pub fn total(&self) -> usize {
        self.notifications.lock().unwrap().len()
    }

    pub fn progress_updates(&self) -> usize {
        self.progress.load(Ordering::SeqCst)
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notification: Notification) {
        self.notifications.lock().unwrap().push(notification);
    }

    fn progress(&self, _handle: &JobHandle, _progress: &Progress) {
        self.progress.fetch_add(1, Ordering::SeqCst);
    }
}
