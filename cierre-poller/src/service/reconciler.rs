//! State reconciler
//!
//! Translates job status snapshots into entity status writes, progress updates
//! and notifications, exactly once per meaningful transition. One reconciler
//! belongs to one polling session.

use cierre_core::domain::entity::EntityStatus;
use cierre_core::domain::job::{JobHandle, JobKind, JobStatus, JobStatusSnapshot};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use std::time::Duration;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::repository::TaskRepository;
use crate::service::notifier::{Notification, NotificationLevel, Notifier};
use crate::service::store::{EntityKey, EntityStatusStore, Sequence};

/// Callback run once when a job succeeds
pub type CompletionCallback = Box<dyn FnOnce(&JobStatusSnapshot) + Send + Sync>;

/// Message shown when the backend reports FAILURE without a reason
const DEFAULT_FAILURE_MESSAGE: &str = "The backend reported the job as failed";

/// Bound of an entity refetch when no session timeout is set
const DEFAULT_REFETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// User-facing message for a successful job result
///
/// Prefers a `mensaje` (or `message`) string carried in the result.
pub(crate) fn success_message(result: Option<&JsonValue>, kind: JobKind) -> String {
    result
        .and_then(|r| r.get("mensaje").or_else(|| r.get("message")))
        .and_then(|m| m.as_str())
        .map(str::to_string)
        .unwrap_or_else(|| format!("{} completed successfully", kind))
}

/// Effect of reconciling one snapshot
#[derive(Debug, Clone, PartialEq)]
pub enum Reconciled {
    /// Job still running; keep polling
    Continue,
    /// Job reached a terminal status
    Terminal(TerminalState),
    /// Snapshot arrived after the session was already terminal
    Ignored,
    /// Session was stopped while the snapshot was being reconciled; nothing
    /// was notified and the completion callback did not run
    Cancelled,
}

/// Terminal status of a job as seen by the reconciler
#[derive(Debug, Clone, PartialEq)]
pub enum TerminalState {
    Succeeded(JobStatusSnapshot),
    Failed { message: String },
}

/// Reconciles the snapshots of one job into local state
pub struct StateReconciler {
    handle: JobHandle,
    key: EntityKey,
    store: EntityStatusStore,
    repository: Arc<dyn TaskRepository>,
    notifier: Arc<dyn Notifier>,
    last_phase: Option<JobStatus>,
    terminal: bool,
    on_complete: Option<CompletionCallback>,
    token: CancellationToken,
    refetch_timeout: Duration,
}

impl StateReconciler {
    pub fn new(
        handle: JobHandle,
        store: EntityStatusStore,
        repository: Arc<dyn TaskRepository>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            key: EntityKey::of(&handle),
            handle,
            store,
            repository,
            notifier,
            last_phase: None,
            terminal: false,
            on_complete: None,
            token: CancellationToken::new(),
            refetch_timeout: DEFAULT_REFETCH_TIMEOUT,
        }
    }

    /// Binds the reconciler to a polling session
    ///
    /// Entity refetches are raced against `token` and bounded by
    /// `request_timeout`.
    pub(crate) fn bind(mut self, token: CancellationToken, request_timeout: Duration) -> Self {
        self.token = token;
        self.refetch_timeout = request_timeout;
        self
    }

    /// Registers a callback run once on SUCCESS
    pub fn on_complete(mut self, callback: CompletionCallback) -> Self {
        self.on_complete = Some(callback);
        self
    }

    pub fn handle(&self) -> &JobHandle {
        &self.handle
    }

    pub fn is_terminal(&self) -> bool {
        self.terminal
    }

    /// Stamp for a status request about to be issued
    pub(crate) fn stamp(&self) -> Sequence {
        self.store.stamp()
    }

    /// Reconciles one snapshot
    ///
    /// `seq` is the store stamp taken when the poll request was issued.
    pub async fn on_snapshot(&mut self, snapshot: &JobStatusSnapshot, seq: Sequence) -> Reconciled {
        if self.terminal {
            debug!(
                "Ignoring {} snapshot for terminal task {}",
                snapshot.status, self.handle.task_id
            );
            return Reconciled::Ignored;
        }

        match snapshot.status {
            JobStatus::Pending | JobStatus::Progress => {
                self.on_running(snapshot);
                Reconciled::Continue
            }
            JobStatus::Success => {
                self.terminal = true;
                if !self.on_success(snapshot, seq).await {
                    return Reconciled::Cancelled;
                }
                Reconciled::Terminal(TerminalState::Succeeded(snapshot.clone()))
            }
            JobStatus::Failure => {
                self.terminal = true;
                let message = snapshot
                    .error
                    .clone()
                    .filter(|m| !m.trim().is_empty())
                    .unwrap_or_else(|| DEFAULT_FAILURE_MESSAGE.to_string());
                if !self.on_failure(&message).await {
                    return Reconciled::Cancelled;
                }
                Reconciled::Terminal(TerminalState::Failed { message })
            }
        }
    }

    fn on_running(&mut self, snapshot: &JobStatusSnapshot) {
        if let Some(progress) = &snapshot.progress {
            self.notifier.progress(&self.handle, progress);
        }

        if self.last_phase == Some(snapshot.status) {
            return;
        }

        if snapshot.status == JobStatus::Progress {
            self.notifier.notify(Notification::for_job(
                NotificationLevel::Info,
                &self.handle,
                format!("Processing {} started", self.handle.kind),
            ));
        }
        self.last_phase = Some(snapshot.status);
    }

    /// Returns `false` if the session was stopped before the effects ran
    async fn on_success(&mut self, snapshot: &JobStatusSnapshot, seq: Sequence) -> bool {
        match snapshot.embedded_estado() {
            Some(estado) => {
                self.store.apply(&self.key, EntityStatus::from(estado), seq);
            }
            None => {
                if !self.refetch_entity().await {
                    return false;
                }
            }
        }

        let message = success_message(snapshot.result.as_ref(), self.handle.kind);

        info!("Task {} succeeded", self.handle.task_id);
        self.notifier.notify(Notification::for_job(
            NotificationLevel::Success,
            &self.handle,
            message,
        ));

        if let Some(callback) = self.on_complete.take() {
            callback(snapshot);
        }
        true
    }

    /// Returns `false` if the session was stopped before the effects ran
    async fn on_failure(&mut self, message: &str) -> bool {
        match self.store.rollback(&self.key) {
            Some(restored) => info!(
                "Task {} failed; {} rolled back to {}",
                self.handle.task_id, self.key, restored
            ),
            None => {
                // Nothing known-good locally, so ask the backend.
                if !self.refetch_entity().await {
                    return false;
                }
            }
        }

        self.notifier.notify(Notification::for_job(
            NotificationLevel::Error,
            &self.handle,
            message,
        ));
        true
    }

    /// Reads the entity's authoritative status into the store
    ///
    /// Returns `false` if the session was stopped first; the answer is then
    /// dropped. A failed or timed-out fetch leaves the store alone.
    async fn refetch_entity(&self) -> bool {
        let seq = self.store.stamp();
        let fetched = tokio::select! {
            biased;
            _ = self.token.cancelled() => return false,
            fetched = time::timeout(
                self.refetch_timeout,
                self.repository.fetch_entity(&self.key.resource, self.key.id),
            ) => fetched,
        };
        if self.token.is_cancelled() {
            return false;
        }

        match fetched {
            Ok(Ok(entity)) => {
                self.store.apply(&self.key, entity.estado, seq);
            }
            Ok(Err(e)) => warn!("Failed to refresh {} after task {}: {}", self.key, self.handle.task_id, e),
            Err(_) => warn!(
                "Refresh of {} after task {} got no response within {:?}",
                self.key, self.handle.task_id, self.refetch_timeout
            ),
        }
        true
    }

    /// Session gave up after consecutive transport failures
    ///
    /// The job's real state is unknown, so the entity status is left alone.
    pub fn on_aborted(&mut self, consecutive_errors: u32, last_error: &str) {
        if std::mem::replace(&mut self.terminal, true) {
            return;
        }
        warn!(
            "Task {} aborted after {} consecutive errors: {}",
            self.handle.task_id, consecutive_errors, last_error
        );
        self.notifier.notify(Notification::for_job(
            NotificationLevel::Error,
            &self.handle,
            format!(
                "Lost communication with the server while tracking {}. Refresh to check its current state.",
                self.handle.kind
            ),
        ));
    }

    /// Session hit the overall polling deadline
    pub fn on_expired(&mut self, elapsed: Duration) {
        if std::mem::replace(&mut self.terminal, true) {
            return;
        }
        warn!(
            "Task {} still running after {:?}; polling stopped",
            self.handle.task_id, elapsed
        );
        self.notifier.notify(Notification::for_job(
            NotificationLevel::Warning,
            &self.handle,
            format!(
                "{} is taking longer than expected. Refresh later to check its current state.",
                self.handle.kind
            ),
        ));
    }

    /// Session was stopped by its owner or the shared guard
    pub fn on_stopped(&mut self) {
        if !std::mem::replace(&mut self.terminal, true) {
            debug!("Stopped tracking task {}", self.handle.task_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{RecordingNotifier, ScriptedRepository};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Fixture {
        store: EntityStatusStore,
        repository: Arc<ScriptedRepository>,
        notifier: Arc<RecordingNotifier>,
        key: EntityKey,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                store: EntityStatusStore::new(),
                repository: Arc::new(ScriptedRepository::new()),
                notifier: Arc::new(RecordingNotifier::default()),
                key: EntityKey::new("libros-remuneraciones", 5),
            }
        }

        fn reconciler(&self) -> StateReconciler {
            let handle = JobHandle::new("abc", JobKind::FileProcessing, "libros-remuneraciones", 5);
            StateReconciler::new(
                handle,
                self.store.clone(),
                self.repository.clone(),
                self.notifier.clone(),
            )
        }
    }

    #[tokio::test]
    async fn test_progress_notice_only_on_phase_change() {
        let fx = Fixture::new();
        let mut reconciler = fx.reconciler();

        for pct in [10, 40, 70] {
            let seq = fx.store.stamp();
            let outcome = reconciler
                .on_snapshot(&JobStatusSnapshot::progress(pct, "Procesando"), seq)
                .await;
            assert_eq!(outcome, Reconciled::Continue);
        }

        assert_eq!(fx.notifier.count(NotificationLevel::Info), 1);
        assert_eq!(fx.notifier.progress_updates(), 3);
    }

    #[tokio::test]
    async fn test_success_uses_embedded_estado() {
        let fx = Fixture::new();
        fx.store.set(&fx.key, EntityStatus::Procesando);
        let mut reconciler = fx.reconciler();

        let snapshot = JobStatusSnapshot::success(Some(json!({"estado": "clasificado"})));
        let seq = fx.store.stamp();
        let outcome = reconciler.on_snapshot(&snapshot, seq).await;

        assert!(matches!(outcome, Reconciled::Terminal(TerminalState::Succeeded(_))));
        assert_eq!(fx.store.get(&fx.key), Some(EntityStatus::Clasificado));
        assert_eq!(fx.repository.entity_calls(), 0);
    }

    #[tokio::test]
    async fn test_success_refetches_entity() {
        let fx = Fixture::new();
        fx.store.set(&fx.key, EntityStatus::Procesando);
        fx.repository.set_entity_status(EntityStatus::Procesado);
        let mut reconciler = fx.reconciler();

        let snapshot = JobStatusSnapshot::success(Some(json!({"registros_procesados": 120})));
        let seq = fx.store.stamp();
        reconciler.on_snapshot(&snapshot, seq).await;

        assert_eq!(fx.store.get(&fx.key), Some(EntityStatus::Procesado));
        assert_eq!(fx.repository.entity_calls(), 1);
        assert_eq!(fx.notifier.count(NotificationLevel::Success), 1);
    }

    #[tokio::test]
    async fn test_duplicate_success_fires_effects_once() {
        let fx = Fixture::new();
        fx.repository.set_entity_status(EntityStatus::Procesado);
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let mut reconciler = fx.reconciler().on_complete(Box::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        let snapshot = JobStatusSnapshot::success(None);
        let first = reconciler.on_snapshot(&snapshot, fx.store.stamp()).await;
        let second = reconciler.on_snapshot(&snapshot, fx.store.stamp()).await;

        assert!(matches!(first, Reconciled::Terminal(_)));
        assert_eq!(second, Reconciled::Ignored);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(fx.notifier.count(NotificationLevel::Success), 1);
    }

    #[tokio::test]
    async fn test_failure_rolls_back_and_reports_verbatim() {
        let fx = Fixture::new();
        fx.store.set(&fx.key, EntityStatus::NoSubido);
        fx.store.force_optimistic(&fx.key, EntityStatus::Procesando);
        let mut reconciler = fx.reconciler();

        let outcome = reconciler
            .on_snapshot(&JobStatusSnapshot::failure("Archivo corrupto"), fx.store.stamp())
            .await;

        assert_eq!(
            outcome,
            Reconciled::Terminal(TerminalState::Failed {
                message: "Archivo corrupto".to_string()
            })
        );
        assert_eq!(fx.store.get(&fx.key), Some(EntityStatus::NoSubido));
        assert_eq!(fx.notifier.messages(NotificationLevel::Error), vec!["Archivo corrupto"]);
    }

    #[tokio::test]
    async fn test_failure_without_known_good_asks_backend() {
        let fx = Fixture::new();
        fx.store.set(&fx.key, EntityStatus::Procesando);
        fx.repository.set_entity_status(EntityStatus::ConError);
        let mut reconciler = fx.reconciler();

        let mut snapshot = JobStatusSnapshot::failure("");
        snapshot.error = None;
        let outcome = reconciler.on_snapshot(&snapshot, fx.store.stamp()).await;

        assert_eq!(
            outcome,
            Reconciled::Terminal(TerminalState::Failed {
                message: DEFAULT_FAILURE_MESSAGE.to_string()
            })
        );
        assert_eq!(fx.store.get(&fx.key), Some(EntityStatus::ConError));
    }

    #[tokio::test]
    async fn test_stopped_session_skips_refetch_effects() {
        let fx = Fixture::new();
        fx.repository.set_entity_status(EntityStatus::Procesado);
        let token = CancellationToken::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let mut reconciler = fx
            .reconciler()
            .bind(token.clone(), Duration::from_secs(1))
            .on_complete(Box::new(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            }));
        token.cancel();

        let outcome = reconciler
            .on_snapshot(&JobStatusSnapshot::success(None), fx.store.stamp())
            .await;

        assert_eq!(outcome, Reconciled::Cancelled);
        assert_eq!(fx.store.get(&fx.key), None);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(fx.notifier.total(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refetch_is_bounded_by_request_timeout() {
        let fx = Fixture::new();
        fx.store.set(&fx.key, EntityStatus::Procesando);
        fx.repository.set_entity_delay(Duration::from_secs(3600));
        let mut reconciler = fx
            .reconciler()
            .bind(CancellationToken::new(), Duration::from_secs(2));

        let started = time::Instant::now();
        let outcome = reconciler
            .on_snapshot(&JobStatusSnapshot::failure("Archivo corrupto"), fx.store.stamp())
            .await;

        assert!(started.elapsed() < Duration::from_secs(3));
        assert!(matches!(outcome, Reconciled::Terminal(TerminalState::Failed { .. })));
        assert_eq!(fx.store.get(&fx.key), Some(EntityStatus::Procesando));
        assert_eq!(fx.notifier.count(NotificationLevel::Error), 1);
    }

    #[tokio::test]
    async fn test_progress_after_terminal_is_ignored() {
        let fx = Fixture::new();
        fx.store.set(&fx.key, EntityStatus::NoSubido);
        let mut reconciler = fx.reconciler();

        reconciler
            .on_snapshot(&JobStatusSnapshot::failure("boom"), fx.store.stamp())
            .await;
        let late = reconciler
            .on_snapshot(&JobStatusSnapshot::progress(90, "late"), fx.store.stamp())
            .await;

        assert_eq!(late, Reconciled::Ignored);
        assert_eq!(fx.notifier.progress_updates(), 0);
        assert_eq!(fx.store.get(&fx.key), Some(EntityStatus::NoSubido));
    }

    #[tokio::test]
    async fn test_abort_leaves_entity_untouched() {
        let fx = Fixture::new();
        fx.store.set(&fx.key, EntityStatus::VerificacionDatos);
        let mut reconciler = fx.reconciler();

        reconciler.on_aborted(3, "connection refused");
        reconciler.on_aborted(3, "connection refused");

        assert_eq!(fx.store.get(&fx.key), Some(EntityStatus::VerificacionDatos));
        assert_eq!(fx.notifier.count(NotificationLevel::Error), 1);
        assert!(reconciler.is_terminal());
    }
}
