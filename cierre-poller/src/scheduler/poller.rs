//! Task poller
//!
//! Runs one recurring timer per job handle, querying the status endpoint at a
//! fixed interval until the reconciler reports a terminal status, the session
//! is stopped, too many consecutive requests fail, or the polling deadline
//! passes.
//!
//! Ticks are serialized: the next tick is not awaited until the current
//! request has resolved, so one session never has two requests in flight.

use cierre_core::domain::job::{JobHandle, JobStatusSnapshot};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::PollerConfig;
use crate::error::TrackerError;
use crate::repository::TaskRepository;
use crate::scheduler::guard::StopGuard;
use crate::scheduler::registry::{Registration, SessionRegistry};
use crate::service::reconciler::{Reconciled, StateReconciler, TerminalState};

/// Why a session was stopped from the outside
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The shared stop guard was triggered
    Guard,
    /// The owner stopped or dropped the session
    Teardown,
}

/// How a polling session ended
#[derive(Debug, Clone, PartialEq)]
pub enum SessionOutcome {
    /// Backend reported SUCCESS
    Succeeded(JobStatusSnapshot),
    /// Backend reported FAILURE
    Failed { message: String },
    /// Too many consecutive transport failures; the job's state is unknown
    Aborted {
        consecutive_errors: u32,
        last_error: String,
    },
    /// Polling deadline passed without a terminal status
    Expired { elapsed: Duration },
    /// Stopped before the job was terminal
    Stopped(StopReason),
}

impl SessionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, SessionOutcome::Succeeded(_))
    }
}

impl From<TerminalState> for SessionOutcome {
    fn from(state: TerminalState) -> Self {
        match state {
            TerminalState::Succeeded(snapshot) => SessionOutcome::Succeeded(snapshot),
            TerminalState::Failed { message } => SessionOutcome::Failed { message },
        }
    }
}

/// Starts polling sessions
pub struct Poller {
    repository: Arc<dyn TaskRepository>,
    config: PollerConfig,
    guard: StopGuard,
    registry: SessionRegistry,
}

impl Poller {
    /// Creates a new poller
    pub fn new(repository: Arc<dyn TaskRepository>, config: PollerConfig, guard: StopGuard) -> Self {
        Self {
            repository,
            config,
            guard,
            registry: SessionRegistry::new(),
        }
    }

    pub fn guard(&self) -> &StopGuard {
        &self.guard
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Starts polling the reconciler's job
    ///
    /// Returns `None` without polling if the stop guard is already stopped or
    /// a session for the same handle is live.
    pub fn spawn(&self, reconciler: StateReconciler) -> Option<SessionHandle> {
        let handle = reconciler.handle().clone();

        if self.guard.is_stopped() {
            info!("Polling is stopped; not tracking {}", handle);
            return None;
        }

        let token = self.guard.session_token();
        let Some(registration) = self.registry.try_register(&handle, token.clone()) else {
            debug!("{} is already being polled", handle);
            return None;
        };

        let interval = self.config.interval_for(handle.kind);
        let request_timeout = self.config.request_timeout_for(handle.kind);
        let reconciler = reconciler.bind(token.clone(), request_timeout);
        info!(
            "Polling {} every {:?} (request timeout {:?})",
            handle, interval, request_timeout
        );

        let session = PollingSession {
            handle: handle.clone(),
            repository: Arc::clone(&self.repository),
            reconciler,
            guard: self.guard.clone(),
            token: token.clone(),
            interval,
            request_timeout,
            max_consecutive_errors: self.config.max_consecutive_errors,
            max_poll_duration: self.config.max_poll_duration,
            attempt_count: 0,
            consecutive_error_count: 0,
            _registration: registration,
        };

        Some(SessionHandle {
            handle,
            token,
            join: Some(tokio::spawn(session.run())),
        })
    }
}

/// Owner's handle on a running session
///
/// Dropping it stops the session: a timer never outlives its owner.
#[derive(Debug)]
pub struct SessionHandle {
    handle: JobHandle,
    token: CancellationToken,
    join: Option<JoinHandle<SessionOutcome>>,
}

impl SessionHandle {
    pub fn job(&self) -> &JobHandle {
        &self.handle
    }

    /// Stops the session; a response already in flight is discarded
    pub fn stop(&self) {
        self.token.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.join.as_ref().is_none_or(|j| j.is_finished())
    }

    /// Waits for the session to end
    pub async fn wait(mut self) -> Result<SessionOutcome, TrackerError> {
        let Some(join) = self.join.take() else {
            return Ok(SessionOutcome::Stopped(StopReason::Teardown));
        };
        join.await.map_err(|e| TrackerError::SessionPanicked {
            task_id: self.handle.task_id.clone(),
            message: e.to_string(),
        })
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// Runtime state of one session, moved into its task
struct PollingSession {
    handle: JobHandle,
    repository: Arc<dyn TaskRepository>,
    reconciler: StateReconciler,
    guard: StopGuard,
    token: CancellationToken,
    interval: Duration,
    request_timeout: Duration,
    max_consecutive_errors: u32,
    max_poll_duration: Duration,
    attempt_count: u32,
    consecutive_error_count: u32,
    _registration: Registration,
}

impl PollingSession {
    async fn run(mut self) -> SessionOutcome {
        let started = Instant::now();
        let mut ticker = time::interval_at(started + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let cancelled = tokio::select! {
                biased;
                _ = self.token.cancelled() => true,
                _ = ticker.tick() => false,
            };
            if cancelled || self.guard.is_stopped() {
                return self.stopped();
            }

            let elapsed = started.elapsed();
            if elapsed >= self.max_poll_duration {
                self.reconciler.on_expired(elapsed);
                return SessionOutcome::Expired { elapsed };
            }

            self.attempt_count += 1;
            let seq = self.reconciler.stamp();
            debug!("Polling {} (attempt {})", self.handle, self.attempt_count);

            let polled = tokio::select! {
                biased;
                _ = self.token.cancelled() => None,
                polled = time::timeout(
                    self.request_timeout,
                    self.repository.task_status(&self.handle),
                ) => Some(polled),
            };
            // A response that resolves after a stop must not touch state
            let Some(polled) = polled else {
                return self.stopped();
            };
            if self.token.is_cancelled() {
                return self.stopped();
            }

            let error = match polled {
                Ok(Ok(snapshot)) => {
                    self.consecutive_error_count = 0;
                    match self.reconciler.on_snapshot(&snapshot, seq).await {
                        Reconciled::Terminal(state) => {
                            info!(
                                "{} finished after {} poll(s): {}",
                                self.handle, self.attempt_count, snapshot.status
                            );
                            return state.into();
                        }
                        Reconciled::Cancelled => return self.stopped(),
                        Reconciled::Continue | Reconciled::Ignored => continue,
                    }
                }
                Ok(Err(e)) => e.to_string(),
                Err(_) => format!("no response within {:?}", self.request_timeout),
            };

            self.consecutive_error_count += 1;
            warn!(
                "Polling {} failed ({}/{}): {}",
                self.handle, self.consecutive_error_count, self.max_consecutive_errors, error
            );

            if self.consecutive_error_count >= self.max_consecutive_errors {
                self.reconciler
                    .on_aborted(self.consecutive_error_count, &error);
                return SessionOutcome::Aborted {
                    consecutive_errors: self.consecutive_error_count,
                    last_error: error,
                };
            }
        }
    }

    fn stopped(&mut self) -> SessionOutcome {
        let reason = if self.guard.is_stopped() {
            StopReason::Guard
        } else {
            StopReason::Teardown
        };
        info!(
            "Stopped polling {} after {} poll(s) ({:?})",
            self.handle, self.attempt_count, reason
        );
        self.reconciler.on_stopped();
        SessionOutcome::Stopped(reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::notifier::NotificationLevel;
    use crate::service::store::{EntityKey, EntityStatusStore};
    use crate::testing::{RecordingNotifier, ScriptedRepository, Step};
    use cierre_core::domain::entity::EntityStatus;
    use cierre_core::domain::job::JobKind;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Fixture {
        poller: Poller,
        repository: Arc<ScriptedRepository>,
        notifier: Arc<RecordingNotifier>,
        store: EntityStatusStore,
        guard: StopGuard,
    }

    impl Fixture {
        fn new(steps: Vec<Step>) -> Self {
            Self::with_config(steps, PollerConfig::default())
        }

        fn with_config(steps: Vec<Step>, config: PollerConfig) -> Self {
            let repository = Arc::new(ScriptedRepository::with_steps(steps));
            let guard = StopGuard::new();
            Self {
                poller: Poller::new(repository.clone(), config, guard.clone()),
                repository,
                notifier: Arc::new(RecordingNotifier::default()),
                store: EntityStatusStore::new(),
                guard,
            }
        }

        fn reconciler(&self, handle: &JobHandle) -> StateReconciler {
            StateReconciler::new(
                handle.clone(),
                self.store.clone(),
                self.repository.clone(),
                self.notifier.clone(),
            )
        }

        fn spawn(&self, handle: &JobHandle) -> Option<SessionHandle> {
            self.poller.spawn(self.reconciler(handle))
        }
    }

    fn upload_handle() -> JobHandle {
        JobHandle::new("abc", JobKind::FileProcessing, "libros-remuneraciones", 5)
    }

    fn libro() -> EntityKey {
        EntityKey::new("libros-remuneraciones", 5)
    }

    #[tokio::test(start_paused = true)]
    async fn test_upload_progress_then_success() {
        let fx = Fixture::new(vec![
            Step::Snapshot(JobStatusSnapshot::progress(50, "Procesando filas")),
            Step::Snapshot(JobStatusSnapshot::success(Some(
                json!({"registros_procesados": 120}),
            ))),
        ]);
        fx.store.set(&libro(), EntityStatus::NoSubido);
        fx.store.force_optimistic(&libro(), EntityStatus::Procesando);
        fx.repository.set_entity_status(EntityStatus::Procesado);

        let start = Instant::now();
        let session = fx.spawn(&upload_handle()).unwrap();
        let outcome = session.wait().await.unwrap();

        assert!(outcome.is_success());
        assert!(start.elapsed() >= Duration::from_secs(4));
        assert!(start.elapsed() < Duration::from_secs(5));
        assert_eq!(fx.repository.status_calls(), 2);
        assert_eq!(fx.store.get(&libro()), Some(EntityStatus::Procesado));
        assert_eq!(fx.notifier.count(NotificationLevel::Info), 1);
        assert_eq!(fx.notifier.count(NotificationLevel::Success), 1);
        assert!(!fx.poller.registry().is_active(&upload_handle()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_three_transport_errors_abort() {
        let handle = JobHandle::new("v1", JobKind::Verification, "cierres", 12);
        let fx = Fixture::new(vec![
            Step::TransportError,
            Step::TransportError,
            Step::TransportError,
            Step::Snapshot(JobStatusSnapshot::success(None)),
        ]);
        let key = EntityKey::of(&handle);
        fx.store.set(&key, EntityStatus::VerificacionDatos);

        let outcome = fx.spawn(&handle).unwrap().wait().await.unwrap();

        assert!(matches!(
            outcome,
            SessionOutcome::Aborted {
                consecutive_errors: 3,
                ..
            }
        ));
        assert_eq!(fx.repository.status_calls(), 3);
        assert_eq!(fx.store.get(&key), Some(EntityStatus::VerificacionDatos));
        assert_eq!(fx.notifier.count(NotificationLevel::Error), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_successful_poll_resets_error_count() {
        let fx = Fixture::new(vec![
            Step::TransportError,
            Step::TransportError,
            Step::Snapshot(JobStatusSnapshot::pending()),
            Step::TransportError,
            Step::TransportError,
            Step::Snapshot(JobStatusSnapshot::success(Some(json!({"estado": "procesado"})))),
        ]);

        let outcome = fx.spawn(&upload_handle()).unwrap().wait().await.unwrap();

        assert!(outcome.is_success());
        assert_eq!(fx.repository.status_calls(), 6);
        assert_eq!(fx.notifier.count(NotificationLevel::Error), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_requests_time_out_as_transport_errors() {
        let fx = Fixture::new(vec![Step::Hang, Step::Hang, Step::Hang]);
        fx.store.set(&libro(), EntityStatus::Procesando);

        let outcome = fx.spawn(&upload_handle()).unwrap().wait().await.unwrap();

        match outcome {
            SessionOutcome::Aborted { last_error, .. } => {
                assert!(last_error.contains("no response"));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(fx.store.get(&libro()), Some(EntityStatus::Procesando));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_rolls_back_entity() {
        let fx = Fixture::new(vec![Step::Snapshot(JobStatusSnapshot::failure(
            "Archivo corrupto",
        ))]);
        fx.store.set(&libro(), EntityStatus::NoSubido);
        fx.store.force_optimistic(&libro(), EntityStatus::Procesando);

        let outcome = fx.spawn(&upload_handle()).unwrap().wait().await.unwrap();

        assert_eq!(
            outcome,
            SessionOutcome::Failed {
                message: "Archivo corrupto".to_string()
            }
        );
        assert_eq!(fx.store.get(&libro()), Some(EntityStatus::NoSubido));
        assert_eq!(
            fx.notifier.messages(NotificationLevel::Error),
            vec!["Archivo corrupto"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_handle_stops_requests() {
        let fx = Fixture::new(vec![]);
        let session = fx.spawn(&upload_handle()).unwrap();

        time::sleep(Duration::from_secs(5)).await;
        let calls = fx.repository.status_calls();
        assert_eq!(calls, 2);

        drop(session);
        time::sleep(Duration::from_secs(20)).await;

        assert_eq!(fx.repository.status_calls(), calls);
        assert!(!fx.poller.registry().is_active(&upload_handle()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_response_arriving_after_stop_is_discarded() {
        let fx = Fixture::new(vec![Step::Delayed(
            Duration::from_secs(1),
            JobStatusSnapshot::success(Some(json!({"estado": "procesado"}))),
        )]);
        fx.store.set(&libro(), EntityStatus::Procesando);
        let session = fx.spawn(&upload_handle()).unwrap();

        // Request goes out at 2s and would answer at 3s
        time::sleep(Duration::from_millis(2500)).await;
        session.stop();
        let outcome = session.wait().await.unwrap();

        assert_eq!(outcome, SessionOutcome::Stopped(StopReason::Teardown));
        assert_eq!(fx.store.get(&libro()), Some(EntityStatus::Procesando));
        assert_eq!(fx.notifier.total(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_guard_stop_during_entity_refresh_has_no_effects() {
        let fx = Fixture::new(vec![Step::Snapshot(JobStatusSnapshot::success(None))]);
        fx.store.set(&libro(), EntityStatus::Procesando);
        fx.repository.set_entity_status(EntityStatus::Procesado);
        fx.repository.set_entity_delay(Duration::from_secs(5));
        let completed = Arc::new(AtomicUsize::new(0));
        let counter = completed.clone();
        let reconciler = fx.reconciler(&upload_handle()).on_complete(Box::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        let session = fx.poller.spawn(reconciler).unwrap();

        // SUCCESS arrives at 2s, the entity would answer at 7s
        time::sleep(Duration::from_millis(2500)).await;
        assert_eq!(fx.repository.entity_calls(), 1);
        fx.guard.stop();
        let outcome = session.wait().await.unwrap();

        assert_eq!(outcome, SessionOutcome::Stopped(StopReason::Guard));
        time::sleep(Duration::from_secs(10)).await;
        assert_eq!(fx.store.get(&libro()), Some(EntityStatus::Procesando));
        assert_eq!(fx.notifier.count(NotificationLevel::Success), 0);
        assert_eq!(completed.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_entity_refresh_does_not_stall_session() {
        let fx = Fixture::new(vec![Step::Snapshot(JobStatusSnapshot::success(None))]);
        fx.store.set(&libro(), EntityStatus::Procesando);
        fx.repository.set_entity_delay(Duration::from_secs(3600));

        let started = Instant::now();
        let outcome = fx.spawn(&upload_handle()).unwrap().wait().await.unwrap();

        assert!(matches!(outcome, SessionOutcome::Succeeded(_)));
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(fx.store.get(&libro()), Some(EntityStatus::Procesando));
        assert_eq!(fx.notifier.count(NotificationLevel::Success), 1);
        assert!(!fx.poller.registry().is_active(&upload_handle()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stopped_guard_prevents_new_sessions() {
        let fx = Fixture::new(vec![]);
        fx.guard.stop();

        assert!(fx.spawn(&upload_handle()).is_none());
        time::sleep(Duration::from_secs(10)).await;
        assert_eq!(fx.repository.status_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_guard_stops_running_session() {
        let handle = JobHandle::new("c1", JobKind::Consolidation, "cierres", 3);
        let fx = Fixture::new(vec![]);
        let key = EntityKey::of(&handle);
        fx.store.set(&key, EntityStatus::VerificadoSinDiscrepancias);
        let session = fx.spawn(&handle).unwrap();

        time::sleep(Duration::from_secs(6)).await;
        fx.guard.stop();
        let outcome = session.wait().await.unwrap();

        assert_eq!(outcome, SessionOutcome::Stopped(StopReason::Guard));
        assert_eq!(fx.repository.status_calls(), 1);
        assert_eq!(
            fx.store.get(&key),
            Some(EntityStatus::VerificadoSinDiscrepancias)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_session_per_handle() {
        let fx = Fixture::new(vec![Step::Snapshot(JobStatusSnapshot::success(Some(
            json!({"estado": "procesado"}),
        )))]);

        let first = fx.spawn(&upload_handle()).unwrap();
        assert!(fx.spawn(&upload_handle()).is_none());

        first.wait().await.unwrap();
        assert!(fx.spawn(&upload_handle()).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_session_expires_at_deadline() {
        let config = PollerConfig {
            max_poll_duration: Duration::from_secs(10),
            ..PollerConfig::default()
        };
        let fx = Fixture::with_config(vec![], config);

        let outcome = fx.spawn(&upload_handle()).unwrap().wait().await.unwrap();

        match outcome {
            SessionOutcome::Expired { elapsed } => assert!(elapsed >= Duration::from_secs(10)),
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(fx.repository.status_calls(), 4);
        assert_eq!(fx.notifier.count(NotificationLevel::Warning), 1);
    }
}
