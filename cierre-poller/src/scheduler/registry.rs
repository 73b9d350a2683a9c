//! Session registry
//!
//! Keeps at most one live polling session per job handle. A session holds a
//! [`Registration`] for its whole lifetime; dropping it frees the slot.

use cierre_core::domain::job::JobHandle;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

#[derive(Debug)]
struct Entry {
    id: u64,
    token: CancellationToken,
}

#[derive(Debug, Default)]
struct RegistryInner {
    next_id: u64,
    sessions: HashMap<JobHandle, Entry>,
}

/// Registry of live polling sessions
#[derive(Debug, Clone, Default)]
pub struct SessionRegistry {
    inner: Arc<Mutex<RegistryInner>>,
}

/// Slot of one live session; frees itself on drop
#[derive(Debug)]
pub struct Registration {
    registry: SessionRegistry,
    handle: JobHandle,
    id: u64,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, RegistryInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Claims the slot of a handle
    ///
    /// Returns `None` if a session for the handle is already live.
    pub fn try_register(&self, handle: &JobHandle, token: CancellationToken) -> Option<Registration> {
        let mut inner = self.lock();
        if inner.sessions.contains_key(handle) {
            return None;
        }

        inner.next_id += 1;
        let id = inner.next_id;
        inner.sessions.insert(handle.clone(), Entry { id, token });

        Some(Registration {
            registry: self.clone(),
            handle: handle.clone(),
            id,
        })
    }

    pub fn is_active(&self, handle: &JobHandle) -> bool {
        self.lock().sessions.contains_key(handle)
    }

    pub fn active_count(&self) -> usize {
        self.lock().sessions.len()
    }

    /// Stops the live session of a handle, if any
    pub fn stop(&self, handle: &JobHandle) -> bool {
        match self.lock().sessions.get(handle) {
            Some(entry) => {
                entry.token.cancel();
                true
            }
            None => false,
        }
    }

    fn release(&self, handle: &JobHandle, id: u64) {
        let mut inner = self.lock();
        if inner.sessions.get(handle).is_some_and(|e| e.id == id) {
            inner.sessions.remove(handle);
        }
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.registry.release(&self.handle, self.id);
    }
}
