//! Scheduler layer
//!
//! This layer owns the polling sessions: one recurring timer per job handle,
//! the registry that keeps it unique, and the shared stop guard every session
//! honors.

pub mod guard;
pub mod poller;
pub mod registry;

pub use guard::StopGuard;
pub use poller::{Poller, SessionHandle, SessionOutcome, StopReason};
pub use registry::SessionRegistry;
