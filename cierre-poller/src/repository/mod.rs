//! Repository layer
//!
//! Repositories are stateless adapters over the backend API. They give the
//! initiator, the poller, and the reconciler one narrow interface without any
//! business logic.
//!
//! The trait exists so every component above it can be driven by a scripted
//! backend in tests.

mod tasks;

pub use tasks::HttpTaskRepository;
pub use tasks::TaskRepository;
