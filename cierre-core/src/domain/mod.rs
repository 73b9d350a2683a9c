//! Core domain types
//!
//! These types describe the asynchronous backend jobs of a period close
//! ("cierre") and the entity status strings the backend owns. They are shared
//! between the HTTP client (decoding) and the poller (reconciliation).

pub mod entity;
pub mod job;
