//! Data Transfer Objects for the closing-management backend
//!
//! This module contains the wire shapes of the REST endpoints that start
//! backend jobs and report on them.

pub mod task;
