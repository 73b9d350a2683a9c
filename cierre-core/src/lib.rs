//! Cierre Core
//!
//! Core types shared by the Cierre task tracker crates.
//!
//! This crate contains:
//! - Domain types: job handles, status snapshots, entity status fields
//! - DTOs: wire shapes exchanged with the closing-management backend

pub mod domain;
pub mod dto;
