//! Shared domain types for Flowline.
//!
//! Workflow definitions, runs, the execution context value model, events,
//! configuration and the repository error type.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, thiserror.

pub mod config;
pub mod context;
pub mod error;
pub mod event;
pub mod workflow;
