//! Workflow engine core: definitions, step interpretation, and run lifecycle.
//!
//! - `definition` -- YAML/JSON parsing, validation, file loading
//! - `resolver` -- `$path` input resolution and output path lookup
//! - `expression` -- sandboxed condition expression evaluator
//! - `action` -- action dispatcher and built-in handlers
//! - `step_runner` -- recursive step interpreter
//! - `state` -- run state machine
//! - `orchestrator` -- starts runs and supervises their background tasks

pub mod action;
pub mod definition;
pub mod expression;
pub mod orchestrator;
pub mod resolver;
pub mod state;
pub mod step_runner;
