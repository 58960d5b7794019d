//! Workflow engine and repository trait definitions for Flowline.
//!
//! This crate defines the "ports" (repository traits) that the infrastructure
//! layer implements. It depends only on `flowline-types` -- never on
//! `flowline-infra` or any database/IO crate.

pub mod event;
pub mod repository;
pub mod service;
pub mod workflow;
