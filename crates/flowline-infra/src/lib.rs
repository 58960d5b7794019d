//! Infrastructure layer for Flowline.
//!
//! Contains implementations of the ports defined in `flowline-core`: the
//! SQLite workflow repository, the SQLite-backed `storage` action, the
//! reqwest-backed `network` action and TOML config loading.

pub mod action;
pub mod config;
pub mod sqlite;
