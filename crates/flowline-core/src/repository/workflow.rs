//! Workflow repository trait definitions.
//!
//! Two storage interfaces back the engine:
//! - **Definitions:** simple CRUD for workflow templates.
//! - **Runs:** append/update/query of execution records. Runs are never
//!   deleted by the engine.
//!
//! The infrastructure layer (flowline-infra) implements both with SQLite;
//! `super::memory` implements both in memory.
//!
//! Uses native async fn in traits (Rust 2024 edition, no async_trait macro).

use flowline_types::error::RepositoryError;
use flowline_types::workflow::{RunFilter, RunUpdate, WorkflowDefinition, WorkflowRun};
use uuid::Uuid;

/// Storage for workflow definitions.
pub trait DefinitionRepository: Send + Sync {
    /// Upsert a workflow definition (insert or replace by ID).
    fn save_definition(
        &self,
        def: &WorkflowDefinition,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Get a workflow definition by its UUID.
    fn get_definition(
        &self,
        id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Option<WorkflowDefinition>, RepositoryError>> + Send;

    /// List workflow definitions, optionally filtered by owner, ordered by name.
    fn list_definitions(
        &self,
        owner_id: Option<&str>,
    ) -> impl std::future::Future<Output = Result<Vec<WorkflowDefinition>, RepositoryError>> + Send;

    /// Delete a workflow definition by ID. Returns `true` if it existed.
    fn delete_definition(
        &self,
        id: &Uuid,
    ) -> impl std::future::Future<Output = Result<bool, RepositoryError>> + Send;
}

/// Storage for workflow run records.
pub trait RunRepository: Send + Sync {
    /// Persist a new run record.
    fn create_run(
        &self,
        run: &WorkflowRun,
    ) -> impl std::future::Future<Output = Result<WorkflowRun, RepositoryError>> + Send;

    /// Apply a partial update and return the stored record.
    ///
    /// Returns `RepositoryError::NotFound` if the run does not exist.
    fn update_run(
        &self,
        run_id: &Uuid,
        update: &RunUpdate,
    ) -> impl std::future::Future<Output = Result<WorkflowRun, RepositoryError>> + Send;

    /// Get a run by its UUID.
    fn get_run(
        &self,
        run_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Option<WorkflowRun>, RepositoryError>> + Send;

    /// Find runs matching a filter, ordered by `started_at` DESC.
    fn find_runs(
        &self,
        filter: &RunFilter,
    ) -> impl std::future::Future<Output = Result<Vec<WorkflowRun>, RepositoryError>> + Send;
}
