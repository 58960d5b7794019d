//! In-memory implementation of the workflow repositories.
//!
//! Backed by `DashMap` so it can be shared across the orchestrator's spawned
//! run tasks. Used by engine tests and by embedders that do not need
//! durability.

use dashmap::DashMap;
use flowline_types::error::RepositoryError;
use flowline_types::workflow::{RunFilter, RunUpdate, WorkflowDefinition, WorkflowRun};
use uuid::Uuid;

use super::workflow::{DefinitionRepository, RunRepository};

/// Volatile definition and run store.
#[derive(Debug, Default)]
pub struct InMemoryWorkflowRepository {
    definitions: DashMap<Uuid, WorkflowDefinition>,
    runs: DashMap<Uuid, WorkflowRun>,
}

impl InMemoryWorkflowRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored runs.
    pub fn run_count(&self) -> usize {
        self.runs.len()
    }
}

impl DefinitionRepository for InMemoryWorkflowRepository {
    async fn save_definition(&self, def: &WorkflowDefinition) -> Result<(), RepositoryError> {
        self.definitions.insert(def.id, def.clone());
        Ok(())
    }

    async fn get_definition(&self, id: &Uuid) -> Result<Option<WorkflowDefinition>, RepositoryError> {
        Ok(self.definitions.get(id).map(|d| d.value().clone()))
    }

    async fn list_definitions(
        &self,
        owner_id: Option<&str>,
    ) -> Result<Vec<WorkflowDefinition>, RepositoryError> {
        let mut defs: Vec<WorkflowDefinition> = self
            .definitions
            .iter()
            .filter(|d| owner_id.is_none_or(|o| d.owner_id == o))
            .map(|d| d.value().clone())
            .collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(defs)
    }

    async fn delete_definition(&self, id: &Uuid) -> Result<bool, RepositoryError> {
        Ok(self.definitions.remove(id).is_some())
    }
}

impl RunRepository for InMemoryWorkflowRepository {
    async fn create_run(&self, run: &WorkflowRun) -> Result<WorkflowRun, RepositoryError> {
        if self.runs.contains_key(&run.id) {
            return Err(RepositoryError::Conflict(format!("run {} already exists", run.id)));
        }
        self.runs.insert(run.id, run.clone());
        Ok(run.clone())
    }

    async fn update_run(
        &self,
        run_id: &Uuid,
        update: &RunUpdate,
    ) -> Result<WorkflowRun, RepositoryError> {
        let mut entry = self.runs.get_mut(run_id).ok_or(RepositoryError::NotFound)?;
        update.apply_to(entry.value_mut());
        Ok(entry.value().clone())
    }

    async fn get_run(&self, run_id: &Uuid) -> Result<Option<WorkflowRun>, RepositoryError> {
        Ok(self.runs.get(run_id).map(|r| r.value().clone()))
    }

    async fn find_runs(&self, filter: &RunFilter) -> Result<Vec<WorkflowRun>, RepositoryError> {
        let mut runs: Vec<WorkflowRun> = self
            .runs
            .iter()
            .filter(|r| filter.matches(r.value()))
            .map(|r| r.value().clone())
            .collect();
        runs.sort_by(|a, b| b.started_at.cmp(&a.started_at).then(b.id.cmp(&a.id)));
        if let Some(limit) = filter.limit {
            runs.truncate(limit as usize);
        }
        Ok(runs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use flowline_types::context::ContextMap;
    use flowline_types::workflow::RunStatus;

    fn sample_definition(owner: &str, name: &str) -> WorkflowDefinition {
        WorkflowDefinition {
            id: Uuid::now_v7(),
            owner_id: owner.to_string(),
            name: name.to_string(),
            description: None,
            steps: vec![],
            triggers: vec![],
            enabled: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn sample_run(workflow_id: Uuid, status: RunStatus) -> WorkflowRun {
        WorkflowRun {
            id: Uuid::now_v7(),
            workflow_id,
            workflow_name: "wf".to_string(),
            status,
            trigger_type: "manual".to_string(),
            input: ContextMap::new(),
            started_at: Utc::now(),
            completed_at: None,
            result: None,
            error: None,
        }
    }

    #[tokio::test]
    async fn test_definition_crud() {
        let repo = InMemoryWorkflowRepository::new();
        let def = sample_definition("alice", "b-flow");
        repo.save_definition(&def).await.unwrap();
        repo.save_definition(&sample_definition("alice", "a-flow")).await.unwrap();
        repo.save_definition(&sample_definition("bob", "c-flow")).await.unwrap();

        let loaded = repo.get_definition(&def.id).await.unwrap().unwrap();
        assert_eq!(loaded.name, "b-flow");

        let alice: Vec<String> = repo
            .list_definitions(Some("alice"))
            .await
            .unwrap()
            .into_iter()
            .map(|d| d.name)
            .collect();
        assert_eq!(alice, vec!["a-flow", "b-flow"]);
        assert_eq!(repo.list_definitions(None).await.unwrap().len(), 3);

        assert!(repo.delete_definition(&def.id).await.unwrap());
        assert!(!repo.delete_definition(&def.id).await.unwrap());
        assert!(repo.get_definition(&def.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_create_run_rejects_duplicate_id() {
        let repo = InMemoryWorkflowRepository::new();
        let run = sample_run(Uuid::now_v7(), RunStatus::Pending);
        repo.create_run(&run).await.unwrap();
        let err = repo.create_run(&run).await.unwrap_err();
        assert!(matches!(err, RepositoryError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_update_run_missing_is_not_found() {
        let repo = InMemoryWorkflowRepository::new();
        let err = repo
            .update_run(&Uuid::now_v7(), &RunUpdate::default())
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::NotFound));
    }

    #[tokio::test]
    async fn test_find_runs_filters_and_limits() {
        let repo = InMemoryWorkflowRepository::new();
        let wf = Uuid::now_v7();
        for _ in 0..3 {
            repo.create_run(&sample_run(wf, RunStatus::Completed)).await.unwrap();
        }
        repo.create_run(&sample_run(wf, RunStatus::Failed)).await.unwrap();
        repo.create_run(&sample_run(Uuid::now_v7(), RunStatus::Failed)).await.unwrap();

        let all = repo.find_runs(&RunFilter::for_workflow(wf)).await.unwrap();
        assert_eq!(all.len(), 4);
        assert!(all.windows(2).all(|w| w[0].started_at >= w[1].started_at));

        let failed = repo
            .find_runs(&RunFilter::for_workflow(wf).with_status(RunStatus::Failed))
            .await
            .unwrap();
        assert_eq!(failed.len(), 1);

        let limited = repo
            .find_runs(&RunFilter::default().with_limit(2))
            .await
            .unwrap();
        assert_eq!(limited.len(), 2);
        assert_eq!(repo.run_count(), 5);
    }
}
