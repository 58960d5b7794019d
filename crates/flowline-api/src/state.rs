//! Application state wiring all services together.
//!
//! The engine and service are generic over repository traits; `AppState`
//! pins them to the SQLite implementation and registers every action
//! handler on one dispatcher.

use std::path::Path;
use std::sync::Arc;

use flowline_core::event::EventBus;
use flowline_core::service::workflow::WorkflowService;
use flowline_core::workflow::action::{ActionDispatcher, BusMessagingHandler, TransformHandler};
use flowline_core::workflow::orchestrator::WorkflowOrchestrator;
use flowline_core::workflow::step_runner::StepRunner;
use flowline_infra::action::{HttpActionHandler, SqliteStorageHandler};
use flowline_infra::config::database_url;
use flowline_infra::sqlite::kv::SqliteKvStore;
use flowline_infra::sqlite::pool::DatabasePool;
use flowline_infra::sqlite::workflow::SqliteWorkflowRepository;
use flowline_types::config::FlowlineConfig;
use flowline_types::workflow::ActionType;

pub type ConcreteWorkflowService = WorkflowService<SqliteWorkflowRepository>;
pub type ConcreteOrchestrator = WorkflowOrchestrator<SqliteWorkflowRepository>;

/// Shared application state used by every CLI command.
#[derive(Clone)]
pub struct AppState {
    pub workflow_service: Arc<ConcreteWorkflowService>,
    pub orchestrator: ConcreteOrchestrator,
    pub event_bus: EventBus,
}

impl AppState {
    /// Connect to the database and wire the engine.
    pub async fn init(data_dir: &Path, config: &FlowlineConfig) -> anyhow::Result<Self> {
        // Ensure data directory exists
        tokio::fs::create_dir_all(data_dir).await?;

        let db_pool = DatabasePool::new(&database_url(config, data_dir)).await?;
        tracing::debug!(data_dir = %data_dir.display(), "database opened");
        let repo = Arc::new(SqliteWorkflowRepository::new(db_pool.clone()));
        let event_bus = EventBus::new(config.event_bus_capacity);

        let dispatcher = ActionDispatcher::new()
            .with_handler(ActionType::Network, HttpActionHandler::new(&config.http)?)
            .with_handler(
                ActionType::Storage,
                SqliteStorageHandler::new(
                    SqliteKvStore::new(db_pool.clone()),
                    config.storage.default_namespace.clone(),
                ),
            )
            .with_handler(
                ActionType::Messaging,
                BusMessagingHandler::new(event_bus.clone()),
            )
            .with_handler(ActionType::Transform, TransformHandler);
        tracing::debug!(?dispatcher, "action handlers registered");

        let orchestrator = WorkflowOrchestrator::new(
            Arc::clone(&repo),
            StepRunner::new(dispatcher),
            event_bus.clone(),
        );
        let workflow_service =
            WorkflowService::new(repo).with_history_limit(config.run_history_limit);

        Ok(Self {
            workflow_service: Arc::new(workflow_service),
            orchestrator,
            event_bus,
        })
    }
}
