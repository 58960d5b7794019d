//! Event types for the workflow event bus.
//!
//! `WorkflowEvent` is broadcast by the run orchestrator and by the messaging
//! action handler. All variants are Clone + Send + Sync for use with tokio
//! broadcast channels.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::context::ContextMap;

/// Events emitted while workflows execute.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkflowEvent {
    /// A run moved to `running`.
    RunStarted {
        run_id: Uuid,
        workflow_id: Uuid,
        workflow_name: String,
        trigger_type: String,
    },

    /// A run reached `completed`.
    RunCompleted {
        run_id: Uuid,
        workflow_name: String,
        duration_ms: u64,
    },

    /// A run reached `failed`.
    RunFailed {
        run_id: Uuid,
        workflow_name: String,
        error: String,
    },

    /// A messaging action step sent a message.
    MessageSent {
        message_id: Uuid,
        channel: String,
        payload: ContextMap,
    },
}

impl WorkflowEvent {
    /// The run this event belongs to, if any.
    pub fn run_id(&self) -> Option<Uuid> {
        match self {
            WorkflowEvent::RunStarted { run_id, .. }
            | WorkflowEvent::RunCompleted { run_id, .. }
            | WorkflowEvent::RunFailed { run_id, .. } => Some(*run_id),
            WorkflowEvent::MessageSent { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serde_tagged() {
        let event = WorkflowEvent::RunFailed {
            run_id: Uuid::nil(),
            workflow_name: "wf".to_string(),
            error: "boom".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "run_failed");
        assert_eq!(json["error"], "boom");
        assert_eq!(event.run_id(), Some(Uuid::nil()));
    }
}
