//! Messaging handler that publishes onto the workflow event bus.
//!
//! The resolved inputs become the message payload. External transports
//! (chat, email, queues) subscribe to `WorkflowEvent::MessageSent`.

use flowline_types::context::{ContextMap, ContextValue};
use flowline_types::event::WorkflowEvent;
use uuid::Uuid;

use super::{str_param, ActionError, ActionHandler};
use crate::event::EventBus;

/// Channel used when a step does not name one.
pub const DEFAULT_CHANNEL: &str = "default";

/// Publishes `MessageSent` events.
#[derive(Debug, Clone)]
pub struct BusMessagingHandler {
    bus: EventBus,
}

impl BusMessagingHandler {
    pub fn new(bus: EventBus) -> Self {
        Self { bus }
    }
}

impl ActionHandler for BusMessagingHandler {
    async fn handle(
        &self,
        params: &ContextMap,
        inputs: &ContextMap,
    ) -> Result<ContextMap, ActionError> {
        let channel = str_param(params, "channel")?.unwrap_or(DEFAULT_CHANNEL);
        let message_id = Uuid::now_v7();

        self.bus.publish(WorkflowEvent::MessageSent {
            message_id,
            channel: channel.to_string(),
            payload: inputs.clone(),
        });
        tracing::debug!(%message_id, channel, "message published");

        let mut result = ContextMap::new();
        result.insert("sent".to_string(), ContextValue::Bool(true));
        result.insert(
            "message_id".to_string(),
            ContextValue::String(message_id.to_string()),
        );
        result.insert("channel".to_string(), ContextValue::from(channel));
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publishes_message_and_returns_receipt() {
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();
        let handler = BusMessagingHandler::new(bus);

        let mut params = ContextMap::new();
        params.insert("channel".to_string(), "ops".into());
        let mut inputs = ContextMap::new();
        inputs.insert("text".to_string(), "deploy finished".into());

        let result = handler.handle(&params, &inputs).await.unwrap();
        assert_eq!(result["sent"], ContextValue::Bool(true));
        assert_eq!(result["channel"], ContextValue::from("ops"));

        match rx.recv().await.unwrap() {
            WorkflowEvent::MessageSent {
                message_id,
                channel,
                payload,
            } => {
                assert_eq!(channel, "ops");
                assert_eq!(payload, inputs);
                assert_eq!(
                    result["message_id"],
                    ContextValue::String(message_id.to_string())
                );
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn defaults_channel_and_rejects_bad_param() {
        let handler = BusMessagingHandler::new(EventBus::new(8));
        let result = handler
            .handle(&ContextMap::new(), &ContextMap::new())
            .await
            .unwrap();
        assert_eq!(result["channel"], ContextValue::from(DEFAULT_CHANNEL));

        let mut params = ContextMap::new();
        params.insert("channel".to_string(), ContextValue::Number(3.0));
        assert!(handler.handle(&params, &ContextMap::new()).await.is_err());
    }
}
