//! Action dispatch: routes `action` steps to pluggable handlers.
//!
//! Handlers implement [`ActionHandler`] (RPITIT). The dispatcher stores them
//! as `dyn ActionHandlerDyn`, the object-safe boxed-future twin provided by a
//! blanket impl, so any handler can be registered at runtime.

pub mod messaging;
pub mod transform;

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use flowline_types::context::{ContextMap, ContextValue};
use flowline_types::workflow::ActionType;

pub use messaging::BusMessagingHandler;
pub use transform::TransformHandler;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failure reported by a handler.
#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    #[error("missing parameter '{0}'")]
    MissingParam(String),

    #[error("invalid parameter '{name}': {reason}")]
    InvalidParam { name: String, reason: String },

    #[error("{0}")]
    Failed(String),
}

impl ActionError {
    pub fn invalid(name: &str, reason: impl Into<String>) -> Self {
        ActionError::InvalidParam {
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}

/// Errors raised while dispatching an action step.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("unknown action type: {0}")]
    UnknownActionType(String),

    #[error("no handler registered for action type '{0}'")]
    NoHandler(ActionType),

    #[error("{action_type} action failed: {source}")]
    Handler {
        action_type: ActionType,
        #[source]
        source: ActionError,
    },
}

// ---------------------------------------------------------------------------
// Handler traits
// ---------------------------------------------------------------------------

/// A capability behind one action type.
///
/// Receives the step's static `params` and its resolved inputs and returns a
/// result record. Output bindings on the step decide which result fields end
/// up in the context.
pub trait ActionHandler: Send + Sync {
    fn handle(
        &self,
        params: &ContextMap,
        inputs: &ContextMap,
    ) -> impl Future<Output = Result<ContextMap, ActionError>> + Send;
}

/// Object-safe version of [`ActionHandler`] with a boxed future.
pub trait ActionHandlerDyn: Send + Sync {
    fn handle_boxed<'a>(
        &'a self,
        params: &'a ContextMap,
        inputs: &'a ContextMap,
    ) -> Pin<Box<dyn Future<Output = Result<ContextMap, ActionError>> + Send + 'a>>;
}

impl<T: ActionHandler> ActionHandlerDyn for T {
    fn handle_boxed<'a>(
        &'a self,
        params: &'a ContextMap,
        inputs: &'a ContextMap,
    ) -> Pin<Box<dyn Future<Output = Result<ContextMap, ActionError>> + Send + 'a>> {
        Box::pin(self.handle(params, inputs))
    }
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

/// Routes action steps to the handler registered for their type.
#[derive(Clone, Default)]
pub struct ActionDispatcher {
    handlers: HashMap<ActionType, Arc<dyn ActionHandlerDyn>>,
}

impl ActionDispatcher {
    /// An empty dispatcher. Every action fails with `NoHandler` until
    /// handlers are registered.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the handler for an action type.
    pub fn register<H: ActionHandler + 'static>(&mut self, action_type: ActionType, handler: H) {
        self.handlers.insert(action_type, Arc::new(handler));
    }

    /// Builder-style [`register`](Self::register).
    pub fn with_handler<H: ActionHandler + 'static>(
        mut self,
        action_type: ActionType,
        handler: H,
    ) -> Self {
        self.register(action_type, handler);
        self
    }

    pub fn has_handler(&self, action_type: ActionType) -> bool {
        self.handlers.contains_key(&action_type)
    }

    /// Dispatch an action by its declared type name.
    pub async fn dispatch(
        &self,
        action_type: &str,
        inputs: &ContextMap,
        params: &ContextMap,
    ) -> Result<ContextMap, DispatchError> {
        let parsed: ActionType = action_type
            .parse()
            .map_err(DispatchError::UnknownActionType)?;
        let handler = self
            .handlers
            .get(&parsed)
            .ok_or(DispatchError::NoHandler(parsed))?;

        tracing::debug!(action_type = %parsed, inputs = inputs.len(), "dispatching action");

        handler
            .handle_boxed(params, inputs)
            .await
            .map_err(|source| DispatchError::Handler {
                action_type: parsed,
                source,
            })
    }
}

impl std::fmt::Debug for ActionDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut types: Vec<&str> = self.handlers.keys().map(|t| t.as_str()).collect();
        types.sort_unstable();
        f.debug_struct("ActionDispatcher")
            .field("handlers", &types)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Param helpers
// ---------------------------------------------------------------------------

/// Read an optional string parameter.
pub fn str_param<'a>(params: &'a ContextMap, name: &str) -> Result<Option<&'a str>, ActionError> {
    match params.get(name) {
        None | Some(ContextValue::Null) => Ok(None),
        Some(ContextValue::String(s)) => Ok(Some(s)),
        Some(other) => Err(ActionError::invalid(
            name,
            format!("expected string, got {}", other.type_name()),
        )),
    }
}

/// Read an optional boolean parameter.
pub fn bool_param(params: &ContextMap, name: &str) -> Result<Option<bool>, ActionError> {
    match params.get(name) {
        None | Some(ContextValue::Null) => Ok(None),
        Some(ContextValue::Bool(b)) => Ok(Some(*b)),
        Some(other) => Err(ActionError::invalid(
            name,
            format!("expected boolean, got {}", other.type_name()),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    impl ActionHandler for Echo {
        async fn handle(
            &self,
            _params: &ContextMap,
            inputs: &ContextMap,
        ) -> Result<ContextMap, ActionError> {
            Ok(inputs.clone())
        }
    }

    struct Broken;

    impl ActionHandler for Broken {
        async fn handle(
            &self,
            _params: &ContextMap,
            _inputs: &ContextMap,
        ) -> Result<ContextMap, ActionError> {
            Err(ActionError::Failed("connection refused".to_string()))
        }
    }

    fn inputs() -> ContextMap {
        let mut map = ContextMap::new();
        map.insert("x".to_string(), ContextValue::Number(1.0));
        map
    }

    #[tokio::test]
    async fn dispatches_to_registered_handler() {
        let dispatcher = ActionDispatcher::new().with_handler(ActionType::Transform, Echo);
        let result = dispatcher
            .dispatch("transform", &inputs(), &ContextMap::new())
            .await
            .unwrap();
        assert_eq!(result, inputs());
    }

    #[tokio::test]
    async fn unknown_action_type_is_an_error() {
        let dispatcher = ActionDispatcher::new().with_handler(ActionType::Transform, Echo);
        let err = dispatcher
            .dispatch("teleport", &inputs(), &ContextMap::new())
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::UnknownActionType(ref t) if t == "teleport"));
        assert_eq!(err.to_string(), "unknown action type: teleport");
    }

    #[tokio::test]
    async fn known_type_without_handler_is_an_error() {
        let dispatcher = ActionDispatcher::new();
        let err = dispatcher
            .dispatch("storage", &inputs(), &ContextMap::new())
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::NoHandler(ActionType::Storage)));
    }

    #[tokio::test]
    async fn handler_failure_keeps_message() {
        let dispatcher = ActionDispatcher::new().with_handler(ActionType::Network, Broken);
        let err = dispatcher
            .dispatch("network", &inputs(), &ContextMap::new())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "network action failed: connection refused");
    }

    #[test]
    fn register_replaces_and_debug_lists_types() {
        let mut dispatcher = ActionDispatcher::new();
        dispatcher.register(ActionType::Transform, Echo);
        dispatcher.register(ActionType::Transform, Broken);
        assert!(dispatcher.has_handler(ActionType::Transform));
        assert!(!dispatcher.has_handler(ActionType::Messaging));
        assert!(format!("{dispatcher:?}").contains("transform"));
    }

    #[test]
    fn param_helpers_check_types() {
        let mut params = ContextMap::new();
        params.insert("name".to_string(), "ops".into());
        params.insert("flag".to_string(), true.into());
        params.insert("bad".to_string(), ContextValue::Number(1.0));

        assert_eq!(str_param(&params, "name").unwrap(), Some("ops"));
        assert_eq!(str_param(&params, "absent").unwrap(), None);
        assert!(str_param(&params, "bad").is_err());
        assert_eq!(bool_param(&params, "flag").unwrap(), Some(true));
        assert!(bool_param(&params, "name").is_err());
    }
}
