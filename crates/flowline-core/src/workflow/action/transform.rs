//! Pure data transform handler.
//!
//! Returns the resolved inputs as the result record. Two optional params
//! reshape it:
//!
//! ```yaml
//! params:
//!   pick: [id, total]        # keep only these keys
//!   rename: { total: amount } # then rename keys
//! ```

use flowline_types::context::{ContextMap, ContextValue};

use super::{ActionError, ActionHandler};

/// Pass-through transform with optional `pick` and `rename`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TransformHandler;

impl ActionHandler for TransformHandler {
    async fn handle(
        &self,
        params: &ContextMap,
        inputs: &ContextMap,
    ) -> Result<ContextMap, ActionError> {
        let mut result = match params.get("pick") {
            None | Some(ContextValue::Null) => inputs.clone(),
            Some(ContextValue::List(keys)) => {
                let mut picked = ContextMap::new();
                for key in keys {
                    let key = key
                        .as_str()
                        .ok_or_else(|| ActionError::invalid("pick", "keys must be strings"))?;
                    if let Some(value) = inputs.get(key) {
                        picked.insert(key.to_string(), value.clone());
                    }
                }
                picked
            }
            Some(other) => {
                return Err(ActionError::invalid(
                    "pick",
                    format!("expected list, got {}", other.type_name()),
                ));
            }
        };

        match params.get("rename") {
            None | Some(ContextValue::Null) => {}
            Some(ContextValue::Map(renames)) => {
                for (from, to) in renames {
                    let to = to
                        .as_str()
                        .ok_or_else(|| ActionError::invalid("rename", "targets must be strings"))?;
                    if let Some(value) = result.remove(from) {
                        result.insert(to.to_string(), value);
                    }
                }
            }
            Some(other) => {
                return Err(ActionError::invalid(
                    "rename",
                    format!("expected map, got {}", other.type_name()),
                ));
            }
        }

        Ok(result)
    }
}
