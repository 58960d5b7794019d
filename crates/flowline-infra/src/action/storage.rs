//! `storage` action handler over the SQLite key-value table.
//!
//! Params: `operation` (`get | put | delete | list`), `namespace` and `key`.
//! Inputs named `key` and `value` take precedence over params. `put` stores
//! the `value` input, or the whole input record when there is none. `list`
//! accepts an optional `prefix`.
//!
//! Every operation returns `{ rows, count }`; `get` also returns `value`
//! (`null` when the key is absent).

use flowline_core::workflow::action::{str_param, ActionError, ActionHandler};
use flowline_types::context::{ContextMap, ContextValue};

use crate::sqlite::kv::{KvEntry, SqliteKvStore};

/// Storage operations understood by [`SqliteStorageHandler`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operation {
    Get,
    Put,
    Delete,
    List,
}

impl Operation {
    fn parse(s: &str) -> Result<Self, ActionError> {
        match s {
            "get" => Ok(Operation::Get),
            "put" => Ok(Operation::Put),
            "delete" => Ok(Operation::Delete),
            "list" => Ok(Operation::List),
            other => Err(ActionError::invalid(
                "operation",
                format!("expected get, put, delete or list, got '{other}'"),
            )),
        }
    }
}

/// Runs key-value operations for `storage` action steps.
#[derive(Debug, Clone)]
pub struct SqliteStorageHandler {
    store: SqliteKvStore,
    default_namespace: String,
}

impl SqliteStorageHandler {
    pub fn new(store: SqliteKvStore, default_namespace: impl Into<String>) -> Self {
        Self {
            store,
            default_namespace: default_namespace.into(),
        }
    }
}

fn required_key<'a>(params: &'a ContextMap, inputs: &'a ContextMap) -> Result<&'a str, ActionError> {
    match inputs.get("key") {
        Some(ContextValue::String(key)) => Ok(key),
        _ => str_param(params, "key")?.ok_or_else(|| ActionError::MissingParam("key".into())),
    }
}

fn entry_row(key: &str, value: ContextValue) -> ContextValue {
    let mut row = ContextMap::new();
    row.insert("key".to_string(), ContextValue::from(key));
    row.insert("value".to_string(), value);
    ContextValue::Map(row)
}

fn result_record(rows: Vec<ContextValue>, count: usize) -> ContextMap {
    let mut result = ContextMap::new();
    result.insert("count".to_string(), ContextValue::Number(count as f64));
    result.insert("rows".to_string(), ContextValue::List(rows));
    result
}

fn storage_failed(e: impl std::fmt::Display) -> ActionError {
    ActionError::Failed(format!("storage error: {e}"))
}

impl ActionHandler for SqliteStorageHandler {
    async fn handle(
        &self,
        params: &ContextMap,
        inputs: &ContextMap,
    ) -> Result<ContextMap, ActionError> {
        let operation = Operation::parse(
            str_param(params, "operation")?
                .ok_or_else(|| ActionError::MissingParam("operation".into()))?,
        )?;
        let namespace = str_param(params, "namespace")?.unwrap_or(self.default_namespace.as_str());

        tracing::debug!(?operation, namespace, "storage action");

        match operation {
            Operation::Get => {
                let key = required_key(params, inputs)?;
                let value = self.store.get(namespace, key).await.map_err(storage_failed)?;
                let rows: Vec<ContextValue> = value
                    .iter()
                    .map(|v| entry_row(key, v.clone()))
                    .collect();
                let count = rows.len();
                let mut result = result_record(rows, count);
                result.insert("value".to_string(), value.unwrap_or(ContextValue::Null));
                Ok(result)
            }
            Operation::Put => {
                let key = required_key(params, inputs)?;
                let value = match inputs.get("value") {
                    Some(value) => value.clone(),
                    None => {
                        let mut record = inputs.clone();
                        record.remove("key");
                        ContextValue::Map(record)
                    }
                };
                self.store
                    .put(namespace, key, &value)
                    .await
                    .map_err(storage_failed)?;
                Ok(result_record(vec![entry_row(key, value)], 1))
            }
            Operation::Delete => {
                let key = required_key(params, inputs)?;
                let removed = self
                    .store
                    .delete(namespace, key)
                    .await
                    .map_err(storage_failed)?;
                Ok(result_record(Vec::new(), usize::from(removed)))
            }
            Operation::List => {
                let prefix = match inputs.get("prefix") {
                    Some(ContextValue::String(prefix)) => Some(prefix.as_str()),
                    _ => str_param(params, "prefix")?,
                };
                let entries = self
                    .store
                    .list(namespace, prefix)
                    .await
                    .map_err(storage_failed)?;
                let rows: Vec<ContextValue> = entries
                    .into_iter()
                    .map(|KvEntry { key, value, .. }| entry_row(&key, value))
                    .collect();
                let count = rows.len();
                Ok(result_record(rows, count))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite::pool::DatabasePool;

    async fn test_handler() -> SqliteStorageHandler {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("test.db").display());
        std::mem::forget(dir);
        let pool = DatabasePool::new(&url).await.unwrap();
        SqliteStorageHandler::new(SqliteKvStore::new(pool), "default")
    }

    fn params(operation: &str, key: Option<&str>) -> ContextMap {
        let mut params = ContextMap::new();
        params.insert("operation".to_string(), operation.into());
        if let Some(key) = key {
            params.insert("key".to_string(), key.into());
        }
        params
    }

    #[tokio::test]
    async fn put_then_get_roundtrips_value() {
        let handler = test_handler().await;
        let mut inputs = ContextMap::new();
        inputs.insert("value".to_string(), ContextValue::Number(7.0));

        let put = handler.handle(&params("put", Some("n")), &inputs).await.unwrap();
        assert_eq!(put["count"], ContextValue::Number(1.0));

        let got = handler
            .handle(&params("get", Some("n")), &ContextMap::new())
            .await
            .unwrap();
        assert_eq!(got["value"], ContextValue::Number(7.0));
        assert_eq!(got["count"], ContextValue::Number(1.0));
    }

    #[tokio::test]
    async fn get_missing_returns_null_and_empty_rows() {
        let handler = test_handler().await;
        let got = handler
            .handle(&params("get", Some("absent")), &ContextMap::new())
            .await
            .unwrap();
        assert_eq!(got["value"], ContextValue::Null);
        assert_eq!(got["rows"], ContextValue::List(Vec::new()));
        assert_eq!(got["count"], ContextValue::Number(0.0));
    }

    #[tokio::test]
    async fn put_without_value_stores_input_record() {
        let handler = test_handler().await;
        let mut inputs = ContextMap::new();
        inputs.insert("key".to_string(), "order-1".into());
        inputs.insert("total".to_string(), ContextValue::Number(12.5));

        handler.handle(&params("put", None), &inputs).await.unwrap();

        let got = handler
            .handle(&params("get", Some("order-1")), &ContextMap::new())
            .await
            .unwrap();
        let stored = got["value"].as_map().unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored["total"], ContextValue::Number(12.5));
    }

    #[tokio::test]
    async fn list_and_delete_respect_namespace() {
        let handler = test_handler().await;
        let mut inputs = ContextMap::new();
        inputs.insert("value".to_string(), "x".into());
        for key in ["b", "a"] {
            handler.handle(&params("put", Some(key)), &inputs).await.unwrap();
        }
        let mut other = params("put", Some("c"));
        other.insert("namespace".to_string(), "other".into());
        handler.handle(&other, &inputs).await.unwrap();

        let listed = handler
            .handle(&params("list", None), &ContextMap::new())
            .await
            .unwrap();
        assert_eq!(listed["count"], ContextValue::Number(2.0));
        let first = listed["rows"].as_list().unwrap()[0].as_map().unwrap();
        assert_eq!(first["key"], ContextValue::from("a"));

        let deleted = handler
            .handle(&params("delete", Some("a")), &ContextMap::new())
            .await
            .unwrap();
        assert_eq!(deleted["count"], ContextValue::Number(1.0));
        let again = handler
            .handle(&params("delete", Some("a")), &ContextMap::new())
            .await
            .unwrap();
        assert_eq!(again["count"], ContextValue::Number(0.0));
    }

    #[tokio::test]
    async fn bad_operation_and_missing_key_are_param_errors() {
        let handler = test_handler().await;

        let err = handler
            .handle(&params("truncate", None), &ContextMap::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ActionError::InvalidParam { ref name, .. } if name == "operation"));

        let err = handler
            .handle(&params("get", None), &ContextMap::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ActionError::MissingParam(ref p) if p == "key"));

        let err = handler
            .handle(&ContextMap::new(), &ContextMap::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ActionError::MissingParam(ref p) if p == "operation"));
    }
}
