//! SQLite key-value store backing the `storage` action.
//!
//! Rows live in `workflow_kv`, keyed by `(namespace, key)`. Values are
//! context values stored as JSON text and deserialized on read.

use chrono::{DateTime, SecondsFormat, Utc};
use flowline_types::context::ContextValue;
use flowline_types::error::RepositoryError;
use sqlx::Row;

use super::pool::DatabasePool;

/// A stored key-value row.
#[derive(Debug, Clone, PartialEq)]
pub struct KvEntry {
    pub namespace: String,
    pub key: String,
    pub value: ContextValue,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Namespaced key-value store over `workflow_kv`.
#[derive(Debug, Clone)]
pub struct SqliteKvStore {
    pool: DatabasePool,
}

impl SqliteKvStore {
    /// Create a new KV store backed by the given database pool.
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    pub async fn get(
        &self,
        namespace: &str,
        key: &str,
    ) -> Result<Option<ContextValue>, RepositoryError> {
        let row = sqlx::query("SELECT value FROM workflow_kv WHERE namespace = ? AND key = ?")
            .bind(namespace)
            .bind(key)
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        match row {
            Some(row) => {
                let value_str: String = row
                    .try_get("value")
                    .map_err(|e| RepositoryError::Query(e.to_string()))?;
                Ok(Some(parse_value(&value_str)?))
            }
            None => Ok(None),
        }
    }

    /// Insert or overwrite a value. `created_at` survives overwrites.
    pub async fn put(
        &self,
        namespace: &str,
        key: &str,
        value: &ContextValue,
    ) -> Result<(), RepositoryError> {
        let now = format_datetime(&Utc::now());
        let value_str = serde_json::to_string(value)
            .map_err(|e| RepositoryError::Query(format!("failed to serialize value: {e}")))?;

        sqlx::query(
            r#"INSERT INTO workflow_kv (namespace, key, value, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?)
               ON CONFLICT (namespace, key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at"#,
        )
        .bind(namespace)
        .bind(key)
        .bind(&value_str)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool.writer)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        Ok(())
    }

    /// Delete a key. Returns `true` if a row was removed.
    pub async fn delete(&self, namespace: &str, key: &str) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM workflow_kv WHERE namespace = ? AND key = ?")
            .bind(namespace)
            .bind(key)
            .execute(&self.pool.writer)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    /// All entries in a namespace ordered by key, optionally restricted to a
    /// key prefix.
    pub async fn list(
        &self,
        namespace: &str,
        prefix: Option<&str>,
    ) -> Result<Vec<KvEntry>, RepositoryError> {
        let rows = sqlx::query(
            r#"SELECT * FROM workflow_kv
               WHERE namespace = ?1 AND (?2 IS NULL OR substr(key, 1, length(?2)) = ?2)
               ORDER BY key"#,
        )
        .bind(namespace)
        .bind(prefix)
        .fetch_all(&self.pool.reader)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in &rows {
            let kv_row = KvRow::from_row(row).map_err(|e| RepositoryError::Query(e.to_string()))?;
            entries.push(kv_row.into_entry()?);
        }
        Ok(entries)
    }
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

struct KvRow {
    namespace: String,
    key: String,
    value: String,
    created_at: String,
    updated_at: String,
}

impl KvRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            namespace: row.try_get("namespace")?,
            key: row.try_get("key")?,
            value: row.try_get("value")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn into_entry(self) -> Result<KvEntry, RepositoryError> {
        Ok(KvEntry {
            value: parse_value(&self.value)?,
            created_at: parse_datetime(&self.created_at)?,
            updated_at: parse_datetime(&self.updated_at)?,
            namespace: self.namespace,
            key: self.key,
        })
    }
}

fn parse_value(s: &str) -> Result<ContextValue, RepositoryError> {
    serde_json::from_str(s).map_err(|e| RepositoryError::Query(format!("invalid JSON value: {e}")))
}

fn parse_datetime(s: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Query(format!("invalid datetime: {e}")))
}

fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowline_types::context::ContextMap;

    async fn test_pool() -> DatabasePool {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let url = format!("sqlite://{}?mode=rwc", db_path.display());
        std::mem::forget(dir);
        DatabasePool::new(&url).await.unwrap()
    }

    #[tokio::test]
    async fn test_put_get_roundtrip() {
        let store = SqliteKvStore::new(test_pool().await);

        let mut settings = ContextMap::new();
        settings.insert("theme".to_string(), "dark".into());
        settings.insert("font_size".to_string(), ContextValue::Number(14.0));
        let value = ContextValue::Map(settings);

        store.put("app", "settings", &value).await.unwrap();
        assert_eq!(store.get("app", "settings").await.unwrap(), Some(value));
    }

    #[tokio::test]
    async fn test_get_nonexistent_returns_none() {
        let store = SqliteKvStore::new(test_pool().await);
        assert!(store.get("app", "missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_put_upserts_and_keeps_created_at() {
        let store = SqliteKvStore::new(test_pool().await);

        store.put("app", "counter", &ContextValue::Number(1.0)).await.unwrap();
        let first = store.list("app", None).await.unwrap().remove(0);
        store.put("app", "counter", &ContextValue::Number(2.0)).await.unwrap();

        let entries = store.list("app", None).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].value, ContextValue::Number(2.0));
        assert_eq!(entries[0].created_at, first.created_at);
        assert!(entries[0].updated_at >= first.updated_at);
    }

    #[tokio::test]
    async fn test_delete() {
        let store = SqliteKvStore::new(test_pool().await);

        store.put("app", "temp", &"value".into()).await.unwrap();
        assert!(store.delete("app", "temp").await.unwrap());
        assert!(!store.delete("app", "temp").await.unwrap());
        assert!(store.get("app", "temp").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_orders_by_key_and_filters_prefix() {
        let store = SqliteKvStore::new(test_pool().await);

        for key in ["user:b", "user:a", "order:1"] {
            store.put("app", key, &key.into()).await.unwrap();
        }

        let keys: Vec<String> = store
            .list("app", None)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.key)
            .collect();
        assert_eq!(keys, vec!["order:1", "user:a", "user:b"]);

        let users = store.list("app", Some("user:")).await.unwrap();
        assert_eq!(users.len(), 2);
        assert_eq!(users[0].value, ContextValue::from("user:a"));
    }

    #[tokio::test]
    async fn test_namespace_isolation() {
        let store = SqliteKvStore::new(test_pool().await);

        store.put("a", "name", &"Alice".into()).await.unwrap();
        store.put("b", "name", &"Bob".into()).await.unwrap();

        assert_eq!(store.get("a", "name").await.unwrap(), Some("Alice".into()));
        assert_eq!(store.get("b", "name").await.unwrap(), Some("Bob".into()));
        assert_eq!(store.list("a", None).await.unwrap().len(), 1);
    }
}
