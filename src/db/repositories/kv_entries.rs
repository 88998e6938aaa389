use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{params, OptionalExtension};

use crate::db::Database;

impl Database {
    pub async fn get_value(&self, key: &str) -> Result<Option<String>> {
        let key = key.to_string();
        self.execute(move |conn| {
            let value = conn
                .query_row(
                    "SELECT value FROM kv_entries WHERE key = ?1",
                    params![key],
                    |row| row.get::<_, String>(0),
                )
                .optional()
                .with_context(|| format!("failed to read key {key}"))?;
            Ok(value)
        })
        .await
    }

    pub async fn set_value(&self, key: &str, value: String) -> Result<()> {
        let key = key.to_string();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO kv_entries (key, value, updated_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET
                     value = excluded.value,
                     updated_at = excluded.updated_at",
                params![key, value, Utc::now().to_rfc3339()],
            )
            .with_context(|| format!("failed to write key {key}"))?;
            Ok(())
        })
        .await
    }

    pub async fn delete_value(&self, key: &str) -> Result<()> {
        let key = key.to_string();
        self.execute(move |conn| {
            conn.execute("DELETE FROM kv_entries WHERE key = ?1", params![key])
                .with_context(|| format!("failed to delete key {key}"))?;
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn values_round_trip_and_upsert() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(dir.path().join("nested").join("store.sqlite3")).unwrap();

        assert_eq!(db.get_value("missing").await.unwrap(), None);

        db.set_value("counter", "1".into()).await.unwrap();
        db.set_value("counter", "2".into()).await.unwrap();
        assert_eq!(db.get_value("counter").await.unwrap().as_deref(), Some("2"));

        db.set_value("session", "{}".into()).await.unwrap();
        assert_eq!(db.get_value("session").await.unwrap().as_deref(), Some("{}"));

        db.delete_value("counter").await.unwrap();
        assert_eq!(db.get_value("counter").await.unwrap(), None);
    }

    #[tokio::test]
    async fn values_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.sqlite3");
        {
            let db = Database::new(path.clone()).unwrap();
            db.set_value("session", "{\"a\":1}".into()).await.unwrap();
        }
        let reopened = Database::new(path).unwrap();
        assert_eq!(
            reopened.get_value("session").await.unwrap().as_deref(),
            Some("{\"a\":1}")
        );
    }
}
