// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! SQL record store (authoritative).
//!
//! ```sql
//! CREATE TABLE records (
//!   id VARCHAR(64) PRIMARY KEY,
//!   name TEXT NOT NULL,
//!   content LONGTEXT,
//!   created_date BIGINT NOT NULL,       -- epoch millis, set on first save
//!   last_modified_date BIGINT NOT NULL  -- epoch millis, set on every save
//! )
//! ```
//!
//! ## sqlx Any Driver Quirks
//!
//! The `Any` driver hands MySQL TEXT/LONGTEXT columns back as BLOB, so
//! string columns are read as `String` first and `Vec<u8>` second.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{any::AnyPoolOptions, any::AnyRow, AnyPool, Row};
use std::sync::Once;
use std::time::Duration;
use tracing::{debug, info};

use super::new_record_id;
use super::traits::{RecordStore, StorageError};
use crate::record::{now_millis, Page, PageRequest, Record};
use crate::resilience::retry::{retry, RetryConfig};

// SQLx `Any` driver requires runtime installation
static INSTALL_DRIVERS: Once = Once::new();

fn install_drivers() {
    INSTALL_DRIVERS.call_once(|| {
        sqlx::any::install_default_drivers();
    });
}

const SELECT_COLUMNS: &str = "id, name, content, created_date, last_modified_date";

pub struct SqlRecordStore {
    pool: AnyPool,
    is_sqlite: bool,
}

impl SqlRecordStore {
    /// Connect with startup-mode retry (fails fast if config is wrong) and
    /// create the schema if needed.
    pub async fn new(connection_string: &str) -> Result<Self, StorageError> {
        install_drivers();

        let is_sqlite = connection_string.starts_with("sqlite:");

        let pool = retry("sql_connect", &RetryConfig::startup(), || async {
            AnyPoolOptions::new()
                .max_connections(20)
                .acquire_timeout(Duration::from_secs(10))
                .idle_timeout(Duration::from_secs(300))
                .connect(connection_string)
                .await
                .map_err(|e| StorageError::Connection(e.to_string()))
        })
        .await?;

        let store = Self { pool, is_sqlite };

        if is_sqlite {
            store.enable_wal_mode().await?;
        }

        store.init_schema().await?;
        info!(sqlite = is_sqlite, "SQL record store ready");
        Ok(store)
    }

    /// Enable WAL mode for SQLite so readers don't block the writer.
    async fn enable_wal_mode(&self) -> Result<(), StorageError> {
        sqlx::query("PRAGMA journal_mode = WAL")
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(format!("Failed to enable WAL mode: {}", e)))?;

        sqlx::query("PRAGMA synchronous = NORMAL")
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(format!("Failed to set synchronous mode: {}", e)))?;

        Ok(())
    }

    async fn init_schema(&self) -> Result<(), StorageError> {
        let sql = if self.is_sqlite {
            r#"
            CREATE TABLE IF NOT EXISTS records (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                content TEXT,
                created_date INTEGER NOT NULL,
                last_modified_date INTEGER NOT NULL
            )
            "#
        } else {
            r#"
            CREATE TABLE IF NOT EXISTS records (
                id VARCHAR(64) PRIMARY KEY,
                name TEXT NOT NULL,
                content LONGTEXT,
                created_date BIGINT NOT NULL,
                last_modified_date BIGINT NOT NULL
            )
            "#
        };

        retry("sql_init_schema", &RetryConfig::startup(), || async {
            sqlx::query(sql)
                .execute(&self.pool)
                .await
                .map_err(|e| StorageError::Backend(e.to_string()))?;
            Ok(())
        })
        .await
    }

    fn upsert_sql(&self) -> &'static str {
        // created_date is never overwritten by a later save
        if self.is_sqlite {
            "INSERT INTO records (id, name, content, created_date, last_modified_date)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                content = excluded.content,
                last_modified_date = excluded.last_modified_date"
        } else {
            "INSERT INTO records (id, name, content, created_date, last_modified_date)
             VALUES (?, ?, ?, ?, ?)
             ON DUPLICATE KEY UPDATE
                name = VALUES(name),
                content = VALUES(content),
                last_modified_date = VALUES(last_modified_date)"
        }
    }
}

/// Read a text column, accepting the BLOB the MySQL `Any` driver returns.
fn read_text(row: &AnyRow, column: &str) -> Result<Option<String>, StorageError> {
    if let Ok(value) = row.try_get::<Option<String>, _>(column) {
        return Ok(value);
    }
    let bytes: Option<Vec<u8>> = row
        .try_get(column)
        .map_err(|e| StorageError::Backend(format!("{}: {}", column, e)))?;
    bytes
        .map(|b| String::from_utf8(b).map_err(|e| StorageError::Backend(format!("{}: {}", column, e))))
        .transpose()
}

fn read_millis(row: &AnyRow, column: &str) -> Result<DateTime<Utc>, StorageError> {
    let millis: i64 = row
        .try_get(column)
        .map_err(|e| StorageError::Backend(format!("{}: {}", column, e)))?;
    DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| StorageError::Backend(format!("{}: timestamp out of range: {}", column, millis)))
}

fn record_from_row(row: &AnyRow) -> Result<Record, StorageError> {
    let id = read_text(row, "id")?.ok_or_else(|| StorageError::Backend("row without id".into()))?;
    let name = read_text(row, "name")?.unwrap_or_default();

    Ok(Record {
        id: Some(id),
        name,
        content: read_text(row, "content")?,
        created_date: Some(read_millis(row, "created_date")?),
        last_modified_date: Some(read_millis(row, "last_modified_date")?),
    })
}

#[async_trait]
impl RecordStore for SqlRecordStore {
    async fn get(&self, id: &str) -> Result<Option<Record>, StorageError> {
        let sql = format!("SELECT {} FROM records WHERE id = ?", SELECT_COLUMNS);
        let row = retry("sql_get", &RetryConfig::query(), || async {
            sqlx::query(&sql)
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| StorageError::Backend(e.to_string()))
        })
        .await?;

        row.as_ref().map(record_from_row).transpose()
    }

    async fn save(&self, record: &Record) -> Result<Record, StorageError> {
        let id = record.id.clone().unwrap_or_else(new_record_id);
        let now = now_millis().timestamp_millis();
        let sql = self.upsert_sql();

        retry("sql_save", &RetryConfig::query(), || async {
            sqlx::query(sql)
                .bind(&id)
                .bind(&record.name)
                .bind(record.content.as_deref())
                .bind(now)
                .bind(now)
                .execute(&self.pool)
                .await
                .map_err(|e| StorageError::Backend(e.to_string()))?;
            Ok(())
        })
        .await?;

        debug!(id = %id, "Saved record");

        // Read back so created_date reflects the first save
        self.get(&id)
            .await?
            .ok_or_else(|| StorageError::Backend(format!("record '{}' vanished after save", id)))
    }

    async fn exists(&self, id: &str) -> Result<bool, StorageError> {
        retry("sql_exists", &RetryConfig::query(), || async {
            let result = sqlx::query("SELECT 1 FROM records WHERE id = ? LIMIT 1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| StorageError::Backend(e.to_string()))?;
            Ok(result.is_some())
        })
        .await
    }

    async fn delete(&self, id: &str) -> Result<(), StorageError> {
        retry("sql_delete", &RetryConfig::query(), || async {
            sqlx::query("DELETE FROM records WHERE id = ?")
                .bind(id)
                .execute(&self.pool)
                .await
                .map_err(|e| StorageError::Backend(e.to_string()))?;
            Ok(())
        })
        .await
    }

    async fn list_all(&self, page: PageRequest) -> Result<Page<Record>, StorageError> {
        let count = sqlx::query("SELECT COUNT(*) as cnt FROM records")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        let total: i64 = count
            .try_get("cnt")
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        let sql = format!("SELECT {} FROM records ORDER BY id LIMIT ? OFFSET ?", SELECT_COLUMNS);
        let rows = sqlx::query(&sql)
            .bind(i64::try_from(page.size).unwrap_or(i64::MAX))
            .bind(i64::try_from(page.offset()).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        let content = rows.iter().map(record_from_row).collect::<Result<Vec<_>, _>>()?;
        Ok(Page::new(content, page, total.max(0) as u64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn temp_db_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("catalog_sql_{}_{}.db", name, uuid::Uuid::new_v4()))
    }

    /// Clean up SQLite database and its WAL files
    fn cleanup_db(path: &PathBuf) {
        let _ = std::fs::remove_file(path);
        let _ = std::fs::remove_file(format!("{}-wal", path.display()));
        let _ = std::fs::remove_file(format!("{}-shm", path.display()));
    }

    async fn open(path: &PathBuf) -> SqlRecordStore {
        let url = format!("sqlite://{}?mode=rwc", path.display());
        SqlRecordStore::new(&url).await.unwrap()
    }

    #[tokio::test]
    async fn test_save_assigns_id_and_dates() {
        let db_path = temp_db_path("assign");
        let store = open(&db_path).await;

        let saved = store.save(&Record::new("Lamp").with_content("40W")).await.unwrap();
        let id = saved.id.clone().unwrap();

        assert!(saved.created_date.is_some());
        assert_eq!(saved.created_date, saved.last_modified_date);
        assert_eq!(store.get(&id).await.unwrap(), Some(saved));

        cleanup_db(&db_path);
    }

    #[tokio::test]
    async fn test_resave_keeps_created_date() {
        let db_path = temp_db_path("resave");
        let store = open(&db_path).await;

        let first = store.save(&Record::new("Lamp")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;

        let mut changed = first.clone();
        changed.name = "Desk lamp".into();
        changed.content = Some("LED".into());
        let second = store.save(&changed).await.unwrap();

        assert_eq!(second.id, first.id);
        assert_eq!(second.created_date, first.created_date);
        assert!(second.last_modified_date > first.last_modified_date);
        assert_eq!(second.name, "Desk lamp");
        assert_eq!(second.content.as_deref(), Some("LED"));

        cleanup_db(&db_path);
    }

    #[tokio::test]
    async fn test_null_content_round_trips() {
        let db_path = temp_db_path("null_content");
        let store = open(&db_path).await;

        let saved = store.save(&Record::new("Bare").with_content("x")).await.unwrap();
        let mut cleared = saved.clone();
        cleared.content = None;
        let saved = store.save(&cleared).await.unwrap();

        assert!(saved.content.is_none());

        cleanup_db(&db_path);
    }

    #[tokio::test]
    async fn test_exists_and_delete() {
        let db_path = temp_db_path("delete");
        let store = open(&db_path).await;

        let id = store.save(&Record::new("Gone soon")).await.unwrap().id.unwrap();
        assert!(store.exists(&id).await.unwrap());

        store.delete(&id).await.unwrap();
        assert!(!store.exists(&id).await.unwrap());
        assert!(store.get(&id).await.unwrap().is_none());

        // Deleting again is fine
        store.delete(&id).await.unwrap();

        cleanup_db(&db_path);
    }

    #[tokio::test]
    async fn test_list_all_pages_by_id() {
        let db_path = temp_db_path("list");
        let store = open(&db_path).await;

        for i in 0..5 {
            store
                .save(&Record::new(format!("Item {i}")).with_id(format!("r-{i}")))
                .await
                .unwrap();
        }

        let page = store.list_all(PageRequest::new(1, 2)).await.unwrap();
        assert_eq!(page.total, 5);
        let ids: Vec<_> = page.content.iter().filter_map(|r| r.id()).collect();
        assert_eq!(ids, vec!["r-2", "r-3"]);

        let tail = store.list_all(PageRequest::new(2, 2)).await.unwrap();
        assert_eq!(tail.content.len(), 1);
        assert!(!tail.has_next());

        cleanup_db(&db_path);
    }

    #[tokio::test]
    async fn test_list_all_far_past_the_end_is_empty() {
        let db_path = temp_db_path("far_page");
        let store = open(&db_path).await;
        store.save(&Record::new("Only")).await.unwrap();

        let page = store.list_all(PageRequest::new(usize::MAX, 50)).await.unwrap();
        assert_eq!(page.total, 1);
        assert!(page.content.is_empty());
        assert!(!page.has_next());

        cleanup_db(&db_path);
    }

    #[tokio::test]
    async fn test_schema_survives_reopen() {
        let db_path = temp_db_path("reopen");
        let id = {
            let store = open(&db_path).await;
            store.save(&Record::new("Durable")).await.unwrap().id.unwrap()
        };

        let store = open(&db_path).await;
        assert_eq!(store.get(&id).await.unwrap().unwrap().name, "Durable");

        cleanup_db(&db_path);
    }
}
