// Portfolio document store - one JSON-document table per collection
// Every function runs on a single checked-out connection supplied by the caller

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::sqlite::{SqliteConnection, SqliteRow};
use sqlx::Row;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{Record, Resource, TABLES};

/// Connection the store runs statements on; `record_query` is called once per statement
pub trait StoreConnection: Send {
    fn connection(&mut self) -> &mut SqliteConnection;

    fn record_query(&self) {}
}

impl StoreConnection for SqliteConnection {
    fn connection(&mut self) -> &mut SqliteConnection {
        self
    }
}

fn executor(conn: &mut impl StoreConnection) -> &mut SqliteConnection {
    conn.record_query();
    conn.connection()
}

/// Create every collection table if missing
pub async fn ensure_schema(conn: &mut SqliteConnection) -> AppResult<()> {
    for table in TABLES {
        sqlx::query(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {table} (
                id TEXT PRIMARY KEY,
                data TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#
        ))
        .execute(&mut *conn)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to create table {}: {}", table, e)))?;
    }
    Ok(())
}

fn decode<R: Resource>(row: SqliteRow) -> AppResult<Record<R>> {
    let data: String = row.try_get("data")?;
    Ok(Record {
        id: row.try_get("id")?,
        data: serde_json::from_str(&data)?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
        updated_at: row.try_get::<DateTime<Utc>, _>("updated_at")?,
    })
}

pub async fn list<R: Resource>(conn: &mut impl StoreConnection) -> AppResult<Vec<Record<R>>> {
    let rows = sqlx::query(&format!(
        "SELECT id, data, created_at, updated_at FROM {} ORDER BY rowid",
        R::TABLE
    ))
    .fetch_all(executor(conn))
    .await?;

    rows.into_iter().map(decode::<R>).collect()
}

/// Records whose top-level JSON `field` equals `value`
pub async fn list_where<R: Resource>(
    conn: &mut impl StoreConnection,
    field: &str,
    value: &str,
) -> AppResult<Vec<Record<R>>> {
    let rows = sqlx::query(&format!(
        "SELECT id, data, created_at, updated_at FROM {} \
         WHERE json_extract(data, ?) = ? ORDER BY rowid",
        R::TABLE
    ))
    .bind(format!("$.{}", field))
    .bind(value)
    .fetch_all(executor(conn))
    .await?;

    rows.into_iter().map(decode::<R>).collect()
}

pub async fn get<R: Resource>(
    conn: &mut impl StoreConnection,
    id: &str,
) -> AppResult<Option<Record<R>>> {
    let row = sqlx::query(&format!(
        "SELECT id, data, created_at, updated_at FROM {} WHERE id = ?",
        R::TABLE
    ))
    .bind(id)
    .fetch_optional(executor(conn))
    .await?;

    row.map(decode::<R>).transpose()
}

/// Oldest record of a collection; used for singletons such as personal info
pub async fn first<R: Resource>(conn: &mut impl StoreConnection) -> AppResult<Option<Record<R>>> {
    let row = sqlx::query(&format!(
        "SELECT id, data, created_at, updated_at FROM {} ORDER BY rowid LIMIT 1",
        R::TABLE
    ))
    .fetch_optional(executor(conn))
    .await?;

    row.map(decode::<R>).transpose()
}

pub async fn count<R: Resource>(conn: &mut impl StoreConnection) -> AppResult<i64> {
    let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", R::TABLE))
        .fetch_one(executor(conn))
        .await?;
    Ok(count)
}

pub async fn insert<R: Resource>(conn: &mut impl StoreConnection, data: R) -> AppResult<Record<R>> {
    let now = Utc::now();
    let record = Record {
        id: Uuid::new_v4().to_string(),
        data,
        created_at: now,
        updated_at: now,
    };

    sqlx::query(&format!(
        "INSERT INTO {} (id, data, created_at, updated_at) VALUES (?, ?, ?, ?)",
        R::TABLE
    ))
    .bind(&record.id)
    .bind(serde_json::to_string(&record.data)?)
    .bind(record.created_at)
    .bind(record.updated_at)
    .execute(executor(conn))
    .await?;

    Ok(record)
}

/// Apply a partial update; only fields present in the patch change
pub async fn update<R: Resource>(
    conn: &mut impl StoreConnection,
    id: &str,
    patch: &R::Patch,
) -> AppResult<Option<Record<R>>> {
    let Some(mut record) = get::<R>(&mut *conn, id).await? else {
        return Ok(None);
    };

    record.data = merge_patch(&record.data, patch)?;
    record.updated_at = Utc::now();

    sqlx::query(&format!(
        "UPDATE {} SET data = ?, updated_at = ? WHERE id = ?",
        R::TABLE
    ))
    .bind(serde_json::to_string(&record.data)?)
    .bind(record.updated_at)
    .bind(id)
    .execute(executor(conn))
    .await?;

    Ok(Some(record))
}

pub async fn delete<R: Resource>(conn: &mut impl StoreConnection, id: &str) -> AppResult<bool> {
    let result = sqlx::query(&format!("DELETE FROM {} WHERE id = ?", R::TABLE))
        .bind(id)
        .execute(executor(conn))
        .await?;
    Ok(result.rows_affected() > 0)
}

fn merge_patch<R: Resource>(current: &R, patch: &R::Patch) -> AppResult<R> {
    let mut merged = serde_json::to_value(current)?;
    let changes = serde_json::to_value(patch)?;

    match (&mut merged, changes) {
        (Value::Object(fields), Value::Object(changes)) => {
            for (key, value) in changes {
                fields.insert(key, value);
            }
        }
        _ => {
            return Err(AppError::Internal(format!(
                "{} records must serialize as JSON objects",
                R::LABEL
            )))
        }
    }

    serde_json::from_value(merged).map_err(|e| AppError::Validation(e.to_string()))
}
