use crate::model::{ErrorCategory, ErrorDetail, ErrorSeverity};
use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use std::borrow::Cow;
use tracing::instrument;
use uuid::Uuid;

pub type Pool = SqlitePool;

pub async fn init_pool(database_url: &str) -> Result<Pool> {
    let normalized = prepare_sqlite_url(database_url);
    let pool = SqlitePool::connect(&normalized).await?;
    // Enable WAL and stricter durability; the dedup table must survive crashes.
    sqlx::query("PRAGMA journal_mode=WAL;")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA synchronous=FULL;")
        .execute(&pool)
        .await?;
    Ok(pool)
}

/// Normalize a file-backed sqlite URL before connecting: expand a leading
/// `~/` and create the parent directory so a first run on a fresh data dir
/// does not fail. Non-sqlite and in-memory URLs pass through untouched.
fn prepare_sqlite_url(url: &str) -> Cow<'_, str> {
    let Some(raw) = url.strip_prefix("sqlite:") else {
        return Cow::Borrowed(url);
    };
    if raw.starts_with(":memory") {
        return Cow::Borrowed(url);
    }

    let raw = raw.strip_prefix("//").unwrap_or(raw);
    let (path, query) = match raw.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (raw, None),
    };
    if path.is_empty() {
        return Cow::Borrowed(url);
    }

    let path = expand_home(path);
    if let Some(parent) = std::path::Path::new(path.as_ref()).parent() {
        if !parent.as_os_str().is_empty() {
            let _ = std::fs::create_dir_all(parent);
        }
    }

    match query {
        Some(q) => Cow::Owned(format!("sqlite://{path}?{q}")),
        None => Cow::Owned(format!("sqlite://{path}")),
    }
}

fn expand_home(path: &str) -> Cow<'_, str> {
    match (path.strip_prefix("~/"), std::env::var("HOME")) {
        (Some(rest), Ok(home)) => Cow::Owned(format!("{}/{}", home.trim_end_matches('/'), rest)),
        _ => Cow::Borrowed(path),
    }
}

pub async fn run_migrations(pool: &Pool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Durable read of the dedup table.
#[instrument(skip_all)]
pub async fn has_processed(pool: &Pool, channel_id: &str, item_id: &str) -> Result<bool> {
    let row = sqlx::query_scalar::<_, i64>(
        "SELECT 1 FROM processed_items WHERE channel_id = ? AND item_id = ?",
    )
    .bind(channel_id)
    .bind(item_id)
    .fetch_optional(pool)
    .await?;
    Ok(row.is_some())
}

/// Durable write of a dedup record. Idempotent: re-marking an already
/// processed pair is a no-op.
#[instrument(skip_all)]
pub async fn mark_processed(pool: &Pool, channel_id: &str, item_id: &str) -> Result<()> {
    sqlx::query(
        "INSERT INTO processed_items (channel_id, item_id) VALUES (?, ?) \
         ON CONFLICT (channel_id, item_id) DO NOTHING",
    )
    .bind(channel_id)
    .bind(item_id)
    .execute(pool)
    .await?;
    Ok(())
}

/// One row of the error log as read back by the reporting surface.
#[derive(Debug, Clone)]
pub struct ErrorRow {
    pub id: String,
    pub owner_id: String,
    pub channel_id: Option<String>,
    pub category: String,
    pub severity: String,
    pub code: String,
    pub message: String,
    pub detail: String,
    pub created_at: DateTime<Utc>,
    pub resolved: bool,
}

#[instrument(skip_all)]
pub async fn insert_error(
    pool: &Pool,
    owner_id: &str,
    channel_id: Option<&str>,
    category: ErrorCategory,
    severity: ErrorSeverity,
    code: &str,
    message: &str,
    detail: &ErrorDetail,
) -> Result<String> {
    let id = Uuid::new_v4().to_string();
    let detail_json = serde_json::to_string(detail)?;
    sqlx::query(
        "INSERT INTO error_log (id, owner_id, channel_id, category, severity, code, message, detail) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(owner_id)
    .bind(channel_id)
    .bind(category.as_str())
    .bind(severity.as_str())
    .bind(code)
    .bind(message)
    .bind(detail_json)
    .execute(pool)
    .await?;
    Ok(id)
}

/// Most recent unresolved entries for an owner, newest first.
#[instrument(skip_all)]
pub async fn recent_errors(pool: &Pool, owner_id: &str, limit: i64) -> Result<Vec<ErrorRow>> {
    let rows = sqlx::query(
        "SELECT id, owner_id, channel_id, category, severity, code, message, detail, created_at, resolved \
         FROM error_log WHERE owner_id = ? AND resolved = 0 \
         ORDER BY created_at DESC LIMIT ?",
    )
    .bind(owner_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| ErrorRow {
            id: row.get("id"),
            owner_id: row.get("owner_id"),
            channel_id: row.get("channel_id"),
            category: row.get("category"),
            severity: row.get("severity"),
            code: row.get("code"),
            message: row.get("message"),
            detail: row.get("detail"),
            created_at: row.get("created_at"),
            resolved: row.get::<i64, _>("resolved") != 0,
        })
        .collect())
}

/// Operator action: entries are flagged, never deleted.
#[instrument(skip_all)]
pub async fn mark_resolved(pool: &Pool, entry_id: &str) -> Result<bool> {
    let res = sqlx::query("UPDATE error_log SET resolved = 1 WHERE id = ?")
        .bind(entry_id)
        .execute(pool)
        .await?;
    Ok(res.rows_affected() > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::codes;

    async fn setup_pool() -> Pool {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();
        pool
    }

    #[test]
    fn sqlite_url_passthrough() {
        assert_eq!(prepare_sqlite_url("sqlite::memory:"), "sqlite::memory:");
        assert_eq!(prepare_sqlite_url("postgres://x/y"), "postgres://x/y");
        assert!(matches!(
            prepare_sqlite_url("sqlite::memory:?cache=shared"),
            Cow::Borrowed(_)
        ));
    }

    #[test]
    fn sqlite_url_rebuilds_file_paths_and_creates_parent() {
        let td = tempfile::tempdir().unwrap();
        let p = td.path().join("nested").join("postbot.db");
        let url = format!("sqlite://{}?mode=rwc", p.display());
        let out = prepare_sqlite_url(&url);
        assert_eq!(out, url);
        assert!(p.parent().unwrap().exists());
    }

    #[tokio::test]
    async fn dedup_roundtrip_and_idempotent_mark() {
        let pool = setup_pool().await;
        assert!(!has_processed(&pool, "ch1", "item1").await.unwrap());

        mark_processed(&pool, "ch1", "item1").await.unwrap();
        assert!(has_processed(&pool, "ch1", "item1").await.unwrap());
        // Same item under another channel is independent.
        assert!(!has_processed(&pool, "ch2", "item1").await.unwrap());

        // Double-mark must not error.
        mark_processed(&pool, "ch1", "item1").await.unwrap();
        let cnt: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM processed_items")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(cnt, 1);
    }

    #[tokio::test]
    async fn error_log_insert_query_resolve() {
        let pool = setup_pool().await;
        let id = insert_error(
            &pool,
            "user-1",
            Some("ch1"),
            ErrorCategory::Validation,
            ErrorSeverity::Warning,
            codes::EMPTY_FILE,
            "file is empty",
            &ErrorDetail::Validation {
                item_id: "f1".into(),
                item_name: "clip.mp4".into(),
                size: 0,
                mime_type: "video/mp4".into(),
            },
        )
        .await
        .unwrap();

        let rows = recent_errors(&pool, "user-1", 10).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].code, codes::EMPTY_FILE);
        assert_eq!(rows[0].severity, "warning");
        assert!(!rows[0].resolved);

        assert!(mark_resolved(&pool, &id).await.unwrap());
        let rows = recent_errors(&pool, "user-1", 10).await.unwrap();
        assert!(rows.is_empty());

        // Row still exists, only flagged.
        let cnt: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM error_log")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(cnt, 1);
    }
}
