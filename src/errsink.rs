//! Durable, queryable record of pipeline failures.
//!
//! Every terminal failure path in the pipeline ends in exactly one
//! [`ErrorSink::record`] call; nothing is silently dropped. Detail payloads
//! are redacted of credential-shaped fields before they hit storage.

use crate::db::{self, Pool};
use crate::model::{ErrorCategory, ErrorDetail, ErrorSeverity};
use anyhow::Result;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use serde_json::Value;
use tracing::instrument;

/// Keys containing any of these terms (case-insensitive) are redacted.
static SENSITIVE_TERMS: Lazy<Vec<&'static str>> =
    Lazy::new(|| vec!["password", "token", "secret", "key", "auth"]);

const REDACTED: &str = "[REDACTED]";

/// One failure to record. `channel_id` is absent for failures that cannot be
/// attributed to a single channel.
#[derive(Debug, Clone)]
pub struct NewErrorEntry {
    pub owner_id: String,
    pub channel_id: Option<String>,
    pub category: ErrorCategory,
    pub severity: ErrorSeverity,
    pub code: &'static str,
    pub message: String,
    pub detail: ErrorDetail,
}

#[async_trait]
pub trait ErrorSink: Send + Sync {
    async fn record(&self, entry: NewErrorEntry) -> Result<()>;
}

pub struct SqliteErrorSink {
    pool: Pool,
}

impl SqliteErrorSink {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ErrorSink for SqliteErrorSink {
    #[instrument(skip_all, fields(code = entry.code))]
    async fn record(&self, entry: NewErrorEntry) -> Result<()> {
        let detail = redact_detail(&entry.detail)?;
        db::insert_error(
            &self.pool,
            &entry.owner_id,
            entry.channel_id.as_deref(),
            entry.category,
            entry.severity,
            entry.code,
            &entry.message,
            &detail,
        )
        .await?;
        Ok(())
    }
}

/// Redact a detail payload by round-tripping through JSON. Keeps the tagged
/// structure intact; only leaf values under sensitive keys are replaced.
fn redact_detail(detail: &ErrorDetail) -> Result<ErrorDetail> {
    let mut value = serde_json::to_value(detail)?;
    redact_value(&mut value);
    Ok(serde_json::from_value(value)?)
}

fn is_sensitive(field: &str) -> bool {
    let lower = field.to_ascii_lowercase();
    SENSITIVE_TERMS.iter().any(|term| lower.contains(term))
}

/// Recursively replace values stored under sensitive keys, including inside
/// nested objects and arrays of objects.
pub fn redact_value(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for (k, v) in map.iter_mut() {
                if is_sensitive(k) {
                    *v = Value::String(REDACTED.to_string());
                } else {
                    redact_value(v);
                }
            }
        }
        Value::Array(items) => {
            for item in items.iter_mut() {
                redact_value(item);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::codes;
    use serde_json::json;

    #[test]
    fn redacts_nested_sensitive_keys() {
        let mut v = json!({
            "password": "x",
            "nested": { "token": "y" },
            "plain": "keep"
        });
        redact_value(&mut v);
        assert_eq!(
            v,
            json!({
                "password": "[REDACTED]",
                "nested": { "token": "[REDACTED]" },
                "plain": "keep"
            })
        );
    }

    #[test]
    fn redacts_inside_arrays_and_compound_keys() {
        let mut v = json!({
            "attempts": [
                { "api_key": "k1", "status": 500 },
                { "authorization": "Bearer abc", "status": 403 }
            ]
        });
        redact_value(&mut v);
        assert_eq!(v["attempts"][0]["api_key"], "[REDACTED]");
        assert_eq!(v["attempts"][0]["status"], 500);
        assert_eq!(v["attempts"][1]["authorization"], "[REDACTED]");
    }

    #[test]
    fn detail_escape_hatch_is_redacted() {
        let mut map = serde_json::Map::new();
        map.insert("upstream_secret".into(), json!("shh"));
        map.insert("request_id".into(), json!("req-1"));
        let redacted = redact_detail(&ErrorDetail::Other(map)).unwrap();
        match redacted {
            ErrorDetail::Other(m) => {
                assert_eq!(m["upstream_secret"], "[REDACTED]");
                assert_eq!(m["request_id"], "req-1");
            }
            other => panic!("unexpected variant: {:?}", other),
        }
    }

    #[tokio::test]
    async fn sink_persists_redacted_detail() {
        let pool = sqlx::SqlitePool::connect("sqlite::memory:").await.unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();
        let sink = SqliteErrorSink::new(pool.clone());

        let mut map = serde_json::Map::new();
        map.insert("password".into(), json!("x"));
        map.insert("nested".into(), json!({ "token": "y" }));
        sink.record(NewErrorEntry {
            owner_id: "user-1".into(),
            channel_id: Some("ch1".into()),
            category: ErrorCategory::Publish,
            severity: ErrorSeverity::Error,
            code: codes::PUBLISH_FAILED,
            message: "post rejected".into(),
            detail: ErrorDetail::Other(map),
        })
        .await
        .unwrap();

        let rows = db::recent_errors(&pool, "user-1", 10).await.unwrap();
        assert_eq!(rows.len(), 1);
        let stored: Value = serde_json::from_str(&rows[0].detail).unwrap();
        assert_eq!(stored["password"], "[REDACTED]");
        assert_eq!(stored["nested"]["token"], "[REDACTED]");
    }
}
