//! Multi-target publisher: fans one item out to every configured platform
//! target and records a per-target outcome. One target failing never stops
//! the attempts on the others.

use crate::errsink::{ErrorSink, NewErrorEntry};
use crate::model::{
    codes, Channel, Enriched, ErrorCategory, ErrorDetail, ErrorSeverity, TargetOutcome,
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::future::join_all;
use reqwest::{Client, Url};
use serde::Deserialize;
use serde_json::json;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum PublishError {
    /// The platform could not ingest the media itself. Points at a corrupt
    /// or inaccessible source file rather than a transient network problem.
    #[error("media upload failed{}", request_id.as_deref().map(|id| format!(" (request {})", id)).unwrap_or_default())]
    MediaUpload { request_id: Option<String> },
    #[error("publish rejected: {message}")]
    Api { message: String },
    #[error("transport error: {0}")]
    Transport(#[from] anyhow::Error),
}

#[async_trait]
pub trait PublishProvider: Send + Sync {
    async fn publish_one(
        &self,
        target: &str,
        media_url: &str,
        title: &str,
        description: &str,
    ) -> Result<(), PublishError>;
}

#[derive(Clone)]
pub struct PublishClient {
    http: Client,
    base_url: Url,
    token: String,
}

impl fmt::Debug for PublishClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PublishClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
struct PublishErrorBody {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    request_id: Option<String>,
}

impl PublishClient {
    pub fn new(base_url: &str, token: String, timeout: Duration) -> Result<Self> {
        let base_url = Url::parse(base_url).context("invalid publisher base URL")?;
        let http = Client::builder()
            .user_agent("postbot/0.1")
            .timeout(timeout)
            .no_proxy()
            .build()
            .context("reqwest client")?;
        Ok(Self {
            http,
            base_url,
            token,
        })
    }

    /// Map a non-success response body onto the error taxonomy. A
    /// MEDIA_UPLOAD_FAILED code from the platform is surfaced as its own
    /// variant so operators can tell bad media from a flaky network.
    fn classify(status: reqwest::StatusCode, body: &str) -> PublishError {
        if let Ok(parsed) = serde_json::from_str::<PublishErrorBody>(body) {
            if parsed.code.as_deref() == Some("MEDIA_UPLOAD_FAILED") {
                return PublishError::MediaUpload {
                    request_id: parsed.request_id,
                };
            }
            if let Some(message) = parsed.message {
                return PublishError::Api {
                    message: format!("{}: {}", status, message),
                };
            }
        }
        PublishError::Api {
            message: format!("{}: {}", status, body),
        }
    }
}

#[async_trait]
impl PublishProvider for PublishClient {
    async fn publish_one(
        &self,
        target: &str,
        media_url: &str,
        title: &str,
        description: &str,
    ) -> Result<(), PublishError> {
        let url = self
            .base_url
            .join("v1/posts")
            .context("invalid publisher base URL")?;
        let body = json!({
            "target": target,
            "media_url": media_url,
            "title": title,
            "description": description,
        });
        let res = self
            .http
            .post(url)
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await
            .context("failed to reach publish service")?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(Self::classify(status, &body));
        }
        Ok(())
    }
}

/// Publish one item to every target, never short-circuiting across targets.
/// Each failed leg gets exactly one error-sink entry, with media-class
/// failures reclassified to their own category and code.
///
/// Legs run concurrently; a slow or failing target can neither delay nor
/// prevent the attempts on the others. Outcomes come back in target order.
pub async fn fan_out(
    provider: &dyn PublishProvider,
    sink: &dyn ErrorSink,
    channel: &Channel,
    item_id: &str,
    media_url: &str,
    content: &Enriched,
) -> Result<Vec<TargetOutcome>> {
    let legs = channel.targets.iter().map(|target| async move {
        let res = provider
            .publish_one(target, media_url, &content.title, &content.description)
            .await;
        (target, res)
    });

    let mut outcomes = Vec::with_capacity(channel.targets.len());
    for (target, res) in join_all(legs).await {
        match res {
            Ok(()) => {
                info!(target = %target, item_id, "published");
                outcomes.push(TargetOutcome {
                    target: target.clone(),
                    success: true,
                    error: None,
                });
            }
            Err(err) => {
                warn!(target = %target, item_id, %err, "publish leg failed");
                let (category, code, request_id) = match &err {
                    PublishError::MediaUpload { request_id } => (
                        ErrorCategory::MediaUpload,
                        codes::MEDIA_UPLOAD_FAILED,
                        request_id.clone(),
                    ),
                    _ => (ErrorCategory::Publish, codes::PUBLISH_FAILED, None),
                };
                sink.record(NewErrorEntry {
                    owner_id: channel.owner_id.clone(),
                    channel_id: Some(channel.id.clone()),
                    category,
                    severity: ErrorSeverity::Error,
                    code,
                    message: format!("target '{}': {}", target, err),
                    detail: ErrorDetail::Publish {
                        target: target.clone(),
                        item_id: item_id.to_string(),
                        request_id,
                    },
                })
                .await?;
                outcomes.push(TargetOutcome {
                    target: target.clone(),
                    success: false,
                    error: Some(err.to_string()),
                });
            }
        }
    }
    Ok(outcomes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_media_upload_keeps_request_id() {
        let err = PublishClient::classify(
            reqwest::StatusCode::UNPROCESSABLE_ENTITY,
            r#"{"code":"MEDIA_UPLOAD_FAILED","request_id":"req-42"}"#,
        );
        match err {
            PublishError::MediaUpload { request_id } => {
                assert_eq!(request_id.as_deref(), Some("req-42"));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn classify_api_error_uses_message() {
        let err = PublishClient::classify(
            reqwest::StatusCode::BAD_REQUEST,
            r#"{"code":"INVALID_TARGET","message":"unknown account"}"#,
        );
        match err {
            PublishError::Api { message } => assert!(message.contains("unknown account")),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn classify_unparseable_body_falls_back() {
        let err = PublishClient::classify(reqwest::StatusCode::BAD_GATEWAY, "<html>oops</html>");
        match err {
            PublishError::Api { message } => assert!(message.contains("502")),
            other => panic!("unexpected: {:?}", other),
        }
    }
}
