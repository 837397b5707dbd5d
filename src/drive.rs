//! HTTP client for the file-store API (Drive-style) behind [`SourceProvider`].

use crate::model::{CandidateItem, ItemMetadata};
use crate::source::{ListFilter, SourceProvider};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, Url};
use serde::Deserialize;
use std::fmt;
use std::time::Duration;

const FILE_FIELDS: &str = "id,name,mimeType,size,createdTime,webContentLink,parents,trashed";

#[derive(Clone)]
pub struct DriveClient {
    http: Client,
    base_url: Url,
    token: String,
}

impl fmt::Debug for DriveClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriveClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
struct FileResource {
    id: String,
    name: String,
    #[serde(rename = "mimeType")]
    mime_type: String,
    #[serde(default)]
    size: Option<String>,
    #[serde(rename = "createdTime")]
    created_time: DateTime<Utc>,
    #[serde(rename = "webContentLink", default)]
    web_content_link: Option<String>,
    #[serde(default)]
    parents: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct FileListResponse {
    #[serde(default)]
    files: Vec<FileResource>,
}

impl DriveClient {
    pub fn new(base_url: &str, token: String, timeout: Duration) -> Result<Self> {
        let base_url = Url::parse(base_url).context("invalid file store base URL")?;
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

    /// The query string sent for a listing call. Trashed items are always
    /// excluded server-side; mime prefix and watermark are added when the
    /// filter carries them.
    fn list_query(folder: &str, filter: &ListFilter) -> String {
        let mut q = format!("'{}' in parents and trashed = false", folder);
        if let Some(prefix) = &filter.mime_prefix {
            q.push_str(&format!(" and mimeType contains '{}'", prefix));
        }
        if let Some(after) = filter.created_after {
            q.push_str(&format!(" and createdTime > '{}'", after.to_rfc3339()));
        }
        q
    }

    fn size_of(file: &FileResource) -> i64 {
        file.size
            .as_deref()
            .and_then(|s| s.parse::<i64>().ok())
            .unwrap_or(0)
    }

    async fn get_file(&self, item_id: &str) -> Result<FileResource> {
        let mut url = self
            .base_url
            .join(&format!("v3/files/{}", item_id))
            .context("invalid file store base URL")?;
        url.query_pairs_mut().append_pair("fields", FILE_FIELDS);
        let res = self
            .http
            .get(url)
            .bearer_auth(&self.token)
            .send()
            .await
            .context("failed to reach file store")?;
        if res.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(anyhow!("item {} not found", item_id));
        }
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(anyhow!("file store error {}: {}", status, body));
        }
        res.json::<FileResource>()
            .await
            .context("invalid file store response JSON")
    }
}

#[async_trait]
impl SourceProvider for DriveClient {
    async fn list(&self, folder: &str, filter: &ListFilter) -> Result<Vec<CandidateItem>> {
        let mut url = self
            .base_url
            .join("v3/files")
            .context("invalid file store base URL")?;
        url.query_pairs_mut()
            .append_pair("q", &Self::list_query(folder, filter))
            .append_pair("orderBy", "createdTime desc")
            .append_pair("fields", &format!("files({})", FILE_FIELDS));

        let res = self
            .http
            .get(url)
            .bearer_auth(&self.token)
            .send()
            .await
            .context("failed to reach file store")?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(anyhow!("file store list error {}: {}", status, body));
        }
        let payload: FileListResponse = res
            .json()
            .await
            .context("invalid file store list response")?;

        Ok(payload
            .files
            .into_iter()
            .map(|f| CandidateItem {
                size: Self::size_of(&f),
                id: f.id,
                name: f.name,
                mime_type: f.mime_type,
                created_at: f.created_time,
            })
            .collect())
    }

    async fn get_metadata(&self, item_id: &str) -> Result<ItemMetadata> {
        let f = self.get_file(item_id).await?;
        Ok(ItemMetadata {
            size: Self::size_of(&f),
            id: f.id,
            name: f.name,
            mime_type: f.mime_type,
            public_url: f.web_content_link,
            parents: f.parents,
        })
    }

    async fn move_item(&self, item_id: &str, from: &str, to: &str) -> Result<Vec<String>> {
        let mut url = self
            .base_url
            .join(&format!("v3/files/{}", item_id))
            .context("invalid file store base URL")?;
        url.query_pairs_mut()
            .append_pair("addParents", to)
            .append_pair("removeParents", from)
            .append_pair("fields", "id,parents");

        let res = self
            .http
            .patch(url)
            .bearer_auth(&self.token)
            .json(&serde_json::json!({}))
            .send()
            .await
            .context("failed to reach file store")?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(anyhow!("file store move error {}: {}", status, body));
        }

        #[derive(Deserialize)]
        struct MoveResponse {
            #[serde(default)]
            parents: Vec<String>,
        }
        let payload: MoveResponse = res
            .json()
            .await
            .context("invalid file store move response")?;
        Ok(payload.parents)
    }
}
