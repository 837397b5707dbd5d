//! Content enrichment: an opaque, potentially slow external text generator.

use crate::model::{ContentRules, Enriched};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::{Client, Url};
use serde::Deserialize;
use serde_json::json;
use std::fmt;
use std::time::Duration;

/// Hard cap applied locally after every enrichment call; platform title
/// limits are never trusted to the provider.
pub const MAX_TITLE_LEN: usize = 100;

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

#[async_trait]
pub trait EnrichmentProvider: Send + Sync {
    async fn generate(&self, item_name: &str, rules: &ContentRules) -> Result<Enriched>;
}

#[derive(Clone)]
pub struct EnrichmentClient {
    http: Client,
    base_url: Url,
    token: String,
}

impl fmt::Debug for EnrichmentClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnrichmentClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl EnrichmentClient {
    pub fn new(base_url: &str, token: String, timeout: Duration) -> Result<Self> {
        let base_url = Url::parse(base_url).context("invalid enrichment base URL")?;
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
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    title: String,
    description: String,
}

#[async_trait]
impl EnrichmentProvider for EnrichmentClient {
    async fn generate(&self, item_name: &str, rules: &ContentRules) -> Result<Enriched> {
        let url = self
            .base_url
            .join("v1/generate")
            .context("invalid enrichment base URL")?;
        let body = json!({
            "item_name": item_name,
            "language": rules.language,
            "tone": rules.tone,
            "constraints": rules.constraints,
        });
        let res = self
            .http
            .post(url)
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await
            .context("failed to reach enrichment service")?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(anyhow!("enrichment error {}: {}", status, body));
        }
        let payload: GenerateResponse = res
            .json()
            .await
            .context("invalid enrichment response JSON")?;
        Ok(Enriched {
            title: payload.title,
            description: payload.description,
        })
    }
}

/// Normalize a provider-supplied title: collapse internal whitespace, trim,
/// and cut at [`MAX_TITLE_LEN`] characters on a char boundary.
pub fn normalize_title(raw: &str) -> String {
    let collapsed = WHITESPACE.replace_all(raw, " ");
    let trimmed = collapsed.trim();
    if trimmed.chars().count() <= MAX_TITLE_LEN {
        return trimmed.to_string();
    }
    trimmed.chars().take(MAX_TITLE_LEN).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collapses_whitespace_and_trims() {
        assert_eq!(normalize_title("  a\n\tlong   title  "), "a long title");
    }

    #[test]
    fn caps_title_length() {
        let raw = "x".repeat(500);
        let out = normalize_title(&raw);
        assert_eq!(out.chars().count(), MAX_TITLE_LEN);
    }

    #[test]
    fn cap_respects_char_boundaries() {
        let raw = "é".repeat(150);
        let out = normalize_title(&raw);
        assert_eq!(out.chars().count(), MAX_TITLE_LEN);
        assert!(out.chars().all(|c| c == 'é'));
    }

    #[test]
    fn short_title_untouched() {
        assert_eq!(normalize_title("Morning ride"), "Morning ride");
    }
}
