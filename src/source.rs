//! Source provider contract, per-channel monitoring, and archiving.

use crate::errsink::{ErrorSink, NewErrorEntry};
use crate::model::{
    codes, CandidateItem, Channel, ErrorCategory, ErrorDetail, ErrorSeverity, ItemMetadata,
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{info, warn};

/// Server-side filter hints for a listing call. Providers apply what they
/// support; the monitor re-applies the watermark locally either way.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListFilter {
    /// Mime-type prefix, e.g. `video/`.
    pub mime_prefix: Option<String>,
    pub created_after: Option<DateTime<Utc>>,
}

/// Contract for the external file store. Implementations must already
/// exclude trashed/consumed items from `list`.
#[async_trait]
pub trait SourceProvider: Send + Sync {
    async fn list(&self, folder: &str, filter: &ListFilter) -> Result<Vec<CandidateItem>>;
    async fn get_metadata(&self, item_id: &str) -> Result<ItemMetadata>;
    /// Move an item between folders; returns the new parent set.
    async fn move_item(&self, item_id: &str, from: &str, to: &str) -> Result<Vec<String>>;
}

/// Mime prefix every channel requires of its candidates.
pub const REQUIRED_MIME_PREFIX: &str = "video/";

/// List candidate items for one channel. Ordering is not significant to the
/// caller; dedup makes processing order-independent.
pub async fn list_new_items(
    provider: &dyn SourceProvider,
    channel: &Channel,
) -> Result<Vec<CandidateItem>> {
    let filter = ListFilter {
        mime_prefix: Some(REQUIRED_MIME_PREFIX.to_string()),
        created_after: channel.not_before,
    };
    let items = provider
        .list(&channel.source_folder, &filter)
        .await
        .with_context(|| format!("listing source folder {}", channel.source_folder))?;

    // The watermark is enforced here as well, in case the provider ignored
    // the filter hint.
    let items: Vec<CandidateItem> = items
        .into_iter()
        .filter(|item| match channel.not_before {
            Some(cutoff) => item.created_at >= cutoff,
            None => true,
        })
        .collect();

    info!(
        channel = %channel.id,
        count = items.len(),
        "listed candidate items"
    );
    Ok(items)
}

/// Relocate a published item out of the active set.
///
/// If the item is unexpectedly absent from the source folder the move is
/// still attempted (it may have been relocated by an earlier run) and a
/// warning entry is written. Returns Ok even in that case; only the move
/// call itself failing is an error.
pub async fn archive(
    provider: &dyn SourceProvider,
    sink: &dyn ErrorSink,
    channel: &Channel,
    item_id: &str,
    item_name: &str,
) -> Result<()> {
    let in_source = match provider.get_metadata(item_id).await {
        Ok(meta) => meta.parents.iter().any(|p| p == &channel.source_folder),
        // Metadata fetch failing here is not fatal; the move below decides.
        Err(err) => {
            warn!(?err, item_id, "could not confirm item location before archive");
            true
        }
    };

    if !in_source {
        warn!(
            item_id,
            folder = %channel.source_folder,
            "item not in expected source folder; attempting move anyway"
        );
        sink.record(NewErrorEntry {
            owner_id: channel.owner_id.clone(),
            channel_id: Some(channel.id.clone()),
            category: ErrorCategory::Archive,
            severity: ErrorSeverity::Warning,
            code: codes::ARCHIVE_SOURCE_MISSING,
            message: format!("item '{}' not found in source folder before archive", item_name),
            detail: ErrorDetail::Archive {
                item_id: item_id.to_string(),
                from: channel.source_folder.clone(),
                to: channel.archive_folder.clone(),
            },
        })
        .await?;
    }

    provider
        .move_item(item_id, &channel.source_folder, &channel.archive_folder)
        .await
        .with_context(|| format!("moving item {} to archive", item_id))?;
    info!(item_id, channel = %channel.id, "archived item");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ContentRules;
    use chrono::TimeZone;
    use std::sync::Mutex;

    fn channel(not_before: Option<DateTime<Utc>>) -> Channel {
        Channel {
            id: "ch1".into(),
            owner_id: "user-1".into(),
            enabled: true,
            source_folder: "src-folder".into(),
            archive_folder: "arc-folder".into(),
            targets: vec!["t1".into()],
            rules: ContentRules {
                language: "en".into(),
                tone: "casual".into(),
                constraints: vec![],
            },
            not_before,
        }
    }

    fn item(id: &str, ts: DateTime<Utc>) -> CandidateItem {
        CandidateItem {
            id: id.into(),
            name: format!("{id}.mp4"),
            mime_type: "video/mp4".into(),
            size: 10,
            created_at: ts,
        }
    }

    struct StaticProvider {
        items: Vec<CandidateItem>,
        filters: Mutex<Vec<ListFilter>>,
    }

    #[async_trait]
    impl SourceProvider for StaticProvider {
        async fn list(&self, _folder: &str, filter: &ListFilter) -> Result<Vec<CandidateItem>> {
            self.filters.lock().unwrap().push(filter.clone());
            Ok(self.items.clone())
        }

        async fn get_metadata(&self, _item_id: &str) -> Result<ItemMetadata> {
            anyhow::bail!("not used")
        }

        async fn move_item(&self, _item_id: &str, _f: &str, _t: &str) -> Result<Vec<String>> {
            anyhow::bail!("not used")
        }
    }

    #[tokio::test]
    async fn watermark_filters_old_items_locally() {
        let cutoff = Utc.with_ymd_and_hms(2026, 1, 15, 0, 0, 0).unwrap();
        let old = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let new = Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap();
        let provider = StaticProvider {
            items: vec![item("old", old), item("new", new)],
            filters: Mutex::new(vec![]),
        };

        let items = list_new_items(&provider, &channel(Some(cutoff))).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id, "new");

        // Filter hints are forwarded to the provider.
        let filters = provider.filters.lock().unwrap();
        assert_eq!(filters[0].mime_prefix.as_deref(), Some(REQUIRED_MIME_PREFIX));
        assert_eq!(filters[0].created_after, Some(cutoff));
    }

    #[tokio::test]
    async fn no_watermark_passes_everything() {
        let ts = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let provider = StaticProvider {
            items: vec![item("a", ts), item("b", ts)],
            filters: Mutex::new(vec![]),
        };
        let items = list_new_items(&provider, &channel(None)).await.unwrap();
        assert_eq!(items.len(), 2);
    }
}
