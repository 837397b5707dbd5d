//! Pipeline coordinator: discover → dedup-check → validate → enrich →
//! fan-out → mark processed → archive, per channel and per item.
//!
//! Per-item state machine:
//! `Discovered → (Skipped | Rejected | PublishAttempted)`;
//! `PublishAttempted → (Published | Failed)`;
//! `Published → (Archived | ArchiveFailed)` — both terminal-success.

use crate::dedup::DedupStore;
use crate::enrich::{self, EnrichmentProvider};
use crate::errsink::{ErrorSink, NewErrorEntry};
use crate::model::{
    codes, CandidateItem, Channel, ErrorCategory, ErrorDetail, ErrorSeverity, ItemOutcome,
    ProcessingResult, RunStats,
};
use crate::publish::{self, PublishProvider};
use crate::source::{self, SourceProvider, REQUIRED_MIME_PREFIX};
use crate::validate;
use anyhow::Result;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{error, info, instrument, warn};

pub struct Pipeline {
    pub source: Arc<dyn SourceProvider>,
    pub enrichment: Arc<dyn EnrichmentProvider>,
    pub publisher: Arc<dyn PublishProvider>,
    pub dedup: Arc<dyn DedupStore>,
    pub sink: Arc<dyn ErrorSink>,
}

impl Pipeline {
    /// One full run over all channels. Invoked by the external scheduler;
    /// the returned counters are the only thing it sees.
    ///
    /// Channel failures are converted to an error count plus a sink write at
    /// this boundary and never abort the remaining channels. A deadline, if
    /// set, stops the run between channels; partial runs are always valid
    /// because the pipeline is idempotent.
    #[instrument(skip_all)]
    pub async fn run_once(&self, channels: &[Channel], deadline: Option<Instant>) -> RunStats {
        let mut stats = RunStats::default();
        for channel in channels {
            if !channel.enabled {
                continue;
            }
            if let Some(deadline) = deadline {
                if Instant::now() >= deadline {
                    warn!(channel = %channel.id, "run deadline reached; skipping remaining channels");
                    break;
                }
            }
            match self.run_channel(channel, deadline).await {
                Ok(channel_stats) => stats.absorb(channel_stats),
                Err(err) => {
                    error!(channel = %channel.id, ?err, "channel processing failed");
                    stats.errored += 1;
                    // Best effort: a failing sink must not take down the run.
                    if let Err(sink_err) = self
                        .sink
                        .record(NewErrorEntry {
                            owner_id: channel.owner_id.clone(),
                            channel_id: Some(channel.id.clone()),
                            category: ErrorCategory::Pipeline,
                            severity: ErrorSeverity::Error,
                            code: codes::CHANNEL_FAILED,
                            message: format!("channel processing failed: {err:#}"),
                            detail: {
                                let mut map = serde_json::Map::new();
                                map.insert("channel_id".into(), serde_json::json!(channel.id));
                                ErrorDetail::Other(map)
                            },
                        })
                        .await
                    {
                        error!(?sink_err, "failed to record channel failure");
                    }
                }
            }
        }
        info!(
            processed = stats.processed,
            skipped = stats.skipped,
            errored = stats.errored,
            "run complete"
        );
        stats
    }

    #[instrument(skip_all, fields(channel = %channel.id))]
    async fn run_channel(&self, channel: &Channel, deadline: Option<Instant>) -> Result<RunStats> {
        let mut stats = RunStats::default();

        let items = match source::list_new_items(self.source.as_ref(), channel).await {
            Ok(items) => items,
            Err(err) => {
                // Listing failures are isolated here so sibling channels
                // still run; the item set is simply empty this poll.
                warn!(?err, channel = %channel.id, "source listing failed");
                self.sink
                    .record(NewErrorEntry {
                        owner_id: channel.owner_id.clone(),
                        channel_id: Some(channel.id.clone()),
                        category: ErrorCategory::SourceListing,
                        severity: ErrorSeverity::Error,
                        code: codes::SOURCE_LIST_FAILED,
                        message: format!("failed to list source folder: {err:#}"),
                        detail: ErrorDetail::Listing {
                            folder: channel.source_folder.clone(),
                        },
                    })
                    .await?;
                stats.errored += 1;
                return Ok(stats);
            }
        };

        for item in items {
            if let Some(deadline) = deadline {
                if Instant::now() >= deadline {
                    warn!(channel = %channel.id, "run deadline reached; leaving remaining items for next poll");
                    break;
                }
            }
            match self.process_item(channel, &item).await? {
                ItemOutcome::Skipped => stats.skipped += 1,
                ItemOutcome::Rejected => stats.errored += 1,
                ItemOutcome::Published(result) => {
                    info!(
                        item = %item.id,
                        targets = ?result.successful_targets,
                        "item published"
                    );
                    stats.processed += 1;
                }
                ItemOutcome::Failed(_) => stats.errored += 1,
            }
        }
        Ok(stats)
    }

    /// Drive one candidate item to a terminal state. Every failure path
    /// writes exactly one sink entry before returning; only infrastructure
    /// errors (dedup store, sink itself) propagate to the channel boundary.
    async fn process_item(&self, channel: &Channel, item: &CandidateItem) -> Result<ItemOutcome> {
        if self.dedup.has_processed(&channel.id, &item.id).await? {
            return Ok(ItemOutcome::Skipped);
        }

        let mut result = ProcessingResult {
            item_id: item.id.clone(),
            item_name: item.name.clone(),
            ..Default::default()
        };

        // Precondition gate. A metadata fetch failure counts as NOT_FOUND:
        // the item vanished or is unreadable, either way it is not
        // publishable right now.
        let metadata = self.source.get_metadata(&item.id).await.ok();
        let verdict = validate::validate(metadata.as_ref(), REQUIRED_MIME_PREFIX);
        let media_url = metadata.as_ref().and_then(|m| m.public_url.clone());
        let reason = match (verdict.reason, &media_url) {
            (Some(reason), _) => Some(reason),
            // Validated but unreachable from outside: treat as unresolved.
            (None, None) => Some(validate::RejectReason::NotFound),
            (None, Some(_)) => None,
        };
        if let Some(reason) = reason {
            self.sink
                .record(NewErrorEntry {
                    owner_id: channel.owner_id.clone(),
                    channel_id: Some(channel.id.clone()),
                    category: ErrorCategory::Validation,
                    severity: ErrorSeverity::Warning,
                    code: reason.code(),
                    message: reason.message(&item.name),
                    detail: ErrorDetail::Validation {
                        item_id: item.id.clone(),
                        item_name: item.name.clone(),
                        size: metadata.as_ref().map(|m| m.size).unwrap_or(0),
                        mime_type: metadata
                            .as_ref()
                            .map(|m| m.mime_type.clone())
                            .unwrap_or_default(),
                    },
                })
                .await?;
            return Ok(ItemOutcome::Rejected);
        }
        let media_url = media_url.unwrap_or_default();

        let mut enriched = match self.enrichment.generate(&item.name, &channel.rules).await {
            Ok(enriched) => enriched,
            Err(err) => {
                warn!(item = %item.id, ?err, "enrichment failed");
                self.sink
                    .record(NewErrorEntry {
                        owner_id: channel.owner_id.clone(),
                        channel_id: Some(channel.id.clone()),
                        category: ErrorCategory::Enrichment,
                        severity: ErrorSeverity::Error,
                        code: codes::ENRICHMENT_FAILED,
                        message: format!("enrichment failed for '{}': {err:#}", item.name),
                        detail: ErrorDetail::Enrichment {
                            item_id: item.id.clone(),
                            item_name: item.name.clone(),
                        },
                    })
                    .await?;
                result.errors.push(format!("enrichment: {err:#}"));
                return Ok(ItemOutcome::Failed(result));
            }
        };
        enriched.title = enrich::normalize_title(&enriched.title);

        let outcomes = publish::fan_out(
            self.publisher.as_ref(),
            self.sink.as_ref(),
            channel,
            &item.id,
            &media_url,
            &enriched,
        )
        .await?;
        for outcome in &outcomes {
            if outcome.success {
                result.successful_targets.push(outcome.target.clone());
            } else if let Some(err) = &outcome.error {
                result.errors.push(format!("{}: {}", outcome.target, err));
            }
        }
        result.success = !result.successful_targets.is_empty();

        if !result.success {
            // No dedup record: the item stays eligible for retry next poll.
            self.sink
                .record(NewErrorEntry {
                    owner_id: channel.owner_id.clone(),
                    channel_id: Some(channel.id.clone()),
                    category: ErrorCategory::Publish,
                    severity: ErrorSeverity::Error,
                    code: codes::ALL_TARGETS_FAILED,
                    message: format!("all {} targets failed for '{}'", outcomes.len(), item.name),
                    detail: {
                        let mut map = serde_json::Map::new();
                        map.insert("item_id".into(), serde_json::json!(item.id));
                        map.insert(
                            "attempted_targets".into(),
                            serde_json::json!(channel.targets),
                        );
                        ErrorDetail::Other(map)
                    },
                })
                .await?;
            return Ok(ItemOutcome::Failed(result));
        }

        // Mark processed before archiving: a restart in between must cause a
        // skip, never a re-publish. An un-archived item is the cheap side of
        // that trade.
        self.dedup.mark_processed(&channel.id, &item.id).await?;

        if let Err(err) = source::archive(
            self.source.as_ref(),
            self.sink.as_ref(),
            channel,
            &item.id,
            &item.name,
        )
        .await
        {
            warn!(item = %item.id, ?err, "archive failed");
            self.sink
                .record(NewErrorEntry {
                    owner_id: channel.owner_id.clone(),
                    channel_id: Some(channel.id.clone()),
                    category: ErrorCategory::Archive,
                    severity: ErrorSeverity::Warning,
                    code: codes::ARCHIVE_FAILED,
                    message: format!("failed to archive '{}': {err:#}", item.name),
                    detail: ErrorDetail::Archive {
                        item_id: item.id.clone(),
                        from: channel.source_folder.clone(),
                        to: channel.archive_folder.clone(),
                    },
                })
                .await?;
            result.errors.push(format!("archive: {err:#}"));
        }

        Ok(ItemOutcome::Published(result))
    }
}
