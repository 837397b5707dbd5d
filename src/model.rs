use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A configured publishing destination bundle. Owned by the CRUD layer;
/// read-only to the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Channel {
    pub id: String,
    pub owner_id: String,
    pub enabled: bool,
    pub source_folder: String,
    pub archive_folder: String,
    pub targets: Vec<String>,
    pub rules: ContentRules,
    /// Items created before this instant are never offered to the pipeline.
    #[serde(default)]
    pub not_before: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContentRules {
    pub language: String,
    pub tone: String,
    #[serde(default)]
    pub constraints: Vec<String>,
}

/// A source file discovered by a poll, not yet known to be processed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CandidateItem {
    pub id: String,
    pub name: String,
    pub mime_type: String,
    pub size: i64,
    pub created_at: DateTime<Utc>,
}

/// Metadata resolved for a single item, including where it currently lives.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ItemMetadata {
    pub id: String,
    pub name: String,
    pub mime_type: String,
    pub size: i64,
    pub public_url: Option<String>,
    pub parents: Vec<String>,
}

/// Title and description produced by the enrichment provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Enriched {
    pub title: String,
    pub description: String,
}

/// Result of one fan-out leg. Held only while its item is in flight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetOutcome {
    pub target: String,
    pub success: bool,
    pub error: Option<String>,
}

/// Aggregate of one item's journey through the publish path.
///
/// `success` is true iff at least one target outcome succeeded. An archive
/// failure is reported in `errors` but never flips `success` back to false:
/// partial publication already happened and must not be repeated.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessingResult {
    pub item_id: String,
    pub item_name: String,
    pub success: bool,
    pub successful_targets: Vec<String>,
    pub errors: Vec<String>,
}

/// Terminal state of one candidate item within a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    Skipped,
    Rejected,
    Published(ProcessingResult),
    Failed(ProcessingResult),
}

/// Per-run counters, the only value handed back to the scheduler trigger.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunStats {
    pub processed: u32,
    pub skipped: u32,
    pub errored: u32,
}

impl RunStats {
    pub fn absorb(&mut self, other: RunStats) {
        self.processed += other.processed;
        self.skipped += other.skipped;
        self.errored += other.errored;
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ErrorSeverity {
    Info,
    Warning,
    Error,
}

impl ErrorSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorSeverity::Info => "info",
            ErrorSeverity::Warning => "warning",
            ErrorSeverity::Error => "error",
        }
    }
}

/// Enumerated cause category for error-log entries.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ErrorCategory {
    SourceListing,
    Validation,
    Enrichment,
    Publish,
    MediaUpload,
    Archive,
    Pipeline,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::SourceListing => "source_listing",
            ErrorCategory::Validation => "validation",
            ErrorCategory::Enrichment => "enrichment",
            ErrorCategory::Publish => "publish",
            ErrorCategory::MediaUpload => "media_upload",
            ErrorCategory::Archive => "archive",
            ErrorCategory::Pipeline => "pipeline",
        }
    }
}

/// Stable machine codes for operator filtering and alerting.
pub mod codes {
    pub const SOURCE_LIST_FAILED: &str = "SOURCE_LIST_FAILED";
    pub const ITEM_NOT_FOUND: &str = "ITEM_NOT_FOUND";
    pub const EMPTY_FILE: &str = "EMPTY_FILE";
    pub const WRONG_MEDIA_KIND: &str = "WRONG_MEDIA_KIND";
    pub const ENRICHMENT_FAILED: &str = "ENRICHMENT_FAILED";
    pub const MEDIA_UPLOAD_FAILED: &str = "MEDIA_UPLOAD_FAILED";
    pub const PUBLISH_FAILED: &str = "PUBLISH_FAILED";
    pub const ALL_TARGETS_FAILED: &str = "ALL_TARGETS_FAILED";
    pub const ARCHIVE_FAILED: &str = "ARCHIVE_FAILED";
    pub const ARCHIVE_SOURCE_MISSING: &str = "ARCHIVE_SOURCE_MISSING";
    pub const CHANNEL_FAILED: &str = "CHANNEL_FAILED";
}

/// Structured detail payload for an error-log entry, keyed by what failed.
/// `Other` is the escape hatch for provider-specific diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ErrorDetail {
    Listing {
        folder: String,
    },
    Validation {
        item_id: String,
        item_name: String,
        size: i64,
        mime_type: String,
    },
    Enrichment {
        item_id: String,
        item_name: String,
    },
    Publish {
        target: String,
        item_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
    },
    Archive {
        item_id: String,
        from: String,
        to: String,
    },
    Other(Map<String, Value>),
}
