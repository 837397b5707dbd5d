//! Precondition checks applied before any publish call is attempted.

use crate::model::{codes, ItemMetadata};

/// Why an item was rejected. Precondition failures are expected operational
/// noise, so they are logged at warning severity and never abort a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    NotFound,
    Empty,
    WrongKind,
}

impl RejectReason {
    pub fn code(&self) -> &'static str {
        match self {
            RejectReason::NotFound => codes::ITEM_NOT_FOUND,
            RejectReason::Empty => codes::EMPTY_FILE,
            RejectReason::WrongKind => codes::WRONG_MEDIA_KIND,
        }
    }

    pub fn message(&self, item_name: &str) -> String {
        match self {
            RejectReason::NotFound => format!("item '{}' no longer resolves", item_name),
            RejectReason::Empty => format!("item '{}' is an empty file", item_name),
            RejectReason::WrongKind => format!("item '{}' is not the required media kind", item_name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationResult {
    pub valid: bool,
    pub reason: Option<RejectReason>,
}

impl ValidationResult {
    fn ok() -> Self {
        Self {
            valid: true,
            reason: None,
        }
    }

    fn reject(reason: RejectReason) -> Self {
        Self {
            valid: false,
            reason: Some(reason),
        }
    }
}

/// Run the precondition checks in order, short-circuiting on the first
/// failure: metadata resolves, size > 0, mime prefix matches.
///
/// `metadata` is None when the metadata fetch reported the item missing.
pub fn validate(metadata: Option<&ItemMetadata>, required_prefix: &str) -> ValidationResult {
    let Some(meta) = metadata else {
        return ValidationResult::reject(RejectReason::NotFound);
    };
    if meta.size <= 0 {
        return ValidationResult::reject(RejectReason::Empty);
    }
    if !meta.mime_type.starts_with(required_prefix) {
        return ValidationResult::reject(RejectReason::WrongKind);
    }
    ValidationResult::ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(size: i64, mime: &str) -> ItemMetadata {
        ItemMetadata {
            id: "f1".into(),
            name: "clip.mp4".into(),
            mime_type: mime.into(),
            size,
            public_url: Some("https://files.example.com/f1".into()),
            parents: vec!["folder-incoming".into()],
        }
    }

    #[test]
    fn missing_metadata_is_not_found() {
        let res = validate(None, "video/");
        assert!(!res.valid);
        assert_eq!(res.reason, Some(RejectReason::NotFound));
    }

    #[test]
    fn zero_size_is_empty() {
        let res = validate(Some(&meta(0, "video/mp4")), "video/");
        assert_eq!(res.reason, Some(RejectReason::Empty));
        assert_eq!(res.reason.unwrap().code(), "EMPTY_FILE");
    }

    #[test]
    fn wrong_mime_prefix_is_rejected() {
        let res = validate(Some(&meta(100, "image/png")), "video/");
        assert_eq!(res.reason, Some(RejectReason::WrongKind));
    }

    #[test]
    fn empty_wins_over_wrong_kind() {
        // Short-circuit order: size check fires before the mime check.
        let res = validate(Some(&meta(0, "image/png")), "video/");
        assert_eq!(res.reason, Some(RejectReason::Empty));
    }

    #[test]
    fn valid_video_passes() {
        let res = validate(Some(&meta(100, "video/mp4")), "video/");
        assert!(res.valid);
        assert!(res.reason.is_none());
    }
}
