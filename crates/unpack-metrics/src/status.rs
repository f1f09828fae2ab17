//! Pipeline item statuses and the report buckets they roll up into.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Status of a single item tracked by the extraction pipeline.
///
/// Owned by the pipeline. The metrics layer only ever reads it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ItemStatus {
    /// Discovered, waiting for its delay to elapse.
    #[default]
    Waiting,
    /// Handed to the extraction queue.
    Queued,
    /// An extraction is running.
    Extracting,
    /// The extraction returned an error.
    ExtractFailed,
    /// Extracted, waiting for the upstream app to import.
    Extracted,
    /// Extracted files are being removed.
    Deleting,
    /// Removing the extracted files failed.
    DeleteFailed,
    /// Extracted files were removed.
    Deleted,
    /// The upstream app imported the item.
    Imported,
}

impl ItemStatus {
    /// Every status, in pipeline order.
    pub const ALL: [ItemStatus; 9] = [
        Self::Waiting,
        Self::Queued,
        Self::Extracting,
        Self::ExtractFailed,
        Self::Extracted,
        Self::Deleting,
        Self::DeleteFailed,
        Self::Deleted,
        Self::Imported,
    ];

    /// Wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Waiting => "WAITING",
            Self::Queued => "QUEUED",
            Self::Extracting => "EXTRACTING",
            Self::ExtractFailed => "EXTRACT_FAILED",
            Self::Extracted => "EXTRACTED",
            Self::Deleting => "DELETING",
            Self::DeleteFailed => "DELETE_FAILED",
            Self::Deleted => "DELETED",
            Self::Imported => "IMPORTED",
        }
    }

    /// Parse from the wire representation.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "WAITING" => Some(Self::Waiting),
            "QUEUED" => Some(Self::Queued),
            "EXTRACTING" => Some(Self::Extracting),
            "EXTRACT_FAILED" => Some(Self::ExtractFailed),
            "EXTRACTED" => Some(Self::Extracted),
            "DELETING" => Some(Self::Deleting),
            "DELETE_FAILED" => Some(Self::DeleteFailed),
            "DELETED" => Some(Self::Deleted),
            "IMPORTED" => Some(Self::Imported),
            _ => None,
        }
    }

    /// The report bucket this status is counted under.
    ///
    /// Keep this match free of a wildcard arm: a new status must not compile
    /// until it is given a bucket.
    pub fn bucket(&self) -> Bucket {
        match self {
            Self::Waiting => Bucket::Waiting,
            Self::Queued => Bucket::Queued,
            Self::Extracting => Bucket::Extracting,
            Self::ExtractFailed | Self::DeleteFailed => Bucket::Failed,
            Self::Extracted => Bucket::Extracted,
            Self::Deleting | Self::Deleted => Bucket::Deleted,
            Self::Imported => Bucket::Imported,
        }
    }
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse status category used for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Bucket {
    Waiting,
    Queued,
    Extracting,
    Failed,
    Extracted,
    Imported,
    Deleted,
}

impl Bucket {
    /// Every bucket, in the order they are reported.
    pub const ALL: [Bucket; 7] = [
        Self::Waiting,
        Self::Queued,
        Self::Extracting,
        Self::Failed,
        Self::Extracted,
        Self::Imported,
        Self::Deleted,
    ];

    /// Value of the `name` label this bucket is exported under.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Waiting => "waiting",
            Self::Queued => "queued",
            Self::Extracting => "extracting",
            Self::Failed => "failed",
            Self::Extracted => "extracted",
            Self::Imported => "imported",
            Self::Deleted => "deleted",
        }
    }
}

impl fmt::Display for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_every_status_has_exactly_one_bucket() {
        for status in ItemStatus::ALL {
            let hits = Bucket::ALL
                .iter()
                .filter(|bucket| **bucket == status.bucket())
                .count();
            assert_eq!(hits, 1, "{status} must map to exactly one bucket");
        }
    }

    #[test]
    fn test_every_bucket_is_reachable() {
        for bucket in Bucket::ALL {
            assert!(
                ItemStatus::ALL.iter().any(|s| s.bucket() == bucket),
                "no status maps to {bucket}"
            );
        }
    }

    #[rstest]
    #[case(ItemStatus::Waiting, Bucket::Waiting)]
    #[case(ItemStatus::Queued, Bucket::Queued)]
    #[case(ItemStatus::Extracting, Bucket::Extracting)]
    #[case(ItemStatus::ExtractFailed, Bucket::Failed)]
    #[case(ItemStatus::DeleteFailed, Bucket::Failed)]
    #[case(ItemStatus::Extracted, Bucket::Extracted)]
    #[case(ItemStatus::Deleting, Bucket::Deleted)]
    #[case(ItemStatus::Deleted, Bucket::Deleted)]
    #[case(ItemStatus::Imported, Bucket::Imported)]
    fn test_status_bucket(#[case] status: ItemStatus, #[case] expected: Bucket) {
        assert_eq!(status.bucket(), expected);
    }

    #[test]
    fn test_status_round_trip_str() {
        for status in ItemStatus::ALL {
            assert_eq!(ItemStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(ItemStatus::parse("UNKNOWN"), None);
    }

    #[test]
    fn test_status_serde_matches_as_str() {
        let json = serde_json::to_string(&ItemStatus::ExtractFailed).unwrap();
        assert_eq!(json, "\"EXTRACT_FAILED\"");
        let parsed: ItemStatus = serde_json::from_str("\"DELETE_FAILED\"").unwrap();
        assert_eq!(parsed, ItemStatus::DeleteFailed);
    }
}
