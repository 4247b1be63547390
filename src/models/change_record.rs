use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use super::TrackerError;

pub type Version = u64;

// Section label attached to every detailed change
pub const GENERIC_SECTION: &str = "content";

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    Create,
    Update,
    Delete,
    Restore,
}

impl ChangeType {
    // Past-tense verb used when generating descriptions
    pub fn past_tense(&self) -> &'static str {
        match self {
            ChangeType::Create => "Created",
            ChangeType::Update => "Updated",
            ChangeType::Delete => "Deleted",
            ChangeType::Restore => "Restored",
        }
    }
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ChangeType::Create => write!(f, "create"),
            ChangeType::Update => write!(f, "update"),
            ChangeType::Delete => write!(f, "delete"),
            ChangeType::Restore => write!(f, "restore"),
        }
    }
}

impl FromStr for ChangeType {
    type Err = TrackerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(ChangeType::Create),
            "update" => Ok(ChangeType::Update),
            "delete" => Ok(ChangeType::Delete),
            "restore" => Ok(ChangeType::Restore),
            other => Err(TrackerError::InvalidArgument(format!("Unknown change type: {}", other))),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Addition,
    Deletion,
    Modification,
}

// One contiguous line-range delta between two contents
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DetailedChange {
    #[serde(rename = "type")]
    pub kind: ChangeKind,
    pub section: String,
    pub line_start: usize,
    pub line_end: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_before: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_after: Option<String>,
    pub summary: String,
}

impl DetailedChange {
    // Ranges overlap unless one ends strictly before the other starts
    pub fn overlaps(&self, other: &DetailedChange) -> bool {
        !(self.line_end < other.line_start || other.line_end < self.line_start)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChangeMetadata {
    pub size_before: usize,
    pub size_after: usize,
    pub lines_before: usize,
    pub lines_after: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash_before: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash_after: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChangeRecord {
    pub id: String,
    pub file_id: String,
    pub version: Version,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    pub description: String,
    pub change_type: ChangeType,
    pub changes: Vec<DetailedChange>,
    pub metadata: ChangeMetadata,
    // Full document content after this change
    #[serde(default)]
    pub content: String,
}

// Counts of each change kind inside one record
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DiffStats {
    pub additions: usize,
    pub deletions: usize,
    pub modifications: usize,
}

impl DiffStats {
    pub fn from_changes(changes: &[DetailedChange]) -> Self {
        changes.iter().fold(DiffStats::default(), |mut stats, change| {
            match change.kind {
                ChangeKind::Addition => stats.additions += 1,
                ChangeKind::Deletion => stats.deletions += 1,
                ChangeKind::Modification => stats.modifications += 1,
            }
            stats
        })
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ResolutionStrategy {
    Merge,
    AcceptCurrent,
    AcceptIncoming,
    #[default]
    Manual,
}

impl FromStr for ResolutionStrategy {
    type Err = TrackerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "merge" => Ok(ResolutionStrategy::Merge),
            "accept-current" => Ok(ResolutionStrategy::AcceptCurrent),
            "accept-incoming" => Ok(ResolutionStrategy::AcceptIncoming),
            "manual" => Ok(ResolutionStrategy::Manual),
            other => Err(TrackerError::Unsupported(format!(
                "Unknown resolution strategy: {}",
                other
            ))),
        }
    }
}

// How a detected conflict should be resolved, with the content each strategy needs
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Merge,
    AcceptCurrent,
    AcceptIncoming { content: String },
    Manual { merged_content: String },
}

impl Resolution {
    // Builds a resolution from loosely-typed caller input
    pub fn from_parts(strategy: &str, merged_content: Option<String>) -> Result<Self, TrackerError> {
        match strategy.parse::<ResolutionStrategy>()? {
            ResolutionStrategy::Merge => Ok(Resolution::Merge),
            ResolutionStrategy::AcceptCurrent => Ok(Resolution::AcceptCurrent),
            ResolutionStrategy::AcceptIncoming => merged_content
                .map(|content| Resolution::AcceptIncoming { content })
                .ok_or_else(|| {
                    TrackerError::InvalidArgument(
                        "accept-incoming resolution requires mergedContent".to_string(),
                    )
                }),
            ResolutionStrategy::Manual => merged_content
                .map(|merged_content| Resolution::Manual { merged_content })
                .ok_or_else(|| {
                    TrackerError::InvalidArgument(
                        "manual resolution requires mergedContent".to_string(),
                    )
                }),
        }
    }

    pub fn strategy(&self) -> ResolutionStrategy {
        match self {
            Resolution::Merge => ResolutionStrategy::Merge,
            Resolution::AcceptCurrent => ResolutionStrategy::AcceptCurrent,
            Resolution::AcceptIncoming { .. } => ResolutionStrategy::AcceptIncoming,
            Resolution::Manual { .. } => ResolutionStrategy::Manual,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConflictResolution {
    pub conflict_id: String,
    pub file_id: String,
    pub base_version: Version,
    pub conflicting_versions: Vec<Version>,
    pub resolution: ResolutionStrategy,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merged_content: Option<String>,
}

fn default_true() -> bool {
    true
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RollbackOptions {
    pub target_version: Version,
    #[serde(default)]
    pub preserve_changes: bool,
    #[serde(default = "default_true")]
    pub create_backup: bool,
    #[serde(default)]
    pub reason: Option<String>,
}

impl RollbackOptions {
    pub fn to_version(target_version: Version) -> Self {
        RollbackOptions {
            target_version,
            preserve_changes: false,
            create_backup: true,
            reason: None,
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RollbackResult {
    pub content: String,
    pub change_record: ChangeRecord,
}

// Filters and pagination for history queries
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HistoryQuery {
    pub limit: Option<usize>,
    pub offset: Option<usize>,
    pub from_version: Option<Version>,
    pub to_version: Option<Version>,
    pub author: Option<String>,
    pub change_type: Option<ChangeType>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HistoryPage {
    pub changes: Vec<ChangeRecord>,
    pub total: usize,
    pub has_more: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AuditTrail {
    pub file_id: String,
    pub total_changes: usize,
    pub authors: Vec<String>,
    pub change_types: BTreeMap<ChangeType, usize>,
    pub timeline: Vec<ChangeRecord>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum DiffFormat {
    #[default]
    Unified,
    SideBySide,
    Html,
}

impl FromStr for DiffFormat {
    type Err = TrackerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unified" => Ok(DiffFormat::Unified),
            "side-by-side" => Ok(DiffFormat::SideBySide),
            "html" => Ok(DiffFormat::Html),
            other => Err(TrackerError::Unsupported(format!("Unknown diff format: {}", other))),
        }
    }
}
