//! Submission snapshots and audit records

use super::item::{ItemStatus, ItemVerification};
use super::pool::{ItemId, ItemRef, Pool};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Identifier of a persisted checklist record
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(pub i64);

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Overall outcome of a check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OverallStatus {
    Complete,
    WithIssues,
}

impl OverallStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OverallStatus::Complete => "COMPLETE",
            OverallStatus::WithIssues => "WITH_ISSUES",
        }
    }

    /// Human-readable label used in notifications and exports
    pub fn label(&self) -> &'static str {
        match self {
            OverallStatus::Complete => "Complète",
            OverallStatus::WithIssues => "Avec problèmes",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "COMPLETE" | "complete" => Some(OverallStatus::Complete),
            "WITH_ISSUES" | "with_issues" => Some(OverallStatus::WithIssues),
            _ => None,
        }
    }
}

impl fmt::Display for OverallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One item as it stood at submission time, name included
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotEntry {
    pub name: String,
    #[serde(flatten)]
    pub verification: ItemVerification,
}

impl SnapshotEntry {
    pub fn new(name: impl Into<String>, verification: ItemVerification) -> Self {
        Self {
            name: name.into(),
            verification,
        }
    }

    pub fn status(&self) -> ItemStatus {
        self.verification.status()
    }
}

/// Everything a submission carries, before validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionSnapshot {
    pub pool: Pool,
    pub submitter: String,
    pub comment: String,
    pub items: BTreeMap<ItemId, SnapshotEntry>,
}

impl SubmissionSnapshot {
    /// Names of items never touched, in id order
    ///
    /// Items submitted without a name are listed by id; names are only looked
    /// up once the submission has been accepted.
    pub fn incomplete_names(&self) -> Vec<String> {
        self.items
            .iter()
            .filter(|(_, e)| e.verification.is_incomplete())
            .map(|(id, e)| {
                if e.name.trim().is_empty() {
                    format!("Élément #{}", id)
                } else {
                    e.name.clone()
                }
            })
            .collect()
    }

    pub fn names_with_status(&self, status: ItemStatus) -> Vec<String> {
        names_with_status(&self.items, status)
    }

    pub fn overall_status(&self) -> OverallStatus {
        overall_status(&self.items)
    }
}

/// Immutable audit entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecklistRecord {
    pub id: RecordId,
    pub submitter: String,
    pub pool: Pool,
    pub overall_status: OverallStatus,
    pub comment: String,
    pub snapshot: BTreeMap<ItemId, SnapshotEntry>,
    pub submitted_at: DateTime<Utc>,
}

impl ChecklistRecord {
    /// Pool-tagged reference for one of this record's items
    pub fn item_ref(&self, id: ItemId) -> ItemRef {
        ItemRef::new(self.pool, id)
    }

    pub fn names_with_status(&self, status: ItemStatus) -> Vec<String> {
        names_with_status(&self.snapshot, status)
    }

    pub fn snapshot_name(&self, id: ItemId) -> Option<&str> {
        self.snapshot.get(&id).map(|e| e.name.as_str())
    }
}

fn names_with_status(items: &BTreeMap<ItemId, SnapshotEntry>, status: ItemStatus) -> Vec<String> {
    items
        .values()
        .filter(|e| e.status() == status)
        .map(|e| e.name.clone())
        .collect()
}

/// WITH_ISSUES as soon as one item is MISSING or FAILING
pub(crate) fn overall_status(items: &BTreeMap<ItemId, SnapshotEntry>) -> OverallStatus {
    if items.values().any(|e| e.status().is_issue()) {
        OverallStatus::WithIssues
    } else {
        OverallStatus::Complete
    }
}
