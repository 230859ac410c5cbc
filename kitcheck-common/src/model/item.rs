//! Catalog items and per-item verification state

use super::pool::{ItemId, ItemRef, Pool};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Grouping an item belongs to (pouch for kit items, zone for vehicle items)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grouping {
    pub name: String,
    pub color: String,
    /// Vehicle items may sit in a named sub-zone
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_zone: Option<String>,
}

/// Catalog entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub pool: Pool,
    pub name: String,
    pub quantity: i64,
    pub grouping: Grouping,
    pub active: bool,
    /// Soft-delete marker (kit pool only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Item {
    pub fn item_ref(&self) -> ItemRef {
        ItemRef::new(self.pool, self.id)
    }
}

/// Observed state of one item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ItemStatus {
    #[serde(alias = "vide")]
    Ok,
    #[serde(alias = "manquant")]
    Missing,
    #[serde(alias = "defaillant")]
    Failing,
}

impl ItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemStatus::Ok => "OK",
            ItemStatus::Missing => "MISSING",
            ItemStatus::Failing => "FAILING",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "OK" | "vide" => Some(ItemStatus::Ok),
            "MISSING" | "manquant" => Some(ItemStatus::Missing),
            "FAILING" | "defaillant" => Some(ItemStatus::Failing),
            _ => None,
        }
    }

    pub fn is_issue(&self) -> bool {
        !matches!(self, ItemStatus::Ok)
    }
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status + verified flag of one item
///
/// Invariant: `verified` implies `status == Ok`. The fields are private so every
/// construction and mutation goes through the normalizing setters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "VerificationParts")]
pub struct ItemVerification {
    status: ItemStatus,
    verified: bool,
}

#[derive(Deserialize)]
struct VerificationParts {
    status: ItemStatus,
    #[serde(default)]
    verified: bool,
}

impl From<VerificationParts> for ItemVerification {
    fn from(parts: VerificationParts) -> Self {
        ItemVerification::new(parts.status, parts.verified)
    }
}

impl Default for ItemVerification {
    fn default() -> Self {
        Self {
            status: ItemStatus::Ok,
            verified: false,
        }
    }
}

impl ItemVerification {
    /// Build from possibly disagreeing parts; a non-OK status wins over `verified`
    pub fn new(status: ItemStatus, verified: bool) -> Self {
        Self {
            status,
            verified: verified && status == ItemStatus::Ok,
        }
    }

    pub fn status(&self) -> ItemStatus {
        self.status
    }

    pub fn verified(&self) -> bool {
        self.verified
    }

    /// Marking verified forces OK; choosing MISSING/FAILING clears verified
    pub fn set_status(&mut self, status: ItemStatus) {
        self.status = status;
        if status.is_issue() {
            self.verified = false;
        }
    }

    pub fn set_verified(&mut self, verified: bool) {
        self.verified = verified;
        if verified {
            self.status = ItemStatus::Ok;
        }
    }

    /// Never touched: still at the default OK without the verified flag
    pub fn is_incomplete(&self) -> bool {
        self.status == ItemStatus::Ok && !self.verified
    }
}
