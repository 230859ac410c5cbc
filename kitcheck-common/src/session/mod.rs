//! Verification sessions
//!
//! A [`VerificationSession`] is one operator's in-progress check of one pool.
//! It is seeded from the live catalog, mutated item by item, and mirrored to a
//! [`Draft`] so an interrupted check can be picked up again.
//!
//! - [`draft`]: draft format, expiry and storage backends
//! - [`handle`]: shared session handle with draft saves, autosave and submission

pub mod draft;
pub mod handle;

pub use draft::{Draft, DraftStore, FileDraftStore, MemoryDraftStore};
pub use handle::{AutosaveGuard, SessionHandle, SubmitReceipt};

use crate::model::{
    Item, ItemId, ItemStatus, ItemVerification, Pool, SnapshotEntry, SubmissionSnapshot,
};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{info, warn};

/// Session and draft settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSettings {
    pub autosave_interval: Duration,
    /// `None` disables draft expiry
    pub draft_max_age: Option<Duration>,
    /// Comment length limit, in characters
    pub max_comment_length: usize,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            autosave_interval: Duration::from_secs(30),
            draft_max_age: Some(Duration::from_secs(30 * 60)),
            max_comment_length: 1000,
        }
    }
}

/// What happened to the stored draft when a session was opened
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestoreReport {
    NoDraft,
    /// Older than the maximum age; discarded without merging anything
    Expired { saved_at: DateTime<Utc> },
    /// Unreadable; purged
    Corrupt,
    Restored {
        merged: usize,
        /// Draft items no longer in the live catalog
        dropped: Vec<ItemId>,
    },
}

/// In-memory state of one check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationSession {
    pool: Pool,
    operator: String,
    items: BTreeMap<ItemId, SnapshotEntry>,
    comment: String,
    max_comment_length: usize,
}

impl VerificationSession {
    /// Seed every active catalog item as OK/unverified
    pub fn open(pool: Pool, operator: impl Into<String>, items: &[Item], settings: &SessionSettings) -> Self {
        let items = items
            .iter()
            .filter(|item| item.pool == pool)
            .map(|item| {
                (
                    item.id,
                    SnapshotEntry::new(item.name.clone(), ItemVerification::default()),
                )
            })
            .collect();

        Self {
            pool,
            operator: operator.into(),
            items,
            comment: String::new(),
            max_comment_length: settings.max_comment_length,
        }
    }

    pub fn pool(&self) -> Pool {
        self.pool
    }

    pub fn operator(&self) -> &str {
        &self.operator
    }

    pub fn comment(&self) -> &str {
        &self.comment
    }

    pub fn verification(&self, id: ItemId) -> Option<ItemVerification> {
        self.items.get(&id).map(|e| e.verification)
    }

    pub fn items(&self) -> &BTreeMap<ItemId, SnapshotEntry> {
        &self.items
    }

    /// MISSING/FAILING clears the verified flag
    pub fn set_status(&mut self, id: ItemId, status: ItemStatus) -> Result<()> {
        self.entry_mut(id)?.verification.set_status(status);
        Ok(())
    }

    /// Verifying forces OK
    pub fn set_verified(&mut self, id: ItemId, verified: bool) -> Result<()> {
        self.entry_mut(id)?.verification.set_verified(verified);
        Ok(())
    }

    /// Store the comment, truncated to the configured length
    pub fn set_comment(&mut self, comment: &str) {
        self.comment = truncate_chars(comment, self.max_comment_length);
    }

    /// Every item back to OK/unverified, comment cleared
    pub fn reset(&mut self) {
        for entry in self.items.values_mut() {
            entry.verification = ItemVerification::default();
        }
        self.comment.clear();
    }

    /// Nothing worth saving
    pub fn is_empty(&self) -> bool {
        self.items.is_empty() && self.comment.trim().is_empty()
    }

    pub fn snapshot(&self) -> SubmissionSnapshot {
        SubmissionSnapshot {
            pool: self.pool,
            submitter: self.operator.clone(),
            comment: self.comment.clone(),
            items: self.items.clone(),
        }
    }

    /// Full serialization of the current state
    pub fn to_draft(&self, saved_at: DateTime<Utc>) -> Draft {
        Draft {
            items: self.items.clone(),
            comment: self.comment.clone(),
            saved_at,
        }
    }

    /// Merge a stored draft into the freshly seeded session
    ///
    /// An expired draft is not merged at all. Otherwise only items present in
    /// the live catalog take the draft's state; the others are dropped.
    pub fn restore(&mut self, draft: Draft, now: DateTime<Utc>, max_age: Option<Duration>) -> RestoreReport {
        if draft.is_expired(now, max_age) {
            info!(
                pool = %self.pool,
                saved_at = %draft.saved_at,
                "Draft expired, starting a fresh session"
            );
            return RestoreReport::Expired {
                saved_at: draft.saved_at,
            };
        }

        let mut merged = 0;
        let mut dropped = Vec::new();

        for (id, stored) in draft.items {
            match self.items.get_mut(&id) {
                Some(entry) => {
                    entry.verification = stored.verification;
                    merged += 1;
                }
                None => dropped.push(id),
            }
        }

        if !dropped.is_empty() {
            warn!(
                pool = %self.pool,
                dropped = ?dropped,
                "Draft references items no longer in the catalog; ignored"
            );
        }

        self.set_comment(&draft.comment);

        RestoreReport::Restored { merged, dropped }
    }

    fn entry_mut(&mut self, id: ItemId) -> Result<&mut SnapshotEntry> {
        let pool = self.pool;
        self.items
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("Item {} is not part of this {} session", id, pool)))
    }
}

fn truncate_chars(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => s[..byte_idx].to_string(),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Grouping;
    use chrono::Duration as ChronoDuration;

    fn item(id: i64, name: &str) -> Item {
        Item {
            id: ItemId(id),
            pool: Pool::Kit,
            name: name.to_string(),
            quantity: 1,
            grouping: Grouping {
                name: "Trauma".to_string(),
                color: "#FFFFFF".to_string(),
                sub_zone: None,
            },
            active: true,
            deleted_at: None,
        }
    }

    fn session() -> VerificationSession {
        VerificationSession::open(
            Pool::Kit,
            "alice",
            &[item(1, "Gauze"), item(2, "Splint"), item(3, "Tourniquet")],
            &SessionSettings::default(),
        )
    }

    #[test]
    fn test_open_seeds_ok_unverified() {
        let s = session();
        assert_eq!(s.items().len(), 3);
        assert!(s.items().values().all(|e| e.verification.is_incomplete()));
    }

    #[test]
    fn test_mutations_keep_invariant() {
        let mut s = session();
        s.set_status(ItemId(1), ItemStatus::Missing).unwrap();
        s.set_verified(ItemId(1), true).unwrap();
        assert_eq!(s.verification(ItemId(1)), Some(ItemVerification::new(ItemStatus::Ok, true)));

        s.set_status(ItemId(1), ItemStatus::Failing).unwrap();
        assert_eq!(
            s.verification(ItemId(1)),
            Some(ItemVerification::new(ItemStatus::Failing, false))
        );
    }

    #[test]
    fn test_unknown_item_rejected() {
        let mut s = session();
        assert!(matches!(
            s.set_verified(ItemId(99), true),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_comment_truncated_on_char_boundary() {
        let mut s = VerificationSession::open(
            Pool::Kit,
            "alice",
            &[],
            &SessionSettings {
                max_comment_length: 4,
                ..SessionSettings::default()
            },
        );
        s.set_comment("éàçüx");
        assert_eq!(s.comment(), "éàçü");
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut s = session();
        s.set_verified(ItemId(2), true).unwrap();
        s.set_comment("checked twice");
        s.reset();
        assert_eq!(s, session());
    }

    #[test]
    fn test_restore_merges_only_live_items() {
        let now = Utc::now();
        let mut previous = session();
        previous.set_verified(ItemId(1), true).unwrap();
        previous.set_status(ItemId(3), ItemStatus::Missing).unwrap();
        previous.set_comment("restock gauze");
        let mut draft = previous.to_draft(now - ChronoDuration::minutes(29));
        draft.items.insert(
            ItemId(42),
            SnapshotEntry::new("Removed", ItemVerification::new(ItemStatus::Ok, true)),
        );

        // Item 3 was removed from the catalog in the meantime
        let mut s = VerificationSession::open(
            Pool::Kit,
            "alice",
            &[item(1, "Gauze"), item(2, "Splint")],
            &SessionSettings::default(),
        );
        let report = s.restore(draft, now, Some(Duration::from_secs(30 * 60)));

        assert_eq!(
            report,
            RestoreReport::Restored {
                merged: 1,
                dropped: vec![ItemId(3), ItemId(42)],
            }
        );
        assert!(s.verification(ItemId(1)).unwrap().verified());
        assert!(s.verification(ItemId(2)).unwrap().is_incomplete());
        assert_eq!(s.verification(ItemId(3)), None);
        assert_eq!(s.comment(), "restock gauze");
    }

    #[test]
    fn test_restore_expired_draft_merges_nothing() {
        let now = Utc::now();
        let mut previous = session();
        previous.set_verified(ItemId(1), true).unwrap();
        let draft = previous.to_draft(now - ChronoDuration::minutes(31));

        let mut s = session();
        let report = s.restore(draft, now, Some(Duration::from_secs(30 * 60)));

        assert!(matches!(report, RestoreReport::Expired { .. }));
        assert_eq!(s, session());
    }
}
