//! Session drafts
//!
//! JSON shape, namespaced per pool:
//!
//! ```json
//! { "items": { "5": { "name": "Gauze", "status": "OK", "verified": true } },
//!   "comment": "", "savedAt": "2024-01-15T14:30:00Z" }
//! ```
//!
//! Stores deal in raw text; parsing (and purging unreadable drafts) is the
//! session's job.

use crate::model::{ItemId, Pool, SnapshotEntry};
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

/// Serialized session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Draft {
    pub items: BTreeMap<ItemId, SnapshotEntry>,
    #[serde(default)]
    pub comment: String,
    pub saved_at: DateTime<Utc>,
}

impl Draft {
    /// Strictly older than `max_age`; never expires when `max_age` is `None`
    pub fn is_expired(&self, now: DateTime<Utc>, max_age: Option<Duration>) -> bool {
        let Some(max_age) = max_age else {
            return false;
        };
        match chrono::Duration::from_std(max_age) {
            Ok(max_age) => now - self.saved_at > max_age,
            Err(_) => false,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }
}

/// Device-side draft storage
#[async_trait]
pub trait DraftStore: Send + Sync {
    async fn load(&self, pool: Pool) -> Result<Option<String>>;
    async fn save(&self, pool: Pool, contents: String) -> Result<()>;
    async fn clear(&self, pool: Pool) -> Result<()>;
}

/// One JSON file per pool under a directory
#[derive(Debug, Clone)]
pub struct FileDraftStore {
    dir: PathBuf,
}

impl FileDraftStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, pool: Pool) -> PathBuf {
        self.dir
            .join(format!("checklist_draft_{}.json", pool.label().to_lowercase()))
    }
}

#[async_trait]
impl DraftStore for FileDraftStore {
    async fn load(&self, pool: Pool) -> Result<Option<String>> {
        match tokio::fs::read_to_string(self.path_for(pool)).await {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, pool: Pool, contents: String) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        // Write-then-rename so a crash never leaves half a draft behind
        let path = self.path_for(pool);
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, contents).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn clear(&self, pool: Pool) -> Result<()> {
        match tokio::fs::remove_file(self.path_for(pool)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Process-local store
#[derive(Debug, Default)]
pub struct MemoryDraftStore {
    drafts: Mutex<HashMap<Pool, String>>,
}

impl MemoryDraftStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn drafts(&self) -> std::sync::MutexGuard<'_, HashMap<Pool, String>> {
        self.drafts.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl DraftStore for MemoryDraftStore {
    async fn load(&self, pool: Pool) -> Result<Option<String>> {
        Ok(self.drafts().get(&pool).cloned())
    }

    async fn save(&self, pool: Pool, contents: String) -> Result<()> {
        self.drafts().insert(pool, contents);
        Ok(())
    }

    async fn clear(&self, pool: Pool) -> Result<()> {
        self.drafts().remove(&pool);
        Ok(())
    }
}
