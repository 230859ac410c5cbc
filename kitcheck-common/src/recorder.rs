//! Audit recorder
//!
//! Writes one `checklist_records` row plus one `checklist_record_items` row
//! per item, in a single transaction. Records are insert-only.
//!
//! The record keeps a JSON snapshot of every item *with its name at
//! submission time*, so later catalog renames or deletions never rewrite
//! history.

use crate::db::log_event;
use crate::model::{
    ChecklistRecord, ItemId, ItemRef, OverallStatus, Pool, RecordId, SnapshotEntry,
    SubmissionSnapshot,
};
use crate::resolver::ItemResolver;
use crate::validator::ValidatedSubmission;
use crate::{time, Error, Result};
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::collections::BTreeMap;

/// Name stored for an item that carried no name and no longer resolves
pub fn unknown_item_name(id: ItemId) -> String {
    format!("Nom inconnu (ID: {})", id)
}

#[derive(Clone)]
pub struct AuditRecorder {
    db: SqlitePool,
    resolver: ItemResolver,
}

impl AuditRecorder {
    pub fn new(db: SqlitePool, resolver: ItemResolver) -> Self {
        Self { db, resolver }
    }

    /// Fill in missing item names from the snapshot's own pool
    pub async fn complete_names(&self, snapshot: &mut SubmissionSnapshot) -> Result<()> {
        let pool = snapshot.pool;
        for (id, entry) in snapshot.items.iter_mut() {
            if entry.name.trim().is_empty() {
                entry.name = self
                    .resolver
                    .name_or(ItemRef::new(pool, *id), unknown_item_name(*id))
                    .await?;
            }
        }
        Ok(())
    }

    /// Persist a validated submission, timestamped now
    pub async fn record(&self, submission: ValidatedSubmission) -> Result<RecordId> {
        self.record_at(submission, time::now()).await
    }

    /// Persist a validated submission with an explicit timestamp
    ///
    /// Returns the new record id. On error nothing was committed.
    pub async fn record_at(
        &self,
        submission: ValidatedSubmission,
        submitted_at: DateTime<Utc>,
    ) -> Result<RecordId> {
        let overall_status = submission.overall_status();
        let mut snapshot = submission.into_snapshot();

        // Resolved before the transaction opens so lookups never wait on it
        self.complete_names(&mut snapshot)
            .await
            .map_err(|e| Error::Persistence(e.to_string()))?;

        let id = self
            .insert(&snapshot, overall_status, submitted_at)
            .await
            .map_err(|e| {
                tracing::error!(
                    submitter = %snapshot.submitter,
                    pool = %snapshot.pool,
                    error = %e,
                    "Checklist record transaction failed"
                );
                Error::Persistence(e.to_string())
            })?;

        tracing::info!(
            record_id = %id,
            pool = %snapshot.pool,
            submitter = %snapshot.submitter,
            status = overall_status.as_str(),
            items = snapshot.items.len(),
            "Checklist recorded"
        );

        log_event(
            &self.db,
            &snapshot.submitter,
            &format!("Validation checklist [{}] #{}", snapshot.pool.label(), id),
        )
        .await;

        Ok(id)
    }

    async fn insert(
        &self,
        snapshot: &SubmissionSnapshot,
        overall_status: OverallStatus,
        submitted_at: DateTime<Utc>,
    ) -> Result<RecordId> {
        let snapshot_json = serde_json::to_string(&snapshot.items)?;

        let mut tx = self.db.begin().await?;

        let record_id = sqlx::query(
            r#"
            INSERT INTO checklist_records (
                submitter, pool, overall_status, comment, snapshot_json, submitted_at
            )
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&snapshot.submitter)
        .bind(snapshot.pool.label())
        .bind(overall_status.as_str())
        .bind(&snapshot.comment)
        .bind(&snapshot_json)
        .bind(time::to_storage(&submitted_at))
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        for (item_id, entry) in &snapshot.items {
            sqlx::query(
                "INSERT INTO checklist_record_items (record_id, item_id, observed_status) VALUES (?, ?, ?)",
            )
            .bind(record_id)
            .bind(item_id.0)
            .bind(entry.status().as_str())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        tracing::debug!(record_id, item_rows = snapshot.items.len(), "Committed checklist record");

        Ok(RecordId(record_id))
    }

    /// Load one record
    pub async fn fetch_record(&self, id: RecordId) -> Result<ChecklistRecord> {
        let row = sqlx::query(&format!("{} WHERE id = ?", RECORD_SELECT))
            .bind(id.0)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Checklist record {}", id)))?;

        record_from_row(&row)
    }
}

pub(crate) const RECORD_SELECT: &str = "SELECT id, submitter, pool, overall_status, comment, snapshot_json, submitted_at FROM checklist_records";

pub(crate) fn record_from_row(row: &SqliteRow) -> Result<ChecklistRecord> {
    let pool: String = row.try_get("pool")?;
    let status: String = row.try_get("overall_status")?;
    let snapshot_json: String = row.try_get("snapshot_json")?;
    let submitted_at: String = row.try_get("submitted_at")?;

    let snapshot: BTreeMap<ItemId, SnapshotEntry> = serde_json::from_str(&snapshot_json)?;

    Ok(ChecklistRecord {
        id: RecordId(row.try_get("id")?),
        submitter: row.try_get("submitter")?,
        pool: pool.parse::<Pool>()?,
        overall_status: OverallStatus::parse(&status)
            .ok_or_else(|| Error::Internal(format!("Invalid stored status '{}'", status)))?,
        comment: row.try_get("comment")?,
        snapshot,
        submitted_at: time::from_storage(&submitted_at)?,
    })
}
