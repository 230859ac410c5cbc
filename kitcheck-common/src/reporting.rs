//! Reporting aggregator
//!
//! Read model for the dashboard and the export, computed from the audit
//! tables:
//! - totals (all time, current year, current month, with issues)
//! - latest and recent records with their resolved issue lists
//! - most frequently missing/failing items
//! - export rows
//!
//! Dashboard issue lists resolve item names live (falling back to the name
//! stored at submission time); export rows use only the stored snapshot.

use crate::model::{ChecklistRecord, ItemId, ItemRef, ItemStatus, OverallStatus, Pool, RecordId};
use crate::recorder::{record_from_row, RECORD_SELECT};
use crate::resolver::ItemResolver;
use crate::time;
use crate::Result;
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};
use std::collections::{BTreeMap, HashMap};

/// Name shown when an item resolves neither live nor from the snapshot
pub const UNKNOWN_ITEM: &str = "Item inconnu";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportingSettings {
    pub top_items: usize,
    pub recent_records: usize,
    pub utc_offset_minutes: i32,
}

impl Default for ReportingSettings {
    fn default() -> Self {
        Self {
            top_items: 5,
            recent_records: 10,
            utc_offset_minutes: 60,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Totals {
    pub all_time: i64,
    pub this_year: i64,
    pub this_month: i64,
    pub with_issues: i64,
}

/// Issues of one record, names sorted
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IssueList {
    pub missing: Vec<String>,
    pub failing: Vec<String>,
    pub comment: String,
}

impl IssueList {
    pub fn is_empty(&self) -> bool {
        self.missing.is_empty() && self.failing.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordSummary {
    pub id: RecordId,
    pub submitter: String,
    pub pool: Pool,
    pub pool_label: String,
    pub overall_status: OverallStatus,
    pub status_label: String,
    pub submitted_at: DateTime<Utc>,
    pub date_display: String,
    pub issues: IssueList,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TopItem {
    pub name: String,
    pub pool: Pool,
    pub occurrences: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Dashboard {
    pub totals: Totals,
    pub latest: Option<RecordSummary>,
    pub top_items: Vec<TopItem>,
    pub recent: Vec<RecordSummary>,
}

/// Export filter; dates are inclusive whole days
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ExportFilter {
    #[serde(default)]
    pub submitter_prefix: Option<String>,
    #[serde(default)]
    pub start: Option<NaiveDate>,
    #[serde(default)]
    pub end: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportRow {
    pub record_id: RecordId,
    pub pool_label: String,
    pub submitter: String,
    pub submitted_at: DateTime<Utc>,
    pub date_display: String,
    pub status_label: String,
    pub comment: String,
    pub ok_count: usize,
    pub missing_count: usize,
    pub failing_count: usize,
    /// `"<name> (MANQUANT)"` / `"<name> (DÉFAILLANT)"`, in item order
    pub anomalies: Vec<String>,
}

impl ExportRow {
    /// Counts come from the record's own snapshot only
    pub fn from_record(record: &ChecklistRecord, utc_offset_minutes: i32) -> Self {
        let mut ok_count = 0;
        let mut missing_count = 0;
        let mut failing_count = 0;
        let mut anomalies = Vec::new();

        for entry in record.snapshot.values() {
            match entry.status() {
                ItemStatus::Ok if entry.verification.verified() => ok_count += 1,
                ItemStatus::Ok => {}
                ItemStatus::Missing => {
                    missing_count += 1;
                    anomalies.push(format!("{} (MANQUANT)", entry.name));
                }
                ItemStatus::Failing => {
                    failing_count += 1;
                    anomalies.push(format!("{} (DÉFAILLANT)", entry.name));
                }
            }
        }

        Self {
            record_id: record.id,
            pool_label: record.pool.label().to_string(),
            submitter: record.submitter.clone(),
            submitted_at: record.submitted_at,
            date_display: time::format_local_fr(&record.submitted_at, utc_offset_minutes),
            status_label: record.overall_status.label().to_string(),
            comment: record.comment.clone(),
            ok_count,
            missing_count,
            failing_count,
            anomalies,
        }
    }
}

#[derive(Clone)]
pub struct ReportingAggregator {
    db: SqlitePool,
    resolver: ItemResolver,
    settings: ReportingSettings,
}

impl ReportingAggregator {
    pub fn new(db: SqlitePool, resolver: ItemResolver, settings: ReportingSettings) -> Self {
        Self {
            db,
            resolver,
            settings,
        }
    }

    /// Full dashboard read model
    pub async fn dashboard(&self, now: DateTime<Utc>) -> Result<Dashboard> {
        let totals = self.totals(now).await?;
        let recent = self.recent(self.settings.recent_records.max(1)).await?;
        let latest = recent.first().cloned();
        let mut recent = recent;
        recent.truncate(self.settings.recent_records);
        let top_items = self.top_items(self.settings.top_items).await?;

        Ok(Dashboard {
            totals,
            latest,
            top_items,
            recent,
        })
    }

    pub async fn totals(&self, now: DateTime<Utc>) -> Result<Totals> {
        let year_start = NaiveDate::from_ymd_opt(now.year(), 1, 1);
        let year_end = NaiveDate::from_ymd_opt(now.year() + 1, 1, 1);
        let month_start = NaiveDate::from_ymd_opt(now.year(), now.month(), 1);
        let month_end = month_start.and_then(|d| d.checked_add_months(chrono::Months::new(1)));

        Ok(Totals {
            all_time: self.count_between(None, None).await?,
            this_year: self.count_between(year_start, year_end).await?,
            this_month: self.count_between(month_start, month_end).await?,
            with_issues: sqlx::query_scalar(
                "SELECT COUNT(*) FROM checklist_records WHERE overall_status = ?",
            )
            .bind(OverallStatus::WithIssues.as_str())
            .fetch_one(&self.db)
            .await?,
        })
    }

    /// Records in `[start, end)`
    async fn count_between(&self, start: Option<NaiveDate>, end: Option<NaiveDate>) -> Result<i64> {
        let lo = start.map(|d| format!("{} 00:00:00", d.format("%Y-%m-%d")));
        let hi = end.map(|d| format!("{} 00:00:00", d.format("%Y-%m-%d")));

        let count = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM checklist_records
            WHERE (?1 IS NULL OR submitted_at >= ?1)
              AND (?2 IS NULL OR submitted_at < ?2)
            "#,
        )
        .bind(lo)
        .bind(hi)
        .fetch_one(&self.db)
        .await?;

        Ok(count)
    }

    /// Most recent records, newest first, with resolved issue lists
    pub async fn recent(&self, limit: usize) -> Result<Vec<RecordSummary>> {
        let rows = sqlx::query(&format!(
            "{} ORDER BY submitted_at DESC, id DESC LIMIT ?",
            RECORD_SELECT
        ))
        .bind(limit as i64)
        .fetch_all(&self.db)
        .await?;

        let mut summaries = Vec::with_capacity(rows.len());
        for row in &rows {
            let record = record_from_row(row)?;
            summaries.push(self.summarize(&record).await?);
        }
        Ok(summaries)
    }

    pub async fn summarize(&self, record: &ChecklistRecord) -> Result<RecordSummary> {
        Ok(RecordSummary {
            id: record.id,
            submitter: record.submitter.clone(),
            pool: record.pool,
            pool_label: record.pool.label().to_string(),
            overall_status: record.overall_status,
            status_label: record.overall_status.label().to_string(),
            submitted_at: record.submitted_at,
            date_display: time::format_local_short(
                &record.submitted_at,
                self.settings.utc_offset_minutes,
            ),
            issues: self.issue_list(record).await?,
        })
    }

    /// Missing/failing names of one record
    ///
    /// Names resolve against the record's own pool; a miss falls back to the
    /// stored snapshot name.
    pub async fn issue_list(&self, record: &ChecklistRecord) -> Result<IssueList> {
        let rows: Vec<(i64, String)> = sqlx::query_as(
            r#"
            SELECT item_id, observed_status FROM checklist_record_items
            WHERE record_id = ? AND observed_status IN ('MISSING', 'FAILING')
            "#,
        )
        .bind(record.id.0)
        .fetch_all(&self.db)
        .await?;

        let mut issues = IssueList {
            comment: record.comment.clone(),
            ..IssueList::default()
        };

        for (item_id, status) in rows {
            let item_id = ItemId(item_id);
            let fallback = record.snapshot_name(item_id).unwrap_or(UNKNOWN_ITEM);
            let name = self.resolver.name_or(record.item_ref(item_id), fallback).await?;

            match ItemStatus::parse(&status) {
                Some(ItemStatus::Missing) => issues.missing.push(name),
                Some(ItemStatus::Failing) => issues.failing.push(name),
                _ => {}
            }
        }

        issues.missing.sort();
        issues.failing.sort();
        Ok(issues)
    }

    /// Items most often MISSING/FAILING across records with issues
    ///
    /// Grouped by (resolved name, pool); count descending, then name ascending.
    pub async fn top_items(&self, limit: usize) -> Result<Vec<TopItem>> {
        let rows = sqlx::query(
            r#"
            SELECT r.pool, i.item_id, COUNT(*) AS occurrences, MAX(r.id) AS last_record
            FROM checklist_record_items i
            JOIN checklist_records r ON r.id = i.record_id
            WHERE r.overall_status = 'WITH_ISSUES'
              AND i.observed_status IN ('MISSING', 'FAILING')
            GROUP BY r.pool, i.item_id
            "#,
        )
        .fetch_all(&self.db)
        .await?;

        let mut grouped: BTreeMap<(String, Pool), i64> = BTreeMap::new();

        for row in rows {
            let pool: Pool = row.try_get::<String, _>("pool")?.parse()?;
            let item = ItemRef::new(pool, ItemId(row.try_get("item_id")?));
            let occurrences: i64 = row.try_get("occurrences")?;

            let name = match self.resolver.resolve(item).await? {
                Some(resolved) => resolved.name,
                None => self
                    .snapshot_name(RecordId(row.try_get("last_record")?), item.id)
                    .await?
                    .unwrap_or_else(|| UNKNOWN_ITEM.to_string()),
            };

            *grouped.entry((name, pool)).or_insert(0) += occurrences;
        }

        let mut top: Vec<TopItem> = grouped
            .into_iter()
            .map(|((name, pool), occurrences)| TopItem {
                name,
                pool,
                occurrences,
            })
            .collect();

        // Stable sort keeps the (name, pool) order among equal counts
        top.sort_by(|a, b| b.occurrences.cmp(&a.occurrences));
        top.truncate(limit);
        Ok(top)
    }

    async fn snapshot_name(&self, record: RecordId, item: ItemId) -> Result<Option<String>> {
        let json: Option<String> =
            sqlx::query_scalar("SELECT snapshot_json FROM checklist_records WHERE id = ?")
                .bind(record.0)
                .fetch_optional(&self.db)
                .await?;

        let Some(json) = json else {
            return Ok(None);
        };
        let snapshot: HashMap<ItemId, crate::model::SnapshotEntry> = serde_json::from_str(&json)?;
        Ok(snapshot.get(&item).map(|e| e.name.clone()))
    }

    /// Export rows, newest first
    ///
    /// The submitter filter is a prefix match; the date range covers the whole
    /// end day.
    pub async fn export_rows(&self, filter: &ExportFilter) -> Result<Vec<ExportRow>> {
        let (lo, hi) = time::day_range_bounds(filter.start, filter.end);
        let prefix = filter
            .submitter_prefix
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(|p| format!("{}%", escape_like(p)));

        let rows = sqlx::query(&format!(
            r#"{}
            WHERE (?1 IS NULL OR submitter LIKE ?1 ESCAPE '\')
              AND (?2 IS NULL OR submitted_at >= ?2)
              AND (?3 IS NULL OR submitted_at < ?3)
            ORDER BY submitted_at DESC, id DESC"#,
            RECORD_SELECT
        ))
        .bind(prefix)
        .bind(lo)
        .bind(hi)
        .fetch_all(&self.db)
        .await?;

        rows.iter()
            .map(|row| {
                record_from_row(row)
                    .map(|record| ExportRow::from_record(&record, self.settings.utc_offset_minutes))
            })
            .collect()
    }
}

fn escape_like(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::test_fixtures::*;
    use crate::db::init_memory_database;
    use crate::model::{ItemVerification, SnapshotEntry, SubmissionSnapshot};
    use crate::recorder::AuditRecorder;
    use crate::validator::{validate, ValidationPolicy};
    use chrono::TimeZone;

    struct Fixture {
        db: SqlitePool,
        recorder: AuditRecorder,
        reporting: ReportingAggregator,
    }

    async fn fixture() -> Fixture {
        let db = init_memory_database().await.unwrap();
        let resolver = ItemResolver::new(db.clone());
        Fixture {
            recorder: AuditRecorder::new(db.clone(), resolver.clone()),
            reporting: ReportingAggregator::new(db.clone(), resolver, ReportingSettings::default()),
            db,
        }
    }

    impl Fixture {
        async fn record(
            &self,
            pool: Pool,
            submitter: &str,
            at: DateTime<Utc>,
            entries: &[(i64, &str, ItemStatus, bool)],
        ) -> RecordId {
            let items = entries
                .iter()
                .map(|(id, name, status, verified)| {
                    (
                        ItemId(*id),
                        SnapshotEntry::new(*name, ItemVerification::new(*status, *verified)),
                    )
                })
                .collect();
            let validated = validate(
                SubmissionSnapshot {
                    pool,
                    submitter: submitter.to_string(),
                    comment: String::new(),
                    items,
                },
                &ValidationPolicy::default(),
            )
            .unwrap();
            self.recorder.record_at(validated, at).await.unwrap()
        }
    }

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, s).unwrap()
    }

    #[tokio::test]
    async fn test_top_items_rank_by_count_per_pool() {
        let f = fixture().await;
        let tourniquet = kit_item(&f.db, "Tourniquet", None, 1).await;
        let mask = vehicle_item(&f.db, "Oxygen Mask", None, None, 1).await;
        assert_eq!(tourniquet, mask);

        let when = at(2024, 3, 1, 10, 0, 0);
        f.record(Pool::Kit, "a", when, &[(tourniquet, "Tourniquet", ItemStatus::Missing, false)])
            .await;
        f.record(Pool::Kit, "b", when, &[(tourniquet, "Tourniquet", ItemStatus::Failing, false)])
            .await;
        f.record(Pool::Vehicle, "c", when, &[(mask, "Oxygen Mask", ItemStatus::Missing, false)])
            .await;

        let top = f.reporting.top_items(5).await.unwrap();
        assert_eq!(
            top,
            vec![
                TopItem {
                    name: "Tourniquet".to_string(),
                    pool: Pool::Kit,
                    occurrences: 2
                },
                TopItem {
                    name: "Oxygen Mask".to_string(),
                    pool: Pool::Vehicle,
                    occurrences: 1
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_top_items_ties_break_by_name_and_truncate() {
        let f = fixture().await;
        let when = at(2024, 3, 1, 10, 0, 0);
        f.record(
            Pool::Kit,
            "a",
            when,
            &[
                (1, "Zinc tape", ItemStatus::Missing, false),
                (2, "Bandage", ItemStatus::Missing, false),
                (3, "Mask", ItemStatus::Missing, false),
            ],
        )
        .await;

        let top = f.reporting.top_items(2).await.unwrap();
        let names: Vec<&str> = top.iter().map(|t| t.name.as_str()).collect();
        // Ids 1-3 no longer exist in the catalog: snapshot names are used
        assert_eq!(names, vec!["Bandage", "Mask"]);
    }

    #[tokio::test]
    async fn test_issue_list_prefers_live_name_then_snapshot() {
        let f = fixture().await;
        let renamed = kit_item(&f.db, "Tourniquet CAT", None, 1).await;
        let id = f
            .record(
                Pool::Kit,
                "alice",
                at(2024, 3, 1, 10, 0, 0),
                &[
                    (renamed, "Tourniquet", ItemStatus::Missing, false),
                    (77, "Old splint", ItemStatus::Failing, false),
                    (78, "Gauze", ItemStatus::Ok, true),
                ],
            )
            .await;

        let record = f.recorder.fetch_record(id).await.unwrap();
        let issues = f.reporting.issue_list(&record).await.unwrap();
        assert_eq!(issues.missing, vec!["Tourniquet CAT".to_string()]);
        assert_eq!(issues.failing, vec!["Old splint".to_string()]);
    }

    #[tokio::test]
    async fn test_export_range_covers_whole_end_day() {
        let f = fixture().await;
        let ok = [(1, "Gauze", ItemStatus::Ok, true)];
        let inside = f.record(Pool::Kit, "alice", at(2024, 1, 31, 23, 59, 59), &ok).await;
        f.record(Pool::Kit, "alice", at(2024, 2, 1, 0, 0, 1), &ok).await;
        let first = f.record(Pool::Kit, "alice", at(2024, 1, 1, 0, 0, 0), &ok).await;
        f.record(Pool::Kit, "alice", at(2023, 12, 31, 23, 59, 59), &ok).await;

        let rows = f
            .reporting
            .export_rows(&ExportFilter {
                submitter_prefix: None,
                start: NaiveDate::from_ymd_opt(2024, 1, 1),
                end: NaiveDate::from_ymd_opt(2024, 1, 31),
            })
            .await
            .unwrap();

        let ids: Vec<RecordId> = rows.iter().map(|r| r.record_id).collect();
        assert_eq!(ids, vec![inside, first]);
    }

    #[tokio::test]
    async fn test_export_counts_from_snapshot() {
        let f = fixture().await;
        f.record(
            Pool::Vehicle,
            "bob",
            at(2024, 1, 15, 13, 30, 0),
            &[
                (1, "Oxygen", ItemStatus::Ok, true),
                (2, "Defib pads", ItemStatus::Missing, false),
                (3, "Suction", ItemStatus::Failing, false),
                (4, "Blanket", ItemStatus::Ok, true),
            ],
        )
        .await;

        let rows = f.reporting.export_rows(&ExportFilter::default()).await.unwrap();
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!((row.ok_count, row.missing_count, row.failing_count), (2, 1, 1));
        assert_eq!(
            row.anomalies,
            vec!["Defib pads (MANQUANT)".to_string(), "Suction (DÉFAILLANT)".to_string()]
        );
        assert_eq!(row.pool_label, "AMBU");
        assert_eq!(row.status_label, "Avec problèmes");
        assert_eq!(row.date_display, "lundi 15 janvier 2024 à 14h30");
    }

    #[tokio::test]
    async fn test_export_submitter_prefix_is_literal() {
        let f = fixture().await;
        let ok = [(1, "Gauze", ItemStatus::Ok, true)];
        let when = at(2024, 1, 15, 13, 30, 0);
        let alice = f.record(Pool::Kit, "alice", when, &ok).await;
        f.record(Pool::Kit, "bob", when, &ok).await;
        f.record(Pool::Kit, "al_x", when, &ok).await;

        let rows = f
            .reporting
            .export_rows(&ExportFilter {
                submitter_prefix: Some("ali".to_string()),
                ..ExportFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(rows.iter().map(|r| r.record_id).collect::<Vec<_>>(), vec![alice]);

        let rows = f
            .reporting
            .export_rows(&ExportFilter {
                submitter_prefix: Some("al_".to_string()),
                ..ExportFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].submitter, "al_x");
    }

    #[tokio::test]
    async fn test_dashboard_totals_and_latest() {
        let f = fixture().await;
        let ok = [(1, "Gauze", ItemStatus::Ok, true)];
        let bad = [(1, "Gauze", ItemStatus::Missing, false)];
        f.record(Pool::Kit, "a", at(2023, 6, 1, 8, 0, 0), &ok).await;
        f.record(Pool::Kit, "b", at(2024, 1, 10, 8, 0, 0), &bad).await;
        f.record(Pool::Vehicle, "c", at(2024, 3, 2, 8, 0, 0), &ok).await;
        let latest = f.record(Pool::Kit, "d", at(2024, 3, 20, 8, 0, 0), &bad).await;

        let dashboard = f.reporting.dashboard(at(2024, 3, 25, 12, 0, 0)).await.unwrap();
        assert_eq!(
            dashboard.totals,
            Totals {
                all_time: 4,
                this_year: 3,
                this_month: 2,
                with_issues: 2,
            }
        );

        let latest_summary = dashboard.latest.unwrap();
        assert_eq!(latest_summary.id, latest);
        assert_eq!(latest_summary.issues.missing, vec!["Gauze".to_string()]);
        assert_eq!(dashboard.recent.len(), 4);
        assert_eq!(dashboard.top_items[0].occurrences, 2);
    }

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("a_b%c\\"), "a\\_b\\%c\\\\");
    }
}
