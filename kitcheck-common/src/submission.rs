//! Submission contract and client
//!
//! Request `{ items: { id: { name, status, verified } }, comment, date }`,
//! response `{ success, recordId, message, status }`.
//!
//! Any structurally valid response counts as locally complete on the device;
//! [`SubmitOutcome`] keeps the distinction between a persisted record and a
//! local-only completion explicit.

use crate::model::{
    ItemId, ItemStatus, ItemVerification, OverallStatus, Pool, RecordId, SnapshotEntry,
    SubmissionSnapshot,
};
use crate::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, warn};

/// Header carrying the operator name
pub const OPERATOR_HEADER: &str = "X-Operator";

/// Header carrying the operator role
pub const OPERATOR_ROLE_HEADER: &str = "X-Operator-Role";

/// One item of a submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmittedItem {
    /// Name as seen by the operator; resolved server-side when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub status: ItemStatus,
    #[serde(default)]
    pub verified: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionRequest {
    pub items: BTreeMap<ItemId, SubmittedItem>,
    #[serde(default)]
    pub comment: String,
    /// Device clock at submission; informational only
    #[serde(default)]
    pub date: Option<DateTime<Utc>>,
}

impl SubmissionRequest {
    pub fn from_snapshot(snapshot: &SubmissionSnapshot, date: DateTime<Utc>) -> Self {
        let items = snapshot
            .items
            .iter()
            .map(|(id, entry)| {
                (
                    *id,
                    SubmittedItem {
                        name: Some(entry.name.clone()),
                        status: entry.status(),
                        verified: entry.verification.verified(),
                    },
                )
            })
            .collect();

        Self {
            items,
            comment: snapshot.comment.clone(),
            date: Some(date),
        }
    }

    /// Snapshot for validation and recording
    ///
    /// Disagreeing status/verified pairs are normalized; absent names are left
    /// empty for the recorder to resolve.
    pub fn into_snapshot(self, pool: Pool, submitter: impl Into<String>) -> SubmissionSnapshot {
        let items = self
            .items
            .into_iter()
            .map(|(id, item)| {
                (
                    id,
                    SnapshotEntry::new(
                        item.name.unwrap_or_default(),
                        ItemVerification::new(item.status, item.verified),
                    ),
                )
            })
            .collect();

        SubmissionSnapshot {
            pool,
            submitter: submitter.into(),
            comment: self.comment,
            items,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionResponse {
    pub success: bool,
    #[serde(default)]
    pub record_id: Option<i64>,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub status: Option<OverallStatus>,
}

impl SubmissionResponse {
    pub fn persisted(id: RecordId, status: OverallStatus) -> Self {
        Self {
            success: true,
            record_id: Some(id.0),
            message: "Checklist enregistrée".to_string(),
            status: Some(status),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            record_id: None,
            message: message.into(),
            status: None,
        }
    }
}

/// Why a submission completed only locally
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocalOnlyCause {
    /// The server answered but did not persist a record
    Rejected(String),
    /// No usable answer
    Transport(String),
}

/// Two-tier submission result surfaced to the operator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    Persisted(RecordId),
    LocalOnly { cause: LocalOnlyCause },
}

impl SubmitOutcome {
    pub fn from_response(result: Result<SubmissionResponse>) -> Self {
        match result {
            Ok(SubmissionResponse {
                success: true,
                record_id: Some(id),
                ..
            }) => SubmitOutcome::Persisted(RecordId(id)),
            Ok(response) => SubmitOutcome::LocalOnly {
                cause: LocalOnlyCause::Rejected(response.message),
            },
            Err(e) => SubmitOutcome::LocalOnly {
                cause: LocalOnlyCause::Transport(e.to_string()),
            },
        }
    }

    pub fn record_id(&self) -> Option<RecordId> {
        match self {
            SubmitOutcome::Persisted(id) => Some(*id),
            SubmitOutcome::LocalOnly { .. } => None,
        }
    }

    /// Message shown to the operator
    pub fn user_message(&self) -> String {
        match self {
            SubmitOutcome::Persisted(id) => format!("Checklist #{} enregistrée.", id),
            SubmitOutcome::LocalOnly { .. } => {
                "Checklist validée localement. L'enregistrement et la notification seront traités au mieux.".to_string()
            }
        }
    }
}

/// Delivers a submission to the audit service
#[async_trait]
pub trait Submitter: Send + Sync {
    /// `Err` only when no structurally valid response came back
    async fn submit(
        &self,
        pool: Pool,
        operator: &str,
        request: &SubmissionRequest,
    ) -> Result<SubmissionResponse>;
}

/// HTTP client for `POST /api/checklists/:pool`
#[derive(Debug, Clone)]
pub struct SubmissionClient {
    http_client: reqwest::Client,
    base_url: String,
}

impl SubmissionClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| Error::Transport(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn endpoint(&self, pool: Pool) -> String {
        format!("{}/api/checklists/{}", self.base_url, pool.as_str().to_lowercase())
    }
}

#[async_trait]
impl Submitter for SubmissionClient {
    async fn submit(
        &self,
        pool: Pool,
        operator: &str,
        request: &SubmissionRequest,
    ) -> Result<SubmissionResponse> {
        let url = self.endpoint(pool);
        debug!(url = %url, items = request.items.len(), "Posting checklist");

        let response = self
            .http_client
            .post(&url)
            .header(OPERATOR_HEADER, operator)
            .json(request)
            .send()
            .await
            .map_err(|e| Error::Transport(e.to_string()))?;

        let http_status = response.status();
        let body = response
            .json::<SubmissionResponse>()
            .await
            .map_err(|e| Error::Transport(format!("HTTP {}: {}", http_status, e)))?;

        if !body.success {
            warn!(status = %http_status, message = %body.message, "Server did not record checklist");
        }

        Ok(body)
    }
}
