//! Notification dispatcher
//!
//! Emails a summary of a freshly committed record. Runs after the record's
//! transaction; its failures are logged and never reach the submitter.

pub mod template;
pub mod transport;

pub use template::{render, Placeholder, TemplateValues};
pub use transport::{HttpRelayTransport, MailMessage, MailTransport, UnconfiguredTransport};

use crate::db::{log_event, SYSTEM_ACTOR};
use crate::model::{ChecklistRecord, ItemStatus, OverallStatus};
use crate::{time, Error, Result};
use sqlx::SqlitePool;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{error, info, warn};

/// When a record triggers a notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendCondition {
    Always,
    IssuesOnly,
}

impl FromStr for SendCondition {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "always" | "all" => Ok(SendCondition::Always),
            "issues_only" | "issues" => Ok(SendCondition::IssuesOnly),
            other => Err(Error::Config(format!("Unknown send condition: {}", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationConfig {
    pub destinations: Vec<String>,
    pub send_condition: SendCondition,
    pub template: String,
    pub sender_name: String,
    pub relay_url: Option<String>,
    pub utc_offset_minutes: i32,
}

/// What [`NotificationDispatcher::dispatch`] did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Record is complete and only issues are reported
    SkippedComplete,
    SkippedNoDestination,
    Sent,
    Failed(String),
}

#[derive(Clone)]
pub struct NotificationDispatcher {
    config: NotificationConfig,
    transport: Arc<dyn MailTransport>,
    db: SqlitePool,
}

impl NotificationDispatcher {
    pub fn new(config: NotificationConfig, transport: Arc<dyn MailTransport>, db: SqlitePool) -> Self {
        Self {
            config,
            transport,
            db,
        }
    }

    /// Dispatcher delivering through the configured relay, if any
    pub fn from_config(config: NotificationConfig, db: SqlitePool) -> Result<Self> {
        let transport: Arc<dyn MailTransport> = match &config.relay_url {
            Some(url) => Arc::new(HttpRelayTransport::new(url.clone())?),
            None => Arc::new(UnconfiguredTransport),
        };
        Ok(Self::new(config, transport, db))
    }

    /// `"<emoji> [<LABEL>] Checklist #<id> (<status label>)"`, flagged when issues exist
    pub fn subject(record: &ChecklistRecord) -> String {
        let warning = match record.overall_status {
            OverallStatus::WithIssues => "⚠️ ",
            OverallStatus::Complete => "",
        };
        format!(
            "{} [{}] {}Checklist #{} ({})",
            record.pool.emoji(),
            record.pool.label(),
            warning,
            record.id,
            record.overall_status.label()
        )
    }

    pub fn render_body(&self, record: &ChecklistRecord) -> String {
        let values = TemplateValues {
            submitter: record.submitter.clone(),
            date: time::format_local_fr(&record.submitted_at, self.config.utc_offset_minutes),
            status: record.overall_status.label().to_string(),
            record_id: record.id.to_string(),
            comment: record.comment.clone(),
            missing: record.names_with_status(ItemStatus::Missing),
            failing: record.names_with_status(ItemStatus::Failing),
        };
        render(&self.config.template, &values)
    }

    /// Send the notification for `record`; never fails
    pub async fn dispatch(&self, record: &ChecklistRecord) -> DispatchOutcome {
        if self.config.send_condition == SendCondition::IssuesOnly
            && record.overall_status == OverallStatus::Complete
        {
            info!(record_id = %record.id, "Checklist complete, no notification required");
            return DispatchOutcome::SkippedComplete;
        }

        if self.config.destinations.is_empty() {
            warn!(record_id = %record.id, "No notification destination configured");
            log_event(
                &self.db,
                SYSTEM_ACTOR,
                &format!("Email non envoyé pour checklist #{} (aucun destinataire)", record.id),
            )
            .await;
            return DispatchOutcome::SkippedNoDestination;
        }

        let message = MailMessage {
            to: self.config.destinations.clone(),
            subject: Self::subject(record),
            html: self.render_body(record),
            from_name: self.config.sender_name.clone(),
        };

        match self.transport.send(&message).await {
            Ok(()) => {
                info!(
                    record_id = %record.id,
                    recipients = message.to.len(),
                    "Notification sent"
                );
                log_event(
                    &self.db,
                    SYSTEM_ACTOR,
                    &format!("Email envoyé pour checklist #{}", record.id),
                )
                .await;
                DispatchOutcome::Sent
            }
            Err(e) => {
                error!(record_id = %record.id, error = %e, "Notification delivery failed");
                log_event(
                    &self.db,
                    SYSTEM_ACTOR,
                    &format!("Échec envoi email pour checklist #{}", record.id),
                )
                .await;
                DispatchOutcome::Failed(e.to_string())
            }
        }
    }
}
