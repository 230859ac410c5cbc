//! Shared session handle
//!
//! Operator edits, the autosave timer and the exit hook all act on the same
//! session through this handle. Each of them writes the full current state,
//! so whichever runs last leaves a complete draft.

use super::draft::{Draft, DraftStore};
use super::{RestoreReport, SessionSettings, VerificationSession};
use crate::catalog::ItemCatalog;
use crate::model::{ItemId, ItemStatus, OverallStatus, Pool, SubmissionSnapshot};
use crate::submission::{SubmissionRequest, SubmitOutcome, Submitter};
use crate::validator::{validate, ValidationPolicy};
use crate::{time, Error, Result};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

struct SessionState {
    session: VerificationSession,
    /// Set once a submission was attempted; no further drafts are written
    closed: bool,
}

/// Result of a submission attempt that passed validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitReceipt {
    pub outcome: SubmitOutcome,
    pub overall_status: OverallStatus,
    pub missing: Vec<String>,
    pub failing: Vec<String>,
}

#[derive(Clone)]
pub struct SessionHandle {
    state: Arc<Mutex<SessionState>>,
    drafts: Arc<dyn DraftStore>,
    settings: SessionSettings,
    pool: Pool,
}

impl SessionHandle {
    /// Seed a session from the live catalog and merge any stored draft
    pub async fn open(
        catalog: &dyn ItemCatalog,
        drafts: Arc<dyn DraftStore>,
        pool: Pool,
        operator: impl Into<String>,
        settings: SessionSettings,
    ) -> Result<(Self, RestoreReport)> {
        let items = catalog.active_items(pool).await?;
        let mut session = VerificationSession::open(pool, operator, &items, &settings);

        let report = match drafts.load(pool).await {
            Ok(None) => RestoreReport::NoDraft,
            Ok(Some(raw)) => match Draft::from_json(&raw) {
                Ok(draft) => session.restore(draft, time::now(), settings.draft_max_age),
                Err(e) => {
                    warn!(pool = %pool, error = %e, "Unreadable draft purged");
                    RestoreReport::Corrupt
                }
            },
            Err(e) => {
                warn!(pool = %pool, error = %e, "Failed to read draft, starting fresh");
                RestoreReport::NoDraft
            }
        };

        if matches!(report, RestoreReport::Expired { .. } | RestoreReport::Corrupt) {
            if let Err(e) = drafts.clear(pool).await {
                warn!(pool = %pool, error = %e, "Failed to purge draft");
            }
        }

        info!(
            pool = %pool,
            operator = %session.operator(),
            items = session.items().len(),
            restore = ?report,
            "Verification session opened"
        );

        let handle = Self {
            state: Arc::new(Mutex::new(SessionState {
                session,
                closed: false,
            })),
            drafts,
            settings,
            pool,
        };

        Ok((handle, report))
    }

    pub fn pool(&self) -> Pool {
        self.pool
    }

    pub async fn set_status(&self, id: ItemId, status: ItemStatus) -> Result<()> {
        self.mutate(|s| s.set_status(id, status)).await
    }

    pub async fn set_verified(&self, id: ItemId, verified: bool) -> Result<()> {
        self.mutate(|s| s.set_verified(id, verified)).await
    }

    pub async fn set_comment(&self, comment: &str) -> Result<()> {
        self.mutate(|s| {
            s.set_comment(comment);
            Ok(())
        })
        .await
    }

    pub async fn reset(&self) -> Result<()> {
        self.mutate(|s| {
            s.reset();
            Ok(())
        })
        .await
    }

    pub async fn snapshot(&self) -> SubmissionSnapshot {
        self.state.lock().await.session.snapshot()
    }

    pub async fn is_closed(&self) -> bool {
        self.state.lock().await.closed
    }

    /// Exit hook: write the current state now
    pub async fn flush(&self) -> Result<()> {
        let state = self.state.lock().await;
        if state.closed {
            return Ok(());
        }
        self.write_draft(&state.session).await
    }

    /// Periodic draft save; stops when the returned guard is dropped
    pub fn spawn_autosave(&self) -> AutosaveGuard {
        let handle = self.clone();
        let period = self.settings.autosave_interval;

        let task = tokio::spawn(async move {
            let mut tick = interval(period);
            tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // First tick completes immediately
            tick.tick().await;

            loop {
                tick.tick().await;
                if !handle.autosave_once().await {
                    debug!(pool = %handle.pool, "Autosave stopping");
                    break;
                }
            }
        });

        AutosaveGuard { task }
    }

    /// One autosave pass; `false` once the session is closed
    async fn autosave_once(&self) -> bool {
        let state = self.state.lock().await;
        if state.closed {
            return false;
        }
        if state.session.is_empty() {
            return true;
        }
        if let Err(e) = self.write_draft(&state.session).await {
            warn!(pool = %self.pool, error = %e, "Autosave failed");
        }
        true
    }

    /// Validate, then submit
    ///
    /// A validation rejection returns the error with no I/O and leaves the
    /// session and its draft untouched. Once validation passes the session is
    /// closed and its draft cleared whatever the submission outcome.
    pub async fn submit(&self, submitter: &dyn Submitter, policy: &ValidationPolicy) -> Result<SubmitReceipt> {
        let mut state = self.state.lock().await;
        if state.closed {
            return Err(Error::InvalidInput(
                "Checklist already submitted".to_string(),
            ));
        }

        let validated = validate(state.session.snapshot(), policy)?;
        let snapshot = validated.snapshot();
        let request = SubmissionRequest::from_snapshot(snapshot, time::now());

        state.closed = true;

        let result = submitter
            .submit(self.pool, state.session.operator(), &request)
            .await;

        if let Err(e) = self.drafts.clear(self.pool).await {
            warn!(pool = %self.pool, error = %e, "Failed to clear draft after submission");
        }

        let outcome = SubmitOutcome::from_response(result);
        match &outcome {
            SubmitOutcome::Persisted(id) => {
                info!(pool = %self.pool, record_id = %id, "Checklist persisted")
            }
            SubmitOutcome::LocalOnly { cause } => {
                warn!(pool = %self.pool, cause = ?cause, "Checklist completed locally only")
            }
        }

        Ok(SubmitReceipt {
            outcome,
            overall_status: validated.overall_status(),
            missing: snapshot.names_with_status(ItemStatus::Missing),
            failing: snapshot.names_with_status(ItemStatus::Failing),
        })
    }

    async fn mutate<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&mut VerificationSession) -> Result<()>,
    {
        let mut state = self.state.lock().await;
        if state.closed {
            return Err(Error::InvalidInput(
                "Checklist already submitted".to_string(),
            ));
        }
        f(&mut state.session)?;

        // The edit stands even if the draft cannot be written
        if let Err(e) = self.write_draft(&state.session).await {
            warn!(pool = %self.pool, error = %e, "Draft save failed");
        }
        Ok(())
    }

    async fn write_draft(&self, session: &VerificationSession) -> Result<()> {
        let json = session.to_draft(time::now()).to_json()?;
        self.drafts.save(self.pool, json).await
    }
}

/// Aborts the autosave task on drop
pub struct AutosaveGuard {
    task: JoinHandle<()>,
}

impl AutosaveGuard {
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for AutosaveGuard {
    fn drop(&mut self) {
        self.task.abort();
    }
}
