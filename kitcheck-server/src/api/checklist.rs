//! Submission endpoint
//!
//! Answers every well-formed request with a [`SubmissionResponse`]. Validation
//! rejections and persistence failures come back as `success: false` with a
//! message; the notification runs after the response, in its own task.

use axum::{
    extract::{Path, State},
    Json,
};
use kitcheck_common::model::{Pool, RecordId};
use kitcheck_common::notify::NotificationDispatcher;
use kitcheck_common::recorder::AuditRecorder;
use kitcheck_common::submission::{SubmissionRequest, SubmissionResponse};
use kitcheck_common::validator::validate;
use tracing::{error, info, warn};

use super::{ApiError, Operator};
use crate::AppState;

/// POST /api/checklists/:pool
pub async fn submit_checklist(
    State(state): State<AppState>,
    Path(pool): Path<String>,
    operator: Operator,
    Json(request): Json<SubmissionRequest>,
) -> Result<Json<SubmissionResponse>, ApiError> {
    let pool: Pool = pool.parse()?;

    // Validation runs on the request as sent; names are resolved by the recorder
    let snapshot = request.into_snapshot(pool, operator.name.clone());
    let validated = match validate(snapshot, &state.settings.validation) {
        Ok(validated) => validated,
        Err(e) => {
            info!(pool = %pool, operator = %operator.name, "Submission rejected by validation");
            return Ok(Json(SubmissionResponse::failed(e.to_string())));
        }
    };

    let status = validated.overall_status();
    match state.recorder.record(validated).await {
        Ok(id) => {
            spawn_notification(state.recorder.clone(), state.notifier.clone(), id);
            Ok(Json(SubmissionResponse::persisted(id, status)))
        }
        Err(e) => {
            error!(pool = %pool, operator = %operator.name, error = %e, "Submission not recorded");
            Ok(Json(SubmissionResponse::failed(e.to_string())))
        }
    }
}

fn spawn_notification(recorder: AuditRecorder, notifier: NotificationDispatcher, id: RecordId) {
    tokio::spawn(async move {
        match recorder.fetch_record(id).await {
            Ok(record) => {
                notifier.dispatch(&record).await;
            }
            Err(e) => warn!(record_id = %id, error = %e, "Record vanished before notification"),
        }
    });
}
