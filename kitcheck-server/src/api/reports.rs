//! Supervisor dashboard and export endpoints

use axum::{
    extract::{Query, State},
    Json,
};
use chrono::NaiveDate;
use kitcheck_common::reporting::{Dashboard, ExportFilter, ExportRow};
use kitcheck_common::time;
use serde::Deserialize;

use super::{ApiError, Operator};
use crate::AppState;

/// Raw export query; empty strings mean "no bound"
#[derive(Debug, Default, Deserialize)]
pub struct ExportQuery {
    #[serde(default)]
    pub submitter: Option<String>,
    #[serde(default)]
    pub start: Option<String>,
    #[serde(default)]
    pub end: Option<String>,
}

impl ExportQuery {
    pub fn into_filter(self) -> Result<ExportFilter, ApiError> {
        Ok(ExportFilter {
            submitter_prefix: self.submitter.filter(|s| !s.trim().is_empty()),
            start: parse_day("start", self.start)?,
            end: parse_day("end", self.end)?,
        })
    }
}

fn parse_day(field: &str, value: Option<String>) -> Result<Option<NaiveDate>, ApiError> {
    match value.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) => NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .map(Some)
            .map_err(|_| ApiError::BadRequest(format!("Invalid {} date '{}', expected YYYY-MM-DD", field, s))),
    }
}

/// GET /api/dashboard
pub async fn get_dashboard(
    State(state): State<AppState>,
    operator: Operator,
) -> Result<Json<Dashboard>, ApiError> {
    operator.require_editor()?;
    Ok(Json(state.reporting.dashboard(time::now()).await?))
}

/// GET /api/export?submitter=&start=&end=
pub async fn get_export(
    State(state): State<AppState>,
    operator: Operator,
    Query(query): Query<ExportQuery>,
) -> Result<Json<Vec<ExportRow>>, ApiError> {
    operator.require_editor()?;
    let filter = query.into_filter()?;
    Ok(Json(state.reporting.export_rows(&filter).await?))
}
