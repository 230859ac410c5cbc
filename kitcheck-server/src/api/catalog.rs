//! Catalog endpoint

use axum::{
    extract::{Path, State},
    Json,
};
use kitcheck_common::catalog::ItemCatalog;
use kitcheck_common::model::{Item, Pool};

use super::ApiError;
use crate::AppState;

/// GET /api/catalog/:pool
///
/// Active items of the pool in display order, used to seed a session.
pub async fn get_catalog(
    State(state): State<AppState>,
    Path(pool): Path<String>,
) -> Result<Json<Vec<Item>>, ApiError> {
    let pool: Pool = pool.parse()?;
    let items = state.catalog.active_items(pool).await?;
    Ok(Json(items))
}
