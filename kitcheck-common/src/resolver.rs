//! Item resolver
//!
//! Maps an [`ItemRef`] back to a display-ready item. Only the table of the
//! reference's pool is queried: the two pools share an integer id space, so
//! probing both would silently resolve colliding ids to the wrong item.

use crate::catalog::DEFAULT_GROUP_COLOR;
use crate::model::{ItemRef, Pool};
use crate::{Error, Result};
use serde::Serialize;
use sqlx::{Row, SqlitePool};

/// Display data of a resolved item
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedItem {
    pub name: String,
    pub grouping: Option<String>,
    pub color: String,
}

#[derive(Clone)]
pub struct ItemResolver {
    db: SqlitePool,
}

impl ItemResolver {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// `None` when the item is absent from its pool (removed since, or never existed)
    ///
    /// Inactive items still resolve: history keeps showing their current name.
    /// Soft-deleted kit items do not.
    pub async fn resolve(&self, item: ItemRef) -> Result<Option<ResolvedItem>> {
        let sql = match item.pool {
            Pool::Kit => {
                r#"
                SELECT i.name, g.name AS grouping, g.color
                FROM kit_items i
                LEFT JOIN kit_groups g ON g.id = i.group_id
                WHERE i.id = ? AND i.deleted_at IS NULL
                "#
            }
            Pool::Vehicle => {
                r#"
                SELECT i.name, z.name AS grouping, z.color
                FROM vehicle_items i
                LEFT JOIN vehicle_zones z ON z.id = i.zone_id
                WHERE i.id = ?
                "#
            }
        };

        let row = sqlx::query(sql)
            .bind(item.id.0)
            .fetch_optional(&self.db)
            .await?;

        Ok(row.map(|row| ResolvedItem {
            name: row.get("name"),
            grouping: row.get("grouping"),
            color: row
                .get::<Option<String>, _>("color")
                .filter(|c| !c.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_GROUP_COLOR.to_string()),
        }))
    }

    /// Like [`resolve`](Self::resolve), with absence as [`Error::ResolutionMiss`]
    pub async fn resolve_required(&self, item: ItemRef) -> Result<ResolvedItem> {
        self.resolve(item)
            .await?
            .ok_or(Error::ResolutionMiss(item))
    }

    /// Current name, or `fallback` when the item no longer resolves
    pub async fn name_or(&self, item: ItemRef, fallback: impl Into<String>) -> Result<String> {
        Ok(match self.resolve(item).await? {
            Some(resolved) => resolved.name,
            None => fallback.into(),
        })
    }
}
