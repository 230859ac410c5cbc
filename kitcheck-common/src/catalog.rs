//! Item catalog
//!
//! Read-only view of the active items of each pool, used to seed sessions and
//! to filter restored drafts. Catalog administration lives elsewhere.

use crate::model::{Grouping, Item, ItemId, Pool};
use crate::Result;
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

/// Color used when a grouping has none
pub const DEFAULT_GROUP_COLOR: &str = "#FFFFFF";

/// Source of the active items of a pool
#[async_trait]
pub trait ItemCatalog: Send + Sync {
    /// Active items, in display order
    async fn active_items(&self, pool: Pool) -> Result<Vec<Item>>;
}

/// Catalog backed by the `kit_*` / `vehicle_*` tables
#[derive(Clone)]
pub struct SqliteCatalog {
    db: SqlitePool,
}

impl SqliteCatalog {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ItemCatalog for SqliteCatalog {
    async fn active_items(&self, pool: Pool) -> Result<Vec<Item>> {
        let sql = match pool {
            Pool::Kit => {
                r#"
                SELECT i.id, i.name, i.quantity, g.name AS group_name, g.color,
                       NULL AS sub_zone
                FROM kit_items i
                LEFT JOIN kit_groups g ON g.id = i.group_id
                WHERE i.deleted_at IS NULL AND i.is_active = 1
                ORDER BY COALESCE(g.sort_order, 0), i.sort_order, i.id
                "#
            }
            Pool::Vehicle => {
                r#"
                SELECT i.id, i.name, i.quantity, z.name AS group_name, z.color,
                       i.sub_zone
                FROM vehicle_items i
                LEFT JOIN vehicle_zones z ON z.id = i.zone_id
                WHERE i.is_active = 1
                ORDER BY COALESCE(z.sort_order, 0), i.sort_order, i.id
                "#
            }
        };

        let rows = sqlx::query(sql).fetch_all(&self.db).await?;

        let items = rows
            .into_iter()
            .map(|row| {
                let color: Option<String> = row.get("color");
                Item {
                    id: ItemId(row.get("id")),
                    pool,
                    name: row.get("name"),
                    quantity: row.get("quantity"),
                    grouping: Grouping {
                        name: row
                            .get::<Option<String>, _>("group_name")
                            .unwrap_or_default(),
                        color: color
                            .filter(|c| !c.trim().is_empty())
                            .unwrap_or_else(|| DEFAULT_GROUP_COLOR.to_string()),
                        sub_zone: row.get("sub_zone"),
                    },
                    active: true,
                    deleted_at: None,
                }
            })
            .collect();

        Ok(items)
    }
}
