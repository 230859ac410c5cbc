//! Pools and pool-tagged item references
//!
//! The kit and vehicle catalogs number their items independently, so the same
//! integer id names two unrelated items. Every stored or passed reference is an
//! [`ItemRef`] carrying its pool; there is no way to look an item up by bare id.

use crate::Error;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One of the two independent equipment inventories
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Pool {
    /// Carried kit (pouches)
    #[serde(alias = "DPS", alias = "kit")]
    Kit,
    /// Vehicle-based kit (zones)
    #[serde(alias = "AMBU", alias = "vehicle")]
    Vehicle,
}

impl Pool {
    pub const ALL: [Pool; 2] = [Pool::Kit, Pool::Vehicle];

    /// Canonical enum name
    pub fn as_str(&self) -> &'static str {
        match self {
            Pool::Kit => "KIT",
            Pool::Vehicle => "VEHICLE",
        }
    }

    /// Label stored in audit records and shown in exports
    pub fn label(&self) -> &'static str {
        match self {
            Pool::Kit => "DPS",
            Pool::Vehicle => "AMBU",
        }
    }

    /// Marker used in notification subjects
    pub fn emoji(&self) -> &'static str {
        match self {
            Pool::Kit => "🎒",
            Pool::Vehicle => "🚑",
        }
    }
}

impl fmt::Display for Pool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Pool {
    type Err = Error;

    /// Accepts the enum names and the stored labels, case-insensitive
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "KIT" | "DPS" => Ok(Pool::Kit),
            "VEHICLE" | "AMBU" => Ok(Pool::Vehicle),
            other => Err(Error::InvalidInput(format!("Unknown pool: {}", other))),
        }
    }
}

/// Item identifier, unique only within its pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(pub i64);

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Pool-tagged item reference
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ItemRef {
    pub pool: Pool,
    pub id: ItemId,
}

impl ItemRef {
    pub fn new(pool: Pool, id: ItemId) -> Self {
        Self { pool, id }
    }
}

impl fmt::Display for ItemRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.pool, self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_parses_names_and_labels() {
        assert_eq!("kit".parse::<Pool>().unwrap(), Pool::Kit);
        assert_eq!("DPS".parse::<Pool>().unwrap(), Pool::Kit);
        assert_eq!("Vehicle".parse::<Pool>().unwrap(), Pool::Vehicle);
        assert_eq!("ambu".parse::<Pool>().unwrap(), Pool::Vehicle);
        assert!("truck".parse::<Pool>().is_err());
    }

    #[test]
    fn test_pool_serde_accepts_legacy_labels() {
        let pool: Pool = serde_json::from_str("\"AMBU\"").unwrap();
        assert_eq!(pool, Pool::Vehicle);
        assert_eq!(serde_json::to_string(&Pool::Kit).unwrap(), "\"KIT\"");
    }

    #[test]
    fn test_same_id_different_pool_is_different_ref() {
        let kit = ItemRef::new(Pool::Kit, ItemId(5));
        let vehicle = ItemRef::new(Pool::Vehicle, ItemId(5));
        assert_ne!(kit, vehicle);
        assert_eq!(kit.to_string(), "KIT#5");
    }
}
