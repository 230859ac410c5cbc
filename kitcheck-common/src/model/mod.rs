//! Domain types shared by every component
//!
//! - [`Pool`] and [`ItemRef`]: the two inventories and pool-tagged item references
//! - [`Item`]: catalog entries as seen by a verification session
//! - [`ItemStatus`] / [`ItemVerification`]: per-item outcome of a check
//! - [`ChecklistRecord`]: the immutable audit entry

mod item;
mod pool;
mod record;

pub use item::{Grouping, Item, ItemStatus, ItemVerification};
pub use pool::{ItemId, ItemRef, Pool};
pub use record::{ChecklistRecord, OverallStatus, RecordId, SnapshotEntry, SubmissionSnapshot};
