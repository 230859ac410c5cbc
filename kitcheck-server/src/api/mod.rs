//! HTTP API handlers for kitcheck-server

pub mod buildinfo;
pub mod catalog;
pub mod checklist;
pub mod error;
pub mod health;
pub mod operator;
pub mod reports;

pub use buildinfo::get_build_info;
pub use catalog::get_catalog;
pub use checklist::submit_checklist;
pub use error::ApiError;
pub use health::health_routes;
pub use operator::{Operator, Role};
pub use reports::{get_dashboard, get_export};
