//! # Kitcheck Common Library
//!
//! Shared code for the kitcheck service and operator devices:
//! - Domain model (pools, pool-tagged item references, verifications, records)
//! - Configuration loading (bootstrap TOML and runtime settings)
//! - Database initialization
//! - Verification sessions and their persisted drafts
//! - Submission validation, audit recording and item resolution
//! - Dashboard/export aggregation
//! - Notification dispatch
//! - Submission client

pub mod catalog;
pub mod config;
pub mod db;
pub mod error;
pub mod model;
pub mod notify;
pub mod recorder;
pub mod reporting;
pub mod resolver;
pub mod session;
pub mod settings;
pub mod submission;
pub mod time;
pub mod validator;

pub use error::{Error, Result};
pub use settings::Settings;
