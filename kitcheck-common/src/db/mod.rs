//! Database initialization and shared tables

pub mod events;
pub mod init;

pub use events::{log_event, SYSTEM_ACTOR};
pub use init::*;
