//! Event log
//!
//! Human-readable trail of notable actions (record created, notification sent
//! or not). Writing to it never fails the caller: errors are logged and dropped.

use crate::time;
use sqlx::SqlitePool;
use tracing::error;

/// Actor name used for entries written by the system itself
pub const SYSTEM_ACTOR: &str = "Système";

/// Append `"<actor>: <message>"` to the event log
pub async fn log_event(db: &SqlitePool, actor: &str, message: &str) {
    let result = sqlx::query("INSERT INTO event_log (message, created_at) VALUES (?, ?)")
        .bind(format!("{}: {}", actor, message))
        .bind(time::to_storage(&time::now()))
        .execute(db)
        .await;

    if let Err(e) = result {
        error!("Failed to write event log entry: {}", e);
    }
}

/// Most recent event messages, newest first
pub async fn recent_events(db: &SqlitePool, limit: i64) -> crate::Result<Vec<String>> {
    let messages = sqlx::query_scalar("SELECT message FROM event_log ORDER BY id DESC LIMIT ?")
        .bind(limit)
        .fetch_all(db)
        .await?;
    Ok(messages)
}
