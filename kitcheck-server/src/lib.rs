//! kitcheck-server library
//!
//! HTTP surface over the checklist components: catalog for seeding sessions,
//! the submission contract, and the supervisor dashboard and export.

use axum::extract::DefaultBodyLimit;
use axum::Router;
use kitcheck_common::catalog::SqliteCatalog;
use kitcheck_common::notify::{MailTransport, NotificationDispatcher};
use kitcheck_common::recorder::AuditRecorder;
use kitcheck_common::reporting::ReportingAggregator;
use kitcheck_common::resolver::ItemResolver;
use kitcheck_common::{Result, Settings};
use sqlx::SqlitePool;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub mod api;

/// Largest accepted request body (a full checklist is a few kilobytes)
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    /// Runtime settings, read once at startup
    pub settings: Arc<Settings>,
    pub catalog: SqliteCatalog,
    pub recorder: AuditRecorder,
    pub reporting: ReportingAggregator,
    pub notifier: NotificationDispatcher,
}

impl AppState {
    /// Wire every component from `settings`; mail goes to the configured relay
    pub fn new(db: SqlitePool, settings: Settings) -> Result<Self> {
        let notifier = NotificationDispatcher::from_config(settings.notification.clone(), db.clone())?;
        Ok(Self::assemble(db, settings, notifier))
    }

    /// Same as [`AppState::new`] with an explicit mail transport
    pub fn with_transport(
        db: SqlitePool,
        settings: Settings,
        transport: Arc<dyn MailTransport>,
    ) -> Self {
        let notifier =
            NotificationDispatcher::new(settings.notification.clone(), transport, db.clone());
        Self::assemble(db, settings, notifier)
    }

    fn assemble(db: SqlitePool, settings: Settings, notifier: NotificationDispatcher) -> Self {
        let resolver = ItemResolver::new(db.clone());
        Self {
            catalog: SqliteCatalog::new(db.clone()),
            recorder: AuditRecorder::new(db.clone(), resolver.clone()),
            reporting: ReportingAggregator::new(db.clone(), resolver, settings.reporting.clone()),
            notifier,
            settings: Arc::new(settings),
            db,
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::{get, post};

    let api = Router::new()
        .route("/api/catalog/:pool", get(api::get_catalog))
        .route("/api/checklists/:pool", post(api::submit_checklist))
        .route("/api/dashboard", get(api::get_dashboard))
        .route("/api/export", get(api::get_export))
        .route("/api/buildinfo", get(api::get_build_info));

    Router::new()
        .merge(api)
        .merge(api::health_routes())
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
