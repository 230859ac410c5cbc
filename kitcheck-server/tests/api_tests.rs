//! Integration tests for kitcheck-server API endpoints
//!
//! Tests cover:
//! - Health endpoint
//! - Catalog per pool
//! - Submission contract (persisted, validation rejection, notification)
//! - Dashboard and export
//! - SubmissionClient against a live listener
//! - HTTP mail relay transport against a stub relay

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use kitcheck_common::catalog::SqliteCatalog;
use kitcheck_common::db::events::recent_events;
use kitcheck_common::db::init_memory_database;
use kitcheck_common::model::{ItemId, ItemStatus, Pool};
use kitcheck_common::notify::{HttpRelayTransport, MailMessage, MailTransport, SendCondition};
use kitcheck_common::session::{DraftStore, MemoryDraftStore, SessionHandle, SessionSettings};
use kitcheck_common::submission::{LocalOnlyCause, SubmissionClient, SubmitOutcome};
use kitcheck_common::{Error, Result, Settings};
use kitcheck_server::{build_router, AppState};
use serde_json::{json, Value};
use sqlx::SqlitePool;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tower::util::ServiceExt; // for `oneshot` method

#[derive(Default)]
struct RecordingTransport {
    sent: Mutex<Vec<MailMessage>>,
    fail: bool,
}

#[async_trait]
impl MailTransport for RecordingTransport {
    async fn send(&self, message: &MailMessage) -> Result<()> {
        if self.fail {
            return Err(Error::Notification("relay down".to_string()));
        }
        self.sent.lock().unwrap().push(message.clone());
        Ok(())
    }
}

struct TestApp {
    db: SqlitePool,
    state: AppState,
    transport: Arc<RecordingTransport>,
    kit: Vec<i64>,
    vehicle: Vec<i64>,
}

impl TestApp {
    fn router(&self) -> Router {
        build_router(self.state.clone())
    }
}

/// Test helper: in-memory database with three kit items and two vehicle items
async fn setup() -> TestApp {
    setup_with_transport(RecordingTransport::default()).await
}

async fn setup_with_transport(transport: RecordingTransport) -> TestApp {
    let db = init_memory_database().await.unwrap();

    let pouch = sqlx::query("INSERT INTO kit_groups (name, color, sort_order) VALUES ('Trauma', '#FF0000', 1)")
        .execute(&db)
        .await
        .unwrap()
        .last_insert_rowid();
    let mut kit = Vec::new();
    for (order, name) in ["Tourniquet", "Gauze", "Scissors"].iter().enumerate() {
        kit.push(
            sqlx::query("INSERT INTO kit_items (name, group_id, sort_order) VALUES (?, ?, ?)")
                .bind(name)
                .bind(pouch)
                .bind(order as i64)
                .execute(&db)
                .await
                .unwrap()
                .last_insert_rowid(),
        );
    }

    let zone = sqlx::query("INSERT INTO vehicle_zones (name, sort_order) VALUES ('Cellule', 1)")
        .execute(&db)
        .await
        .unwrap()
        .last_insert_rowid();
    let mut vehicle = Vec::new();
    for (order, name) in ["Oxygen", "Stretcher"].iter().enumerate() {
        vehicle.push(
            sqlx::query("INSERT INTO vehicle_items (name, zone_id, sort_order) VALUES (?, ?, ?)")
                .bind(name)
                .bind(zone)
                .bind(order as i64)
                .execute(&db)
                .await
                .unwrap()
                .last_insert_rowid(),
        );
    }

    let mut settings = Settings::default();
    settings.notification.destinations = vec!["chief@example.org".to_string()];
    settings.notification.send_condition = SendCondition::Always;

    let transport = Arc::new(transport);
    let state = AppState::with_transport(db.clone(), settings, transport.clone());

    TestApp {
        db,
        state,
        transport,
        kit,
        vehicle,
    }
}

fn get(uri: &str, role: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri).header("X-Operator", "Marie");
    if let Some(role) = role {
        builder = builder.header("X-Operator-Role", role);
    }
    builder.body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .header("X-Operator", "alice")
        .body(Body::from(body.to_string()))
        .unwrap()
}

/// Test helper: Extract JSON body from response
async fn extract_json(body: Body) -> Value {
    let bytes = axum::body::to_bytes(body, usize::MAX)
        .await
        .expect("Should read body");
    serde_json::from_slice(&bytes).expect("Should parse JSON")
}

async fn record_count(db: &SqlitePool) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM checklist_records")
        .fetch_one(db)
        .await
        .unwrap()
}

fn all_ok(ids: &[i64]) -> serde_json::Map<String, Value> {
    ids.iter()
        .map(|id| (id.to_string(), json!({"status": "OK", "verified": true})))
        .collect()
}

async fn wait_for_mail(transport: &RecordingTransport) -> MailMessage {
    for _ in 0..100 {
        if let Some(message) = transport.sent.lock().unwrap().first().cloned() {
            return message;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("no notification was sent");
}

// =============================================================================
// Health Endpoint Tests
// =============================================================================

#[tokio::test]
async fn test_health_endpoint() {
    let app = setup().await;

    let response = app.router().oneshot(get("/health", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = extract_json(response.into_body()).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["module"], "kitcheck-server");
    assert!(body["version"].is_string());
}

// =============================================================================
// Catalog Tests
// =============================================================================

#[tokio::test]
async fn test_catalog_lists_pool_items_in_order() {
    let app = setup().await;

    let response = app.router().oneshot(get("/api/catalog/kit", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = extract_json(response.into_body()).await;
    let names: Vec<&str> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|item| item["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["Tourniquet", "Gauze", "Scissors"]);
    assert_eq!(body[0]["grouping"]["color"], "#FF0000");

    // Legacy label is accepted too
    let response = app.router().oneshot(get("/api/catalog/AMBU", None)).await.unwrap();
    let body = extract_json(response.into_body()).await;
    assert_eq!(body.as_array().unwrap().len(), 2);
    assert_eq!(body[0]["grouping"]["name"], "Cellule");
}

#[tokio::test]
async fn test_catalog_unknown_pool_is_bad_request() {
    let app = setup().await;

    let response = app.router().oneshot(get("/api/catalog/boat", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = extract_json(response.into_body()).await;
    assert!(body["error"].as_str().unwrap().contains("Unknown pool"));
}

// =============================================================================
// Submission Tests
// =============================================================================

#[tokio::test]
async fn test_submission_is_recorded_and_notified() {
    let app = setup().await;

    let mut items = all_ok(&app.kit);
    items.insert(
        app.kit[1].to_string(),
        json!({"name": "Gauze", "status": "MISSING", "verified": false}),
    );
    let response = app
        .router()
        .oneshot(post_json(
            "/api/checklists/kit",
            json!({"items": items, "comment": "Used on call 118"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = extract_json(response.into_body()).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["status"], "WITH_ISSUES");
    let record_id = body["recordId"].as_i64().unwrap();

    let (submitter, pool): (String, String) =
        sqlx::query_as("SELECT submitter, pool FROM checklist_records WHERE id = ?")
            .bind(record_id)
            .fetch_one(&app.db)
            .await
            .unwrap();
    assert_eq!(submitter, "alice");
    assert_eq!(pool, "DPS");

    // Names absent from the request were resolved from the kit catalog
    let snapshot: String = sqlx::query_scalar("SELECT snapshot_json FROM checklist_records WHERE id = ?")
        .bind(record_id)
        .fetch_one(&app.db)
        .await
        .unwrap();
    assert!(snapshot.contains("Tourniquet"));

    let mail = wait_for_mail(&app.transport).await;
    assert_eq!(
        mail.subject,
        format!("🎒 [DPS] ⚠️ Checklist #{} (Avec problèmes)", record_id)
    );
    assert!(mail.html.contains("<li>Gauze</li>"));
}

#[tokio::test]
async fn test_vehicle_ids_resolve_in_vehicle_pool() {
    let app = setup().await;

    // Same integers exist in the kit pool; the record must name vehicle items
    let response = app
        .router()
        .oneshot(post_json(
            "/api/checklists/vehicle",
            json!({"items": all_ok(&app.vehicle)}),
        ))
        .await
        .unwrap();
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["status"], "COMPLETE");

    let snapshot: String = sqlx::query_scalar("SELECT snapshot_json FROM checklist_records")
        .fetch_one(&app.db)
        .await
        .unwrap();
    assert!(snapshot.contains("Oxygen"));
    assert!(!snapshot.contains("Tourniquet"));
}

#[tokio::test]
async fn test_incomplete_submission_is_rejected_without_record() {
    let app = setup().await;

    let mut items = all_ok(&app.kit[..1]);
    items.insert(
        app.kit[1].to_string(),
        json!({"name": "Gauze", "status": "OK", "verified": false}),
    );
    items.insert(
        app.kit[2].to_string(),
        json!({"name": "Scissors", "status": "OK", "verified": false}),
    );
    let response = app
        .router()
        .oneshot(post_json("/api/checklists/kit", json!({"items": items})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = extract_json(response.into_body()).await;
    assert_eq!(body["success"], false);
    let message = body["message"].as_str().unwrap();
    assert!(message.contains("Gauze, Scissors"));
    assert_eq!(record_count(&app.db).await, 0);
}

#[tokio::test]
async fn test_fully_unchecked_submission_is_blocked() {
    let app = setup().await;

    let items: serde_json::Map<String, Value> = app
        .kit
        .iter()
        .map(|id| (id.to_string(), json!({"status": "OK", "verified": false})))
        .collect();
    let response = app
        .router()
        .oneshot(post_json("/api/checklists/kit", json!({"items": items})))
        .await
        .unwrap();

    let body = extract_json(response.into_body()).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["message"], "Toute la liste doit être vérifiée.");
    assert_eq!(record_count(&app.db).await, 0);
}

#[tokio::test]
async fn test_validation_runs_before_any_catalog_lookup() {
    let app = setup().await;

    // With the catalog gone, any name lookup would fail with a database error
    sqlx::query("DROP TABLE kit_items")
        .execute(&app.db)
        .await
        .unwrap();

    let items: serde_json::Map<String, Value> = app
        .kit
        .iter()
        .map(|id| (id.to_string(), json!({"status": "OK", "verified": false})))
        .collect();
    let response = app
        .router()
        .oneshot(post_json("/api/checklists/kit", json!({"items": items})))
        .await
        .unwrap();

    let body = extract_json(response.into_body()).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["message"], "Toute la liste doit être vérifiée.");
}

#[tokio::test]
async fn test_unnamed_untouched_item_is_reported_by_id() {
    let app = setup().await;

    let mut items = all_ok(&app.kit[..2]);
    items.insert(app.kit[2].to_string(), json!({"status": "OK"}));
    let response = app
        .router()
        .oneshot(post_json("/api/checklists/kit", json!({"items": items})))
        .await
        .unwrap();

    let body = extract_json(response.into_body()).await;
    assert_eq!(body["success"], false);
    assert!(body["message"]
        .as_str()
        .unwrap()
        .ends_with(&format!("Élément #{}", app.kit[2])));
    assert_eq!(record_count(&app.db).await, 0);
}

#[tokio::test]
async fn test_failed_notification_keeps_record_and_success() {
    let app = setup_with_transport(RecordingTransport {
        fail: true,
        ..RecordingTransport::default()
    })
    .await;

    let mut items = all_ok(&app.kit);
    items.insert(app.kit[0].to_string(), json!({"status": "FAILING"}));
    let response = app
        .router()
        .oneshot(post_json("/api/checklists/kit", json!({"items": items})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = extract_json(response.into_body()).await;
    assert_eq!(body["success"], true);
    let record_id = body["recordId"].as_i64().unwrap();

    let expected = format!("Système: Échec envoi email pour checklist #{}", record_id);
    let mut logged = false;
    for _ in 0..100 {
        if recent_events(&app.db, 5).await.unwrap().contains(&expected) {
            logged = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(logged, "delivery failure was not logged");

    let status: String = sqlx::query_scalar("SELECT overall_status FROM checklist_records WHERE id = ?")
        .bind(record_id)
        .fetch_one(&app.db)
        .await
        .unwrap();
    assert_eq!(status, "WITH_ISSUES");
    assert_eq!(record_count(&app.db).await, 1);
}

// =============================================================================
// Dashboard and Export Tests
// =============================================================================

#[tokio::test]
async fn test_dashboard_requires_editor_role() {
    let app = setup().await;

    let response = app.router().oneshot(get("/api/dashboard", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .router()
        .oneshot(get("/api/dashboard", Some("editor")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = extract_json(response.into_body()).await;
    assert_eq!(body["totals"]["all_time"], 0);
    assert!(body["latest"].is_null());
}

#[tokio::test]
async fn test_export_filters_by_inclusive_day_range() {
    let app = setup().await;

    for day in ["2024-01-14 23:30:00", "2024-01-15 08:00:00", "2024-01-16 00:00:00"] {
        let response = app
            .router()
            .oneshot(post_json("/api/checklists/kit", json!({"items": all_ok(&app.kit)})))
            .await
            .unwrap();
        let body = extract_json(response.into_body()).await;
        sqlx::query("UPDATE checklist_records SET submitted_at = ? WHERE id = ?")
            .bind(day)
            .bind(body["recordId"].as_i64().unwrap())
            .execute(&app.db)
            .await
            .unwrap();
    }

    let response = app
        .router()
        .oneshot(get(
            "/api/export?submitter=ali&start=2024-01-15&end=2024-01-15",
            Some("admin"),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let rows = extract_json(response.into_body()).await;
    let rows = rows.as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["submitter"], "alice");
    assert_eq!(rows[0]["status_label"], "Complète");

    let response = app
        .router()
        .oneshot(get("/api/export?submitter=bob", Some("admin")))
        .await
        .unwrap();
    assert!(extract_json(response.into_body()).await.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_export_rejects_malformed_date() {
    let app = setup().await;

    let response = app
        .router()
        .oneshot(get("/api/export?start=yesterday", Some("editor")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

// =============================================================================
// Submission Client Tests
// =============================================================================

async fn serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

async fn open_session(app: &TestApp, drafts: Arc<dyn DraftStore>) -> SessionHandle {
    let (session, _) = SessionHandle::open(
        &SqliteCatalog::new(app.db.clone()),
        drafts,
        Pool::Kit,
        "alice",
        SessionSettings::default(),
    )
    .await
    .unwrap();
    session
}

#[tokio::test]
async fn test_client_submission_is_persisted_and_clears_draft() {
    let app = setup().await;
    let base_url = serve(app.router()).await;

    let drafts: Arc<dyn DraftStore> = Arc::new(MemoryDraftStore::new());
    let session = open_session(&app, drafts.clone()).await;
    for id in &app.kit {
        session.set_verified(ItemId(*id), true).await.unwrap();
    }
    session.set_status(ItemId(app.kit[2]), ItemStatus::Failing).await.unwrap();
    assert!(drafts.load(Pool::Kit).await.unwrap().is_some());

    let client = SubmissionClient::new(base_url).unwrap();
    let receipt = session
        .submit(&client, &app.state.settings.validation)
        .await
        .unwrap();

    let record_id = receipt.outcome.record_id().expect("record persisted");
    assert_eq!(receipt.failing, vec!["Scissors".to_string()]);
    assert_eq!(drafts.load(Pool::Kit).await.unwrap(), None);

    let stored: String = sqlx::query_scalar("SELECT submitter FROM checklist_records WHERE id = ?")
        .bind(record_id.0)
        .fetch_one(&app.db)
        .await
        .unwrap();
    assert_eq!(stored, "alice");
}

#[tokio::test]
async fn test_unreachable_server_completes_locally() {
    let app = setup().await;

    // Bind then drop to get a port nobody listens on
    let addr = {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };

    let drafts: Arc<dyn DraftStore> = Arc::new(MemoryDraftStore::new());
    let session = open_session(&app, drafts.clone()).await;
    for id in &app.kit {
        session.set_verified(ItemId(*id), true).await.unwrap();
    }

    let client = SubmissionClient::new(format!("http://{}", addr)).unwrap();
    let receipt = session
        .submit(&client, &app.state.settings.validation)
        .await
        .unwrap();

    assert!(matches!(
        receipt.outcome,
        SubmitOutcome::LocalOnly {
            cause: LocalOnlyCause::Transport(_)
        }
    ));
    assert_eq!(drafts.load(Pool::Kit).await.unwrap(), None);
    assert_eq!(record_count(&app.db).await, 0);
}

// =============================================================================
// Mail Relay Tests
// =============================================================================

fn message() -> MailMessage {
    MailMessage {
        to: vec!["chief@example.org".to_string()],
        subject: "🎒 [DPS] Checklist #7 (Complète)".to_string(),
        html: "<p>ok</p>".to_string(),
        from_name: "Checklist".to_string(),
    }
}

#[tokio::test]
async fn test_relay_receives_message_as_json() {
    use axum::{extract::State, routing::post, Json};

    let received: Arc<Mutex<Vec<Value>>> = Arc::default();
    let relay = Router::new()
        .route(
            "/send",
            post(
                |State(received): State<Arc<Mutex<Vec<Value>>>>, Json(body): Json<Value>| async move {
                    received.lock().unwrap().push(body);
                    StatusCode::ACCEPTED
                },
            ),
        )
        .with_state(received.clone());
    let base_url = serve(relay).await;

    let transport = HttpRelayTransport::new(format!("{}/send", base_url)).unwrap();
    transport.send(&message()).await.unwrap();

    let received = received.lock().unwrap();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0]["to"], json!(["chief@example.org"]));
    assert_eq!(received[0]["subject"], "🎒 [DPS] Checklist #7 (Complète)");
    assert_eq!(received[0]["html"], "<p>ok</p>");
    assert_eq!(received[0]["from_name"], "Checklist");
}

#[tokio::test]
async fn test_relay_error_status_is_a_notification_error() {
    use axum::routing::post;

    let relay = Router::new().route("/send", post(|| async { StatusCode::INTERNAL_SERVER_ERROR }));
    let base_url = serve(relay).await;

    let transport = HttpRelayTransport::new(format!("{}/send", base_url)).unwrap();
    let err = transport.send(&message()).await.unwrap_err();
    assert!(matches!(err, Error::Notification(_)));
}
