use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::extract::FromRef;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt; // for `app.oneshot()`

use mailpost_hub::db;
use mailpost_hub::db::queries;
use mailpost_hub::models::email::AttachmentMeta;
use mailpost_hub::routes;
use mailpost_hub::services::email_service::EmailService;
use mailpost_hub::services::validation_service::{LookupFailure, MxLookup, RecipientValidator};
use mailpost_hub::smtp::MailTransport;

#[derive(Clone)]
struct TestState {
    pool: sqlx::SqlitePool,
    service: Arc<EmailService>,
}

impl FromRef<TestState> for sqlx::SqlitePool {
    fn from_ref(state: &TestState) -> Self {
        state.pool.clone()
    }
}

impl FromRef<TestState> for Arc<EmailService> {
    fn from_ref(state: &TestState) -> Self {
        state.service.clone()
    }
}

struct AlwaysResolves;

#[async_trait]
impl MxLookup for AlwaysResolves {
    async fn lookup_mx(&self, _domain: &str) -> Result<Vec<String>, LookupFailure> {
        Ok(vec!["mx.example.com".to_string()])
    }
}

async fn test_app() -> (Router, sqlx::SqlitePool) {
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    db::run_migrations(&pool).await.unwrap();

    let validator = RecipientValidator::new(Arc::new(AlwaysResolves), false);
    let service = Arc::new(EmailService::new(
        pool.clone(),
        Arc::new(MailTransport::Simulated),
        validator,
        true,
        "noreply@mailpost.local".to_string(),
    ));

    let state = TestState {
        pool: pool.clone(),
        service,
    };
    let app = Router::new()
        .nest("/api/email", routes::routes())
        .fallback(routes::access_denied)
        .with_state(state);
    (app, pool)
}

async fn get_json(app: &Router, uri: &str) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&bytes).unwrap())
}

async fn seed(pool: &sqlx::SqlitePool, to: &str, subject: &str) -> String {
    queries::create_email(
        pool,
        "noreply@mailpost.local",
        to,
        subject,
        "Hello",
        None,
        &[],
    )
    .await
    .unwrap()
    .id
}

#[tokio::test]
async fn stats_are_all_zero_on_an_empty_store() {
    let (app, _pool) = test_app().await;

    let (status, body) = get_json(&app, "/api/email/stats/summary").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["total"], 0);
    assert_eq!(body["today"], 0);
    assert_eq!(body["last7Days"], 0);
    assert_eq!(body["last30Days"], 0);
    assert_eq!(body["thisMonth"], 0);
    assert_eq!(body["byStatus"]["sent"], 0);
    assert_eq!(body["byStatus"]["failed"], 0);
    assert_eq!(body["byStatus"]["pending"], 0);
}

#[tokio::test]
async fn stats_count_fresh_records_in_every_window() {
    let (app, pool) = test_app().await;

    let a = seed(&pool, "alice@example.com", "one").await;
    let b = seed(&pool, "bob@example.com", "two").await;
    seed(&pool, "carol@example.com", "three").await;
    queries::mark_sent(&pool, &a, "id-a@mailpost.local").await.unwrap();
    queries::mark_failed(&pool, &b, "550 no such user").await.unwrap();

    let (status, body) = get_json(&app, "/api/email/stats/summary").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 3);
    assert_eq!(body["today"], 3);
    assert_eq!(body["last7Days"], 3);
    assert_eq!(body["last30Days"], 3);
    assert_eq!(body["thisMonth"], 3);
    assert_eq!(body["byStatus"]["sent"], 1);
    assert_eq!(body["byStatus"]["failed"], 1);
    assert_eq!(body["byStatus"]["pending"], 1);
}

#[tokio::test]
async fn out_of_range_pages_are_empty_but_keep_totals() {
    let (app, pool) = test_app().await;
    for i in 0..3 {
        seed(&pool, "user@example.com", &format!("mail {}", i)).await;
    }

    let (status, body) = get_json(&app, "/api/email/history?page=5&limit=2").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["emails"].as_array().unwrap().len(), 0);
    assert_eq!(body["pagination"]["total"], 3);
    assert_eq!(body["pagination"]["totalPages"], 2);
    assert_eq!(body["pagination"]["page"], 5);
    assert_eq!(body["pagination"]["limit"], 2);
}

#[tokio::test]
async fn history_filters_by_status_and_recipient() {
    let (app, pool) = test_app().await;

    let a = seed(&pool, "alice@example.com", "to alice").await;
    seed(&pool, "bob@example.com", "to bob").await;
    queries::mark_failed(&pool, &a, "550 no such user").await.unwrap();

    let (_, body) = get_json(&app, "/api/email/history?status=failed").await;
    let emails = body["emails"].as_array().unwrap();
    assert_eq!(emails.len(), 1);
    assert_eq!(emails[0]["to"], "alice@example.com");
    assert_eq!(emails[0]["status"], "failed");

    // recipient match is a case-insensitive substring
    let (_, body) = get_json(&app, "/api/email/history?recipient=ALICE").await;
    let emails = body["emails"].as_array().unwrap();
    assert_eq!(emails.len(), 1);
    assert_eq!(emails[0]["to"], "alice@example.com");

    // unknown status values are ignored rather than erroring
    let (_, body) = get_json(&app, "/api/email/history?status=all").await;
    assert_eq!(body["emails"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn history_sorts_by_whitelisted_fields() {
    let (app, pool) = test_app().await;

    seed(&pool, "user@example.com", "banana").await;
    seed(&pool, "user@example.com", "apple").await;
    seed(&pool, "user@example.com", "cherry").await;

    let (_, body) = get_json(&app, "/api/email/history?sortBy=subject&sortOrder=asc").await;
    let subjects: Vec<&str> = body["emails"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["subject"].as_str().unwrap())
        .collect();
    assert_eq!(subjects, vec!["apple", "banana", "cherry"]);

    // injection-shaped sort fields fall back to the default ordering
    let (status, _) = get_json(
        &app,
        "/api/email/history?sortBy=subject%3B%20DROP%20TABLE%20emails",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn record_shape_on_the_wire_matches_the_contract() {
    let (app, pool) = test_app().await;

    let id = queries::create_email(
        &pool,
        "noreply@mailpost.local",
        "user@example.com",
        "With attachment",
        "See attached",
        Some("<b>extra</b>"),
        &[AttachmentMeta {
            filename: "report.pdf".into(),
            storage_path: "/uploads/report.pdf".into(),
            size_bytes: 2048,
        }],
    )
    .await
    .unwrap()
    .id;

    let (status, body) = get_json(&app, &format!("/api/email/{}", id)).await;
    assert_eq!(status, StatusCode::OK);
    let email = &body["email"];
    assert_eq!(email["from"], "noreply@mailpost.local");
    assert_eq!(email["to"], "user@example.com");
    assert_eq!(email["status"], "pending");
    assert_eq!(email["attempts"], 0);
    assert!(email["messageId"].is_null());
    assert!(email["sentAt"].is_null());
    assert_eq!(email["attachments"][0]["filename"], "report.pdf");
    assert_eq!(email["attachments"][0]["storagePath"], "/uploads/report.pdf");
    assert_eq!(email["attachments"][0]["sizeBytes"], 2048);
    assert!(email["createdAt"].is_number());
    assert!(email["updatedAt"].is_number());
}
