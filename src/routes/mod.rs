use std::sync::Arc;

use axum::extract::FromRef;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::services::email_service::EmailService;

pub mod email;

pub fn routes<S>() -> Router<S>
where
    S: Clone + Send + Sync + 'static,
    sqlx::SqlitePool: FromRef<S>,
    Arc<EmailService>: FromRef<S>,
{
    Router::new()
        .route("/send", post(email::send_email))
        .route("/history", get(email::get_history))
        .route("/stats/summary", get(email::get_stats))
        .route("/health/check", get(email::health_check))
        .route("/:id", get(email::get_email))
}

/// Catch-all for everything outside the API surface.
pub async fn access_denied() -> impl IntoResponse {
    (
        StatusCode::FORBIDDEN,
        Json(serde_json::json!({
            "success": false,
            "message": "Access Denied"
        })),
    )
}
