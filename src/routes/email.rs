use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use regex::Regex;
use serde_json::json;

use crate::db::queries;
use crate::services::email_service::{EmailService, SendRequest};
use crate::services::history_service::{self, HistoryFilters};

pub async fn send_email(
    State(service): State<Arc<EmailService>>,
    Json(payload): Json<SendRequest>,
) -> Response {
    if payload.to.trim().is_empty()
        || payload.subject.trim().is_empty()
        || payload.message.trim().is_empty()
    {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "success": false,
                "message": "All fields (to, subject, message) are required"
            })),
        )
            .into_response();
    }

    // Strict boundary shape check; the dispatcher applies its own permissive one
    let strict = Regex::new(r"^[a-zA-Z0-9._-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,6}$").unwrap();
    if !strict.is_match(&payload.to) {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "success": false,
                "message": "Invalid email address format"
            })),
        )
            .into_response();
    }

    if payload.subject.chars().count() > 200 {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "success": false,
                "message": "Subject must be less than 200 characters"
            })),
        )
            .into_response();
    }

    let report = service.send_email(payload).await;
    if report.success {
        (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "message": "Email sent successfully",
                "messageId": report.message_id,
                "emailId": report.email_id,
            })),
        )
            .into_response()
    } else {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({
                "success": false,
                "message": "Failed to send email",
                "error": report.error,
                "emailId": report.email_id,
            })),
        )
            .into_response()
    }
}

pub async fn get_history(
    State(pool): State<sqlx::SqlitePool>,
    Query(filters): Query<HistoryFilters>,
) -> Response {
    match history_service::get_history(&pool, &filters).await {
        Ok(page) => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "emails": page.emails,
                "pagination": page.pagination,
            })),
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "history query failed");
            internal_error()
        }
    }
}

pub async fn get_email(State(pool): State<sqlx::SqlitePool>, Path(id): Path<String>) -> Response {
    match queries::get_email(&pool, &id).await {
        Ok(Some(email)) => (
            StatusCode::OK,
            Json(json!({ "success": true, "email": email })),
        )
            .into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(json!({ "success": false, "message": "Email not found" })),
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = %e, email_id = %id, "email lookup failed");
            internal_error()
        }
    }
}

pub async fn get_stats(State(pool): State<sqlx::SqlitePool>) -> Response {
    match history_service::get_stats(&pool).await {
        Ok(stats) => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "total": stats.total,
                "today": stats.today,
                "last7Days": stats.last7_days,
                "last30Days": stats.last30_days,
                "thisMonth": stats.this_month,
                "byStatus": stats.by_status,
            })),
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "stats query failed");
            internal_error()
        }
    }
}

pub async fn health_check(State(service): State<Arc<EmailService>>) -> Response {
    let connected = service.mailer().verify().await;
    (
        StatusCode::OK,
        Json(json!({ "success": true, "smtpConnected": connected })),
    )
        .into_response()
}

fn internal_error() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "success": false, "message": "Internal server error" })),
    )
        .into_response()
}
