use anyhow::Result;
use chrono::{DateTime, Datelike, Local, NaiveDate};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::db::queries::SELECT_COLUMNS;
use crate::models::email::{EmailRecord, EmailStatus};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryFilters {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub status: Option<String>,
    pub recipient: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub sort_by: Option<String>,
    pub sort_order: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub total: i64,
    pub page: u32,
    pub limit: u32,
    pub total_pages: i64,
}

#[derive(Debug, Serialize)]
pub struct HistoryPage {
    pub emails: Vec<EmailRecord>,
    pub pagination: Pagination,
}

#[derive(Debug, Serialize)]
pub struct StatusCounts {
    pub sent: i64,
    pub failed: i64,
    pub pending: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailStats {
    pub total: i64,
    pub today: i64,
    pub last7_days: i64,
    pub last30_days: i64,
    pub this_month: i64,
    pub by_status: StatusCounts,
}

enum BindArg {
    Text(String),
    Epoch(i64),
}

fn build_filters(filters: &HistoryFilters) -> (String, Vec<BindArg>) {
    let mut clauses: Vec<&'static str> = Vec::new();
    let mut binds: Vec<BindArg> = Vec::new();

    if let Some(status) = filters.status.as_deref() {
        // "all" and unknown values mean no status filter
        if EmailStatus::from_str(status).is_some() {
            clauses.push("status = ?");
            binds.push(BindArg::Text(status.to_string()));
        }
    }
    if let Some(recipient) = filters.recipient.as_deref() {
        if !recipient.is_empty() {
            clauses.push("to_addr LIKE ?");
            binds.push(BindArg::Text(format!("%{}%", recipient)));
        }
    }
    if let Some(epoch) = filters.start_date.as_deref().and_then(day_start_epoch) {
        clauses.push("created_at >= ?");
        binds.push(BindArg::Epoch(epoch));
    }
    if let Some(epoch) = filters.end_date.as_deref().and_then(day_end_epoch) {
        clauses.push("created_at <= ?");
        binds.push(BindArg::Epoch(epoch));
    }

    let where_sql = if clauses.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", clauses.join(" AND "))
    };
    (where_sql, binds)
}

/// Sort fields come from the query string; anything not whitelisted falls
/// back to creation time.
fn sort_column(sort_by: Option<&str>) -> &'static str {
    match sort_by {
        Some("sentAt") => "sent_at",
        Some("subject") => "subject",
        Some("to") => "to_addr",
        Some("status") => "status",
        Some("attempts") => "attempts",
        _ => "created_at",
    }
}

pub async fn get_history(pool: &SqlitePool, filters: &HistoryFilters) -> Result<HistoryPage> {
    let page = filters.page.unwrap_or(1).max(1);
    let limit = filters.limit.unwrap_or(10).clamp(1, 100);
    let (where_sql, binds) = build_filters(filters);

    let count_sql = format!("SELECT COUNT(*) FROM emails{}", where_sql);
    let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
    for bind in &binds {
        count_query = match bind {
            BindArg::Text(v) => count_query.bind(v.clone()),
            BindArg::Epoch(v) => count_query.bind(*v),
        };
    }
    let total = count_query.fetch_one(pool).await?;

    let direction = match filters.sort_order.as_deref() {
        Some("asc") => "ASC",
        _ => "DESC",
    };
    let rows_sql = format!(
        "SELECT {} FROM emails{} ORDER BY {} {} LIMIT ? OFFSET ?",
        SELECT_COLUMNS,
        where_sql,
        sort_column(filters.sort_by.as_deref()),
        direction,
    );
    let mut rows_query = sqlx::query_as::<_, EmailRecord>(&rows_sql);
    for bind in &binds {
        rows_query = match bind {
            BindArg::Text(v) => rows_query.bind(v.clone()),
            BindArg::Epoch(v) => rows_query.bind(*v),
        };
    }
    let offset = (page as i64 - 1) * limit as i64;
    let emails = rows_query
        .bind(limit as i64)
        .bind(offset)
        .fetch_all(pool)
        .await?;

    let total_pages = (total + limit as i64 - 1) / limit as i64;

    Ok(HistoryPage {
        emails,
        pagination: Pagination {
            total,
            page,
            limit,
            total_pages,
        },
    })
}

pub async fn get_stats(pool: &SqlitePool) -> Result<EmailStats> {
    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM emails")
        .fetch_one(pool)
        .await?;

    let now = Local::now();
    let today = count_since(pool, local_midnight_epoch(&now)).await?;
    let last7_days = count_since(pool, (now - chrono::Duration::days(7)).timestamp()).await?;
    let last30_days = count_since(pool, (now - chrono::Duration::days(30)).timestamp()).await?;
    let this_month = count_since(pool, month_start_epoch(&now)).await?;

    let mut by_status = StatusCounts {
        sent: 0,
        failed: 0,
        pending: 0,
    };
    let rows: Vec<(String, i64)> =
        sqlx::query_as("SELECT status, COUNT(*) FROM emails GROUP BY status")
            .fetch_all(pool)
            .await?;
    for (status, count) in rows {
        match status.as_str() {
            "sent" => by_status.sent = count,
            "failed" => by_status.failed = count,
            "pending" => by_status.pending = count,
            _ => {}
        }
    }

    Ok(EmailStats {
        total,
        today,
        last7_days,
        last30_days,
        this_month,
        by_status,
    })
}

async fn count_since(pool: &SqlitePool, epoch: i64) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("SELECT COUNT(*) FROM emails WHERE created_at >= ?")
        .bind(epoch)
        .fetch_one(pool)
        .await
}

fn local_midnight_epoch(now: &DateTime<Local>) -> i64 {
    now.date_naive()
        .and_hms_opt(0, 0, 0)
        .and_then(|dt| dt.and_local_timezone(Local).earliest())
        .map(|t| t.timestamp())
        .unwrap_or_else(|| now.timestamp())
}

fn month_start_epoch(now: &DateTime<Local>) -> i64 {
    now.date_naive()
        .with_day(1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .and_then(|dt| dt.and_local_timezone(Local).earliest())
        .map(|t| t.timestamp())
        .unwrap_or_else(|| now.timestamp())
}

fn day_start_epoch(date: &str) -> Option<i64> {
    let day = NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()?;
    day.and_hms_opt(0, 0, 0)
        .and_then(|dt| dt.and_local_timezone(Local).earliest())
        .map(|t| t.timestamp())
}

fn day_end_epoch(date: &str) -> Option<i64> {
    let day = NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()?;
    day.and_hms_opt(23, 59, 59)
        .and_then(|dt| dt.and_local_timezone(Local).earliest())
        .map(|t| t.timestamp())
}
