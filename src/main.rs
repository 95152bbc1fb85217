use std::sync::Arc;

use anyhow::Result;
use axum::Router;
use tracing_subscriber::EnvFilter;

use mailpost_hub::config::Config;
use mailpost_hub::db;
use mailpost_hub::routes;
use mailpost_hub::services::email_service::EmailService;
use mailpost_hub::services::validation_service::{DnsMxLookup, RecipientValidator};
use mailpost_hub::smtp;

#[derive(Clone)]
struct AppState {
    pool: sqlx::SqlitePool,
    service: Arc<EmailService>,
}

impl axum::extract::FromRef<AppState> for sqlx::SqlitePool {
    fn from_ref(state: &AppState) -> Self {
        state.pool.clone()
    }
}

impl axum::extract::FromRef<AppState> for Arc<EmailService> {
    fn from_ref(state: &AppState) -> Self {
        state.service.clone()
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,mailpost_hub=debug")),
        )
        .init();

    let config = Config::from_env();

    let db_url = normalize_sqlite_url(&config.database_url);
    if let Some(path) = db_file_path(&db_url) {
        // Ensure file exists for file-based sqlite (avoid open error on some setups)
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        if !path.exists() {
            std::fs::File::create(&path).ok();
        }
    }
    let pool = db::connect(&db_url).await?;

    if std::path::Path::new("migrations").exists() {
        db::run_migrations(&pool).await?;
    } else {
        tracing::warn!("migrations folder not found, skipping DB setup");
    }

    let mailer = Arc::new(smtp::select_transport(&config));
    if mailer.verify().await {
        tracing::info!(transport = mailer.label(), "SMTP connection verified");
    } else {
        tracing::warn!(transport = mailer.label(), "SMTP connection unverified, sends will still be attempted");
    }

    let validator = RecipientValidator::new(Arc::new(DnsMxLookup::new()), config.mailbox_probe);
    let service = Arc::new(EmailService::new(
        pool.clone(),
        mailer,
        validator,
        config.deep_validation,
        config.from_address.clone(),
    ));

    let state = AppState { pool, service };

    let app = Router::new()
        .nest("/api/email", routes::routes())
        .fallback(routes::access_denied)
        .with_state(state);

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(5000);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    use tokio::signal;
    let ctrl_c = async {
        signal::ctrl_c().await.ok();
    };
    #[cfg(unix)]
    let term = async {
        if let Ok(mut s) = signal::unix::signal(signal::unix::SignalKind::terminate()) {
            s.recv().await;
        }
    };
    #[cfg(not(unix))]
    let term = std::future::pending::<()>();
    tokio::select! { _ = ctrl_c => {}, _ = term => {} }
}

fn normalize_sqlite_url(input: &str) -> String {
    // Accept forms: sqlite:foo.db (fix), sqlite://foo.db (ok), file:foo.db (convert), just path (prepend)
    if input.starts_with("sqlite://") || input.starts_with("sqlite::memory:") {
        return input.to_string();
    }
    if input.starts_with("sqlite:") {
        let rest = input.trim_start_matches("sqlite:");
        return format!("sqlite://{}", rest.trim_start_matches('/'));
    }
    if input.starts_with("file:") {
        return format!("sqlite://{}", input.trim_start_matches("file:"));
    }
    format!("sqlite://{}", input)
}

fn db_file_path(url: &str) -> Option<std::path::PathBuf> {
    if let Some(rest) = url.strip_prefix("sqlite://") {
        if rest == ":memory:" {
            return None;
        }
        return Some(std::path::PathBuf::from(rest));
    }
    None
}
