use std::env;

/// Runtime configuration, read once at startup. Everything SMTP-related is
/// optional: without a host the service falls back to the simulated transport.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub smtp_host: Option<String>,
    pub smtp_port: u16,
    pub smtp_username: Option<String>,
    pub smtp_password: Option<String>,
    pub from_address: String,
    pub deep_validation: bool,
    pub mailbox_probe: bool,
}

impl Config {
    pub fn from_env() -> Self {
        let database_url =
            env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://mailpost.db".into());
        let smtp_host = env::var("SMTP_HOST").ok().filter(|v| !v.is_empty());
        let smtp_port = env::var("SMTP_PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(587);
        let smtp_username = env::var("SMTP_USERNAME").ok().filter(|v| !v.is_empty());
        let smtp_password = env::var("SMTP_PASSWORD").ok().filter(|v| !v.is_empty());
        let from_address = env::var("SMTP_FROM")
            .ok()
            .filter(|v| !v.is_empty())
            .or_else(|| smtp_username.clone())
            .unwrap_or_else(|| "noreply@mailpost.local".into());

        Config {
            database_url,
            smtp_host,
            smtp_port,
            smtp_username,
            smtp_password,
            from_address,
            deep_validation: env_flag("DEEP_VALIDATION", true),
            mailbox_probe: env_flag("SMTP_MAILBOX_PROBE", false),
        }
    }
}

fn env_flag(name: &str, default: bool) -> bool {
    match env::var(name) {
        Ok(v) => matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        Err(_) => default,
    }
}
