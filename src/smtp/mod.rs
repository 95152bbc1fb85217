use std::time::Duration;

use anyhow::Result;
use lettre::message::header::{ContentType, MessageId};
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::{Credentials, Mechanism};
use lettre::transport::smtp::client::{Tls, TlsParameters};
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use thiserror::Error;

use crate::config::Config;

/// Transport-level failure, already sorted into the kinds the dispatcher
/// cares about. Classification prefers SMTP status codes; the substring
/// fallback only fires for errors that carry no code.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("SMTP authentication failed: {0}")]
    Auth(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("recipient rejected: {0}")]
    Recipient(String),
    #[error("{0}")]
    Other(String),
}

#[derive(Debug, Clone)]
pub struct SendOutcome {
    pub message_id: String,
    pub response: String,
}

/// One candidate connection configuration, tried in order at startup.
#[derive(Debug, Clone)]
pub struct TransportDescriptor {
    pub label: &'static str,
    pub host: String,
    pub port: u16,
    pub implicit_tls: bool,
    pub lenient_tls: bool,
}

pub fn candidate_descriptors(config: &Config) -> Vec<TransportDescriptor> {
    let host = match &config.smtp_host {
        Some(h) => h.clone(),
        None => return Vec::new(),
    };
    vec![
        TransportDescriptor {
            label: "starttls relay",
            host: host.clone(),
            port: config.smtp_port,
            implicit_tls: false,
            lenient_tls: false,
        },
        TransportDescriptor {
            label: "implicit tls 465 (lenient certs)",
            host: host.clone(),
            port: 465,
            implicit_tls: true,
            lenient_tls: true,
        },
        TransportDescriptor {
            label: "implicit tls 465",
            host,
            port: 465,
            implicit_tls: true,
            lenient_tls: false,
        },
    ]
}

pub fn try_build(
    config: &Config,
    desc: &TransportDescriptor,
) -> Result<AsyncSmtpTransport<Tokio1Executor>> {
    let tls = if desc.lenient_tls {
        TlsParameters::builder(desc.host.clone())
            .dangerous_accept_invalid_certs(true)
            .build()?
    } else {
        TlsParameters::new(desc.host.clone())?
    };

    let mut builder = AsyncSmtpTransport::<Tokio1Executor>::relay(&desc.host)?
        .port(desc.port)
        .timeout(Some(Duration::from_secs(20)));

    builder = if desc.implicit_tls {
        builder.tls(Tls::Wrapper(tls))
    } else {
        builder.tls(Tls::Required(tls))
    };

    if let (Some(user), Some(pass)) = (&config.smtp_username, &config.smtp_password) {
        // Trim whitespace that may sneak in from copied app passwords
        let clean_pass: String = pass.chars().filter(|c| !c.is_whitespace()).collect();
        builder = builder
            .authentication(vec![Mechanism::Plain, Mechanism::Login])
            .credentials(Credentials::new(user.clone(), clean_pass));
    }

    Ok(builder.build())
}

/// Walk the candidate list and adopt the first configuration that can be
/// constructed. When none succeed (or no host is configured) the simulated
/// transport takes over so the dispatcher always has something to send with.
pub fn select_transport(config: &Config) -> MailTransport {
    let candidates = candidate_descriptors(config);
    if candidates.is_empty() {
        tracing::warn!("SMTP_HOST not configured, using simulated transport");
        return MailTransport::Simulated;
    }

    for desc in candidates {
        match try_build(config, &desc) {
            Ok(mailer) => {
                tracing::info!(config = desc.label, host = %desc.host, port = desc.port, "SMTP transport ready");
                return MailTransport::Smtp {
                    mailer: Box::new(mailer),
                    label: desc.label,
                };
            }
            Err(e) => {
                tracing::warn!(config = desc.label, error = %e, "SMTP configuration failed, trying next");
            }
        }
    }

    tracing::warn!("all SMTP configurations failed, using simulated transport");
    MailTransport::Simulated
}

/// The outbound connection the dispatcher sends through. Built once at
/// startup and injected; never re-initialized mid-process.
pub enum MailTransport {
    Smtp {
        mailer: Box<AsyncSmtpTransport<Tokio1Executor>>,
        label: &'static str,
    },
    Simulated,
}

impl MailTransport {
    /// `message_id` is the Message-Id already stamped on `message`; it is
    /// echoed back in the outcome. The simulated transport substitutes its
    /// own mock id.
    pub async fn send(
        &self,
        message: Message,
        message_id: &str,
    ) -> Result<SendOutcome, TransportError> {
        match self {
            MailTransport::Smtp { mailer, .. } => {
                let response = mailer.send(message).await.map_err(classify_smtp_error)?;
                Ok(SendOutcome {
                    message_id: message_id.to_string(),
                    response: response.code().to_string(),
                })
            }
            MailTransport::Simulated => {
                tokio::time::sleep(Duration::from_millis(500)).await;
                let ts = chrono::Utc::now().timestamp_millis();
                Ok(SendOutcome {
                    message_id: format!("mock-{}", ts),
                    response: "simulated success".to_string(),
                })
            }
        }
    }

    /// Connectivity probe for the health endpoint.
    pub async fn verify(&self) -> bool {
        match self {
            MailTransport::Smtp { mailer, .. } => mailer.test_connection().await.unwrap_or(false),
            MailTransport::Simulated => true,
        }
    }

    pub fn is_simulated(&self) -> bool {
        matches!(self, MailTransport::Simulated)
    }

    pub fn label(&self) -> &'static str {
        match self {
            MailTransport::Smtp { label, .. } => label,
            MailTransport::Simulated => "simulated",
        }
    }
}

/// Build a Message with explicit Message-Id. Returns (message, message_id)
pub fn build_message(
    from: &str,
    to: &str,
    subject: &str,
    html_body: String,
) -> Result<(Message, String)> {
    let from_mb: Mailbox = from.parse()?;
    let to_mb: Mailbox = to.parse()?;
    let domain = from.split('@').nth(1).unwrap_or("mailpost.local");
    let msg_id = format!("{}@{}", uuid::Uuid::new_v4(), domain);

    let message = Message::builder()
        .from(from_mb)
        .to(to_mb)
        .subject(subject)
        .header(MessageId::from(msg_id.clone()))
        .header(ContentType::TEXT_HTML)
        .body(html_body)?;

    Ok((message, msg_id))
}

fn classify_smtp_error(e: lettre::transport::smtp::Error) -> TransportError {
    let technical = e.to_string();
    if let Some(code) = e.status() {
        return match code.to_string().as_str() {
            "530" | "534" | "535" => TransportError::Auth(technical),
            "550" | "551" | "553" => TransportError::Recipient(technical),
            _ => TransportError::Other(technical),
        };
    }
    if e.is_timeout() {
        return TransportError::Network(technical);
    }
    classify_opaque(technical)
}

/// Substring classification for upstream errors that expose no SMTP status.
pub fn classify_opaque(technical: String) -> TransportError {
    let lower = technical.to_lowercase();
    if lower.contains("authentication")
        || lower.contains("credentials")
        || lower.contains("invalid login")
    {
        TransportError::Auth(technical)
    } else if lower.contains("connection")
        || lower.contains("network")
        || lower.contains("dns")
        || lower.contains("timed out")
        || lower.contains("not found")
    {
        TransportError::Network(technical)
    } else if lower.contains("recipient") {
        TransportError::Recipient(technical)
    } else {
        TransportError::Other(technical)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bare_config(host: Option<&str>) -> Config {
        Config {
            database_url: "sqlite::memory:".into(),
            smtp_host: host.map(|h| h.to_string()),
            smtp_port: 587,
            smtp_username: None,
            smtp_password: None,
            from_address: "noreply@mailpost.local".into(),
            deep_validation: true,
            mailbox_probe: false,
        }
    }

    #[test]
    fn no_host_means_no_candidates() {
        assert!(candidate_descriptors(&bare_config(None)).is_empty());
        let descs = candidate_descriptors(&bare_config(Some("smtp.gmail.com")));
        assert_eq!(descs.len(), 3);
        assert_eq!(descs[0].port, 587);
        assert!(descs[1].implicit_tls && descs[1].lenient_tls);
    }

    #[test]
    fn select_falls_back_to_simulated_without_host() {
        let transport = select_transport(&bare_config(None));
        assert!(transport.is_simulated());
    }

    #[tokio::test]
    async fn select_adopts_the_first_buildable_candidate() {
        let transport = select_transport(&bare_config(Some("smtp.gmail.com")));
        assert!(!transport.is_simulated());
        assert_eq!(transport.label(), "starttls relay");
    }

    #[tokio::test]
    async fn simulated_send_returns_mock_outcome() {
        let (message, msg_id) = build_message(
            "noreply@mailpost.local",
            "user@example.com",
            "Hi",
            "<p>Hello</p>".to_string(),
        )
        .unwrap();
        assert!(msg_id.ends_with("@mailpost.local"));

        let outcome = MailTransport::Simulated.send(message, &msg_id).await.unwrap();
        assert!(outcome.message_id.starts_with("mock-"));
        assert_eq!(outcome.response, "simulated success");
        assert!(MailTransport::Simulated.verify().await);
    }

    #[test]
    fn opaque_classification_buckets() {
        assert!(matches!(
            classify_opaque("Invalid login: 535-5.7.8 Username and Password not accepted".into()),
            TransportError::Auth(_)
        ));
        assert!(matches!(
            classify_opaque("dns error: failed to lookup address".into()),
            TransportError::Network(_)
        ));
        assert!(matches!(
            classify_opaque("recipient address rejected".into()),
            TransportError::Recipient(_)
        ));
        assert!(matches!(
            classify_opaque("something unexpected".into()),
            TransportError::Other(_)
        ));
    }
}
