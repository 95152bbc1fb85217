use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::db::queries;
use crate::models::email::AttachmentMeta;
use crate::services::render_service;
use crate::services::validation_service::{self, RecipientValidator, Verdict};
use crate::smtp::{self, MailTransport, TransportError};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendRequest {
    #[serde(default)]
    pub to: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub html: Option<String>,
    #[serde(default)]
    pub attachments: Vec<AttachmentMeta>,
    /// Ephemeral send: nothing is persisted when set.
    #[serde(default)]
    pub ghost_mode: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendReport {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub technical_error: Option<String>,
}

impl SendReport {
    fn failure(email_id: Option<String>, error: &str, technical: Option<String>) -> Self {
        Self {
            success: false,
            message_id: None,
            email_id,
            error: Some(error.to_string()),
            technical_error: technical,
        }
    }
}

/// Runs one send end to end: record creation, recipient validation,
/// rendering, transport, terminal record update, error classification.
/// One record, one terminal transition, one send attempt per call; retries
/// are the caller's business.
pub struct EmailService {
    pool: SqlitePool,
    mailer: Arc<MailTransport>,
    validator: RecipientValidator,
    deep_validation: bool,
    from_address: String,
}

impl EmailService {
    pub fn new(
        pool: SqlitePool,
        mailer: Arc<MailTransport>,
        validator: RecipientValidator,
        deep_validation: bool,
        from_address: String,
    ) -> Self {
        Self {
            pool,
            mailer,
            validator,
            deep_validation,
            from_address,
        }
    }

    pub fn mailer(&self) -> &MailTransport {
        &self.mailer
    }

    pub async fn send_email(&self, req: SendRequest) -> SendReport {
        if req.to.trim().is_empty() || req.subject.trim().is_empty() || req.message.trim().is_empty()
        {
            return SendReport::failure(
                None,
                "Missing required fields: to, subject, or message",
                None,
            );
        }

        let record_id = if req.ghost_mode {
            tracing::debug!(to = %req.to, "ghost mode send, skipping persistence");
            None
        } else {
            match queries::create_email(
                &self.pool,
                &self.from_address,
                &req.to,
                &req.subject,
                &req.message,
                req.html.as_deref(),
                &req.attachments,
            )
            .await
            {
                Ok(record) => {
                    tracing::info!(email_id = %record.id, to = %req.to, "email record created");
                    Some(record.id)
                }
                Err(e) => {
                    tracing::error!(error = %e, "failed to create email record");
                    return SendReport::failure(
                        None,
                        "Failed to record email attempt",
                        Some(e.to_string()),
                    );
                }
            }
        };

        if !validation_service::syntax_ok(&req.to) {
            let technical = format!("recipient failed syntax check: {}", req.to);
            self.finish_failed(record_id.as_deref(), &technical).await;
            return SendReport::failure(record_id, "Invalid recipient email address", Some(technical));
        }

        if self.deep_validation {
            if let Verdict::Reject(reason) = self.validator.validate_deep(&req.to).await {
                let technical = format!("recipient rejected ({}): {}", reason.code(), req.to);
                self.finish_failed(record_id.as_deref(), &technical).await;
                return SendReport::failure(record_id, &reason.user_message(), Some(technical));
            }
        }

        let html_doc =
            render_service::render_html(&req.message, req.html.as_deref(), &req.attachments);

        let (message, message_id) =
            match smtp::build_message(&self.from_address, &req.to, &req.subject, html_doc) {
                Ok(built) => built,
                Err(e) => {
                    let technical = e.to_string();
                    self.finish_failed(record_id.as_deref(), &technical).await;
                    return SendReport::failure(
                        record_id,
                        "Invalid email address. Please check the recipient email.",
                        Some(technical),
                    );
                }
            };

        match self.mailer.send(message, &message_id).await {
            Ok(outcome) => {
                if let Some(id) = record_id.as_deref() {
                    if let Err(e) = queries::mark_sent(&self.pool, id, &outcome.message_id).await {
                        tracing::error!(email_id = %id, error = %e, "failed to mark record sent");
                    }
                }
                tracing::info!(to = %req.to, message_id = %outcome.message_id, response = %outcome.response, "email sent");
                SendReport {
                    success: true,
                    message_id: Some(outcome.message_id),
                    email_id: record_id,
                    error: None,
                    technical_error: None,
                }
            }
            Err(e) => {
                let technical = e.to_string();
                self.finish_failed(record_id.as_deref(), &technical).await;
                tracing::error!(to = %req.to, error = %technical, "email send failed");
                SendReport::failure(record_id, &friendly_transport_message(&e), Some(technical))
            }
        }
    }

    async fn finish_failed(&self, record_id: Option<&str>, technical: &str) {
        if let Some(id) = record_id {
            if let Err(e) = queries::mark_failed(&self.pool, id, technical).await {
                tracing::error!(email_id = %id, error = %e, "failed to mark record failed");
            }
        }
    }
}

fn friendly_transport_message(err: &TransportError) -> String {
    match err {
        TransportError::Auth(_) => {
            "Gmail authentication failed. Please check your app password.".to_string()
        }
        TransportError::Network(_) => {
            "Network error. Please check your internet connection.".to_string()
        }
        TransportError::Recipient(_) => {
            "Invalid email address. Please check the recipient email.".to_string()
        }
        TransportError::Other(message) => message.clone(),
    }
}
