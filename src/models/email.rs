use serde::{Deserialize, Serialize};
use sqlx::types::Json;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum EmailStatus {
    Pending,
    Sent,
    Failed,
}

impl EmailStatus {
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "sent" => Some(Self::Sent),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Sent => "sent",
            Self::Failed => "failed",
        }
    }
}

/// Attachment descriptor as handed over by the upload layer. Only metadata is
/// carried here; file bytes live at `storage_path`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentMeta {
    pub filename: String,
    pub storage_path: String,
    pub size_bytes: i64,
}

/// One row per send attempt. Field names on the wire are the contract with
/// the frontend, hence the camelCase serialization and the from/to renames.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct EmailRecord {
    pub id: String,
    #[serde(rename = "from")]
    pub from_addr: String,
    #[serde(rename = "to")]
    pub to_addr: String,
    pub subject: String,
    pub message: String,
    pub html: Option<String>,
    pub attachments: Json<Vec<AttachmentMeta>>,
    pub status: EmailStatus,
    pub message_id: Option<String>,
    pub error: Option<String>,
    pub sent_at: Option<i64>,
    pub attempts: i64,
    pub created_at: i64,
    pub updated_at: i64,
}
