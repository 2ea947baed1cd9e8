//! Collaborators the engine reads from: the message store and the audit log.
//!
//! The engine only ever holds these behind `Arc<dyn ...>`; both traits are
//! read-only from its point of view.

pub mod audit_log;
pub mod messages;
pub mod mock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::db::DbError;

pub use audit_log::{AuditLogRepository, NewAuditLogEntry};
pub use messages::{MessageRepository, NewMessage};
pub use mock::{InMemoryAuditLog, InMemoryMessageStore};

pub const ACTION_MUTE: &str = "mute";
pub const ACTION_ASSIGN: &str = "assign";
pub const ACTION_TAKEOVER: &str = "takeover";
pub const ACTION_LABEL_APPLY: &str = "label_apply";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] DbError),
    #[error("sql error: {0}")]
    Sql(#[from] libsql::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("datetime parse error: {0}")]
    DateTimeParse(#[from] chrono::ParseError),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleFilter {
    /// Only messages nobody owns yet.
    pub unassigned_only: bool,
}

impl SampleFilter {
    pub fn all() -> Self {
        Self {
            unassigned_only: false,
        }
    }

    pub fn unassigned() -> Self {
        Self {
            unassigned_only: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampledMessage {
    pub id: String,
    pub sender_email: Option<String>,
    #[serde(default)]
    pub labels: Vec<String>,
    pub assignee_email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub timestamp: DateTime<Utc>,
    pub actor_email: String,
    pub action: String,
    pub message_id: String,
    pub label: Option<String>,
    pub metadata: Option<Value>,
}

impl AuditLogEntry {
    /// Look up a string field in the entry metadata, trying each key in turn.
    pub fn metadata_str(&self, keys: &[&str]) -> Option<&str> {
        let metadata = self.metadata.as_ref()?;
        keys.iter()
            .find_map(|key| metadata.get(*key).and_then(Value::as_str))
    }
}

/// Read access to the mailbox. Implementations own their timeouts and retries.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Up to `sample_size` current messages. May return fewer.
    async fn sample_messages(
        &self,
        sample_size: usize,
        filter: SampleFilter,
    ) -> Result<Vec<SampledMessage>, StoreError>;

    async fn sender_email(&self, message_id: &str) -> Result<Option<String>, StoreError>;
}

#[async_trait]
pub trait AuditLog: Send + Sync {
    /// Entries recorded at or after `since`. Older entries may slip through;
    /// callers drop them.
    async fn list_entries(&self, since: DateTime<Utc>) -> Result<Vec<AuditLogEntry>, StoreError>;
}
