use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use libsql::{Row, params};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::db::Database;

use super::{AuditLog, AuditLogEntry, StoreError};

const AUDIT_COLUMNS: &str = "actor_email, action, message_id, label, metadata_json, created_at";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewAuditLogEntry {
    pub actor_email: String,
    pub action: String,
    pub message_id: String,
    pub label: Option<String>,
    pub metadata: Option<Value>,
    pub timestamp: DateTime<Utc>,
}

/// Append-only audit history backed by libsql.
#[derive(Clone)]
pub struct AuditLogRepository {
    db: Database,
}

impl AuditLogRepository {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn append(&self, entry: &NewAuditLogEntry) -> Result<String, StoreError> {
        let id = Uuid::new_v4().to_string();
        let metadata_json = entry
            .metadata
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let created_at = entry.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true);

        let conn = self.db.connection().await?;
        conn.execute(
            "INSERT INTO audit_log (id, actor_email, action, message_id, label, metadata_json, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                id.clone(),
                entry.actor_email.clone(),
                entry.action.clone(),
                entry.message_id.clone(),
                entry.label.clone(),
                metadata_json,
                created_at
            ],
        )
        .await?;
        Ok(id)
    }
}

#[async_trait]
impl AuditLog for AuditLogRepository {
    async fn list_entries(&self, since: DateTime<Utc>) -> Result<Vec<AuditLogEntry>, StoreError> {
        let since = since.to_rfc3339_opts(SecondsFormat::Millis, true);
        let conn = self.db.connection().await?;
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {AUDIT_COLUMNS}
                     FROM audit_log
                     WHERE created_at >= ?1
                     ORDER BY created_at, id"
                ),
                params![since],
            )
            .await?;

        let mut entries = Vec::new();
        while let Some(row) = rows.next().await? {
            entries.push(row_to_entry(row)?);
        }
        Ok(entries)
    }
}

fn row_to_entry(row: Row) -> Result<AuditLogEntry, StoreError> {
    let metadata_json: Option<String> = row.get(4)?;
    let created_at: String = row.get(5)?;
    Ok(AuditLogEntry {
        actor_email: row.get(0)?,
        action: row.get(1)?,
        message_id: row.get(2)?,
        label: row.get(3)?,
        metadata: metadata_json
            .as_deref()
            .map(serde_json::from_str)
            .transpose()?,
        timestamp: DateTime::parse_from_rfc3339(&created_at)?.with_timezone(&Utc),
    })
}
