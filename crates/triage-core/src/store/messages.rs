use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use libsql::{Row, params};
use serde::{Deserialize, Serialize};

use crate::db::Database;
use crate::rules::normalize_email;

use super::{MessageStore, SampleFilter, SampledMessage, StoreError};

const MESSAGE_COLUMNS: &str = "id, sender_email, labels_json, assignee_email";

/// Message as written by the mail sync collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMessage {
    pub id: String,
    pub sender_email: Option<String>,
    pub labels: Vec<String>,
    pub assignee_email: Option<String>,
    pub received_at: DateTime<Utc>,
}

/// libsql-backed view of the current mailbox.
#[derive(Clone)]
pub struct MessageRepository {
    db: Database,
}

impl MessageRepository {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Insert or replace a message. Sender addresses are stored normalized.
    pub async fn upsert(&self, message: &NewMessage) -> Result<(), StoreError> {
        let sender_email = message.sender_email.as_deref().and_then(normalize_email);
        let labels_json = serde_json::to_string(&message.labels)?;
        let received_at = message
            .received_at
            .to_rfc3339_opts(SecondsFormat::Millis, true);
        let now = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);

        let conn = self.db.connection().await?;
        conn.execute(
            "INSERT INTO messages (id, sender_email, labels_json, assignee_email, received_at, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
             ON CONFLICT(id) DO UPDATE SET
                sender_email = excluded.sender_email,
                labels_json = excluded.labels_json,
                assignee_email = excluded.assignee_email,
                received_at = excluded.received_at,
                updated_at = excluded.updated_at",
            params![
                message.id.clone(),
                sender_email,
                labels_json,
                message.assignee_email.clone(),
                received_at,
                now
            ],
        )
        .await?;
        Ok(())
    }
}

#[async_trait]
impl MessageStore for MessageRepository {
    /// Most recently received messages first.
    async fn sample_messages(
        &self,
        sample_size: usize,
        filter: SampleFilter,
    ) -> Result<Vec<SampledMessage>, StoreError> {
        let limit = i64::try_from(sample_size).unwrap_or(i64::MAX);
        let where_clause = if filter.unassigned_only {
            "WHERE assignee_email IS NULL"
        } else {
            ""
        };

        let conn = self.db.connection().await?;
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {MESSAGE_COLUMNS}
                     FROM messages
                     {where_clause}
                     ORDER BY received_at DESC, id
                     LIMIT ?1"
                ),
                params![limit],
            )
            .await?;

        let mut messages = Vec::new();
        while let Some(row) = rows.next().await? {
            messages.push(row_to_sampled_message(row)?);
        }
        Ok(messages)
    }

    async fn sender_email(&self, message_id: &str) -> Result<Option<String>, StoreError> {
        let conn = self.db.connection().await?;
        let mut rows = conn
            .query(
                "SELECT sender_email FROM messages WHERE id = ?1",
                params![message_id],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(row.get::<Option<String>>(0)?),
            None => Ok(None),
        }
    }
}

fn row_to_sampled_message(row: Row) -> Result<SampledMessage, StoreError> {
    let labels_json: String = row.get(2)?;
    Ok(SampledMessage {
        id: row.get(0)?,
        sender_email: row.get(1)?,
        labels: serde_json::from_str(&labels_json)?,
        assignee_email: row.get(3)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrations::run_migrations;
    use chrono::Duration;
    use tempfile::TempDir;
    use uuid::Uuid;

    async fn setup_repo() -> (MessageRepository, TempDir) {
        let dir = TempDir::new().expect("temp dir");
        let db_name = format!("db_{}.sqlite", Uuid::new_v4());
        let db = Database::new(&dir.path().join(db_name))
            .await
            .expect("create db");
        run_migrations(&db).await.expect("migrations");
        (MessageRepository::new(db), dir)
    }

    fn message(id: &str, sender: &str, assignee: Option<&str>, minutes_ago: i64) -> NewMessage {
        NewMessage {
            id: id.into(),
            sender_email: Some(sender.into()),
            labels: vec!["Inbox".into()],
            assignee_email: assignee.map(str::to_string),
            received_at: Utc::now() - Duration::minutes(minutes_ago),
        }
    }

    #[tokio::test]
    async fn sample_returns_newest_messages_up_to_the_limit() {
        let (repo, _dir) = setup_repo().await;
        for (index, id) in ["m1", "m2", "m3"].iter().enumerate() {
            repo.upsert(&message(id, "user@vendor.io", None, index as i64))
                .await
                .expect("upsert");
        }

        let sample = repo
            .sample_messages(2, SampleFilter::all())
            .await
            .expect("sample");
        let ids: Vec<_> = sample.iter().map(|message| message.id.as_str()).collect();
        assert_eq!(ids, vec!["m1", "m2"]);
        assert_eq!(sample[0].labels, vec!["Inbox".to_string()]);
    }

    #[tokio::test]
    async fn unassigned_filter_skips_owned_messages() {
        let (repo, _dir) = setup_repo().await;
        repo.upsert(&message("owned", "a@vendor.io", Some("agent@support.io"), 1))
            .await
            .expect("upsert");
        repo.upsert(&message("open", "b@vendor.io", None, 2))
            .await
            .expect("upsert");

        let sample = repo
            .sample_messages(10, SampleFilter::unassigned())
            .await
            .expect("sample");
        assert_eq!(sample.len(), 1);
        assert_eq!(sample[0].id, "open");
    }

    #[tokio::test]
    async fn sender_lookup_normalizes_and_handles_missing_messages() {
        let (repo, _dir) = setup_repo().await;
        repo.upsert(&message("m1", "Jane Doe <Jane@Vendor.IO>", None, 0))
            .await
            .expect("upsert");

        assert_eq!(
            repo.sender_email("m1").await.expect("lookup").as_deref(),
            Some("jane@vendor.io")
        );
        assert_eq!(repo.sender_email("missing").await.expect("lookup"), None);
    }
}
