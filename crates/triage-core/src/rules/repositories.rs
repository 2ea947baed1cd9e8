use chrono::{DateTime, SecondsFormat, Utc};
use libsql::{Row, params};
use thiserror::Error;
use tracing::warn;
use uuid::Uuid;

use crate::db::{Database, DbError};

use super::types::{
    AssigneeRule, LabelRule, NewAssigneeRule, NewLabelRule, RuleSet, RuleShapeError,
    StoredAssigneeRule, StoredLabelRule,
};
use super::validation::{RuleValidationError, validate_new_assignee_rule, validate_new_label_rule};

const LABEL_RULE_COLUMNS: &str = "id, rule_json, enabled, created_at, updated_at";
const ASSIGNEE_RULE_COLUMNS: &str = "id, priority, rule_json, enabled, created_at, updated_at";

#[derive(Debug, Error)]
pub enum RuleRepositoryError {
    #[error("database error: {0}")]
    Database(#[from] DbError),
    #[error("sql error: {0}")]
    Sql(#[from] libsql::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("datetime parse error: {0}")]
    DateTimeParse(#[from] chrono::ParseError),
    #[error("invalid rule: {0}")]
    Validation(#[from] RuleValidationError),
    #[error("malformed stored rule: {0}")]
    Shape(#[from] RuleShapeError),
    #[error("rule not found: {0}")]
    NotFound(String),
}

/// Durable storage for label and assignee rules.
///
/// Rules are stored as their JSON documents so older shapes written by other
/// tools survive; they are normalized on every read.
#[derive(Clone)]
pub struct RuleRepository {
    db: Database,
}

impl RuleRepository {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn create_label_rule(
        &self,
        new_rule: NewLabelRule,
    ) -> Result<LabelRule, RuleRepositoryError> {
        let new_rule = validate_new_label_rule(new_rule)?;
        let rule = LabelRule {
            id: Uuid::new_v4().to_string(),
            matcher: new_rule.matcher,
            label_names: new_rule.label_names,
            assign_to: new_rule.assign_to,
            enabled: new_rule.enabled,
            created_at: now_millis(),
        };
        self.insert_label_document(&StoredLabelRule::from(&rule))
            .await?;
        Ok(rule)
    }

    /// Insert a raw document as another writer would have stored it.
    pub async fn insert_label_document(
        &self,
        stored: &StoredLabelRule,
    ) -> Result<(), RuleRepositoryError> {
        let rule_json = serde_json::to_string(stored)?;
        let created_at = stored.created_at.unwrap_or_else(now_millis);
        let created_at = to_rfc3339(&created_at);
        let enabled = stored.enabled as i64;
        let conn = self.db.connection().await?;
        conn.execute(
            "INSERT INTO label_rules (id, rule_json, enabled, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4)",
            params![stored.id.clone(), rule_json, enabled, created_at],
        )
        .await?;
        Ok(())
    }

    pub async fn create_assignee_rule(
        &self,
        new_rule: NewAssigneeRule,
        allowed_domains: &[String],
    ) -> Result<AssigneeRule, RuleRepositoryError> {
        let new_rule = validate_new_assignee_rule(new_rule, allowed_domains)?;
        let rule = AssigneeRule {
            id: Uuid::new_v4().to_string(),
            enabled: new_rule.enabled,
            priority: new_rule.priority,
            matcher: new_rule.matcher,
            assignee_email: new_rule.assignee_email,
            unassigned_only: true,
            dangerous_domain_confirm: new_rule.dangerous_domain_confirm,
            created_at: now_millis(),
            updated_at: None,
        };
        self.insert_assignee_document(&StoredAssigneeRule::from(&rule))
            .await?;
        Ok(rule)
    }

    pub async fn insert_assignee_document(
        &self,
        stored: &StoredAssigneeRule,
    ) -> Result<(), RuleRepositoryError> {
        let rule_json = serde_json::to_string(stored)?;
        let created_at = to_rfc3339(&stored.created_at.unwrap_or_else(now_millis));
        let updated_at = stored.updated_at.as_ref().map(to_rfc3339);
        let enabled = stored.enabled as i64;
        let conn = self.db.connection().await?;
        conn.execute(
            "INSERT INTO assignee_rules (id, priority, rule_json, enabled, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                stored.id.clone(),
                stored.priority,
                rule_json,
                enabled,
                created_at,
                updated_at
            ],
        )
        .await?;
        Ok(())
    }

    /// Label rules in creation order. Documents that cannot be normalized are
    /// skipped with a warning.
    pub async fn list_label_rules(&self) -> Result<Vec<LabelRule>, RuleRepositoryError> {
        let conn = self.db.connection().await?;
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {LABEL_RULE_COLUMNS}
                     FROM label_rules
                     ORDER BY created_at, id"
                ),
                (),
            )
            .await?;

        let mut rules = Vec::new();
        while let Some(row) = rows.next().await? {
            match row_to_label_rule(row) {
                Ok(rule) => rules.push(rule),
                Err(RuleRepositoryError::Shape(err)) => {
                    warn!(error = %err, "skipping malformed label rule");
                }
                Err(err) => return Err(err),
            }
        }
        Ok(rules)
    }

    /// Assignee rules sorted by priority, then creation time.
    pub async fn list_assignee_rules(&self) -> Result<Vec<AssigneeRule>, RuleRepositoryError> {
        let conn = self.db.connection().await?;
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {ASSIGNEE_RULE_COLUMNS}
                     FROM assignee_rules
                     ORDER BY priority ASC, created_at, id"
                ),
                (),
            )
            .await?;

        let mut rules = Vec::new();
        while let Some(row) = rows.next().await? {
            match row_to_assignee_rule(row) {
                Ok(rule) => rules.push(rule),
                Err(RuleRepositoryError::Shape(err)) => {
                    warn!(error = %err, "skipping malformed assignee rule");
                }
                Err(err) => return Err(err),
            }
        }
        Ok(rules)
    }

    pub async fn load_rule_set(&self) -> Result<RuleSet, RuleRepositoryError> {
        Ok(RuleSet {
            label_rules: self.list_label_rules().await?,
            assignee_rules: self.list_assignee_rules().await?,
        })
    }

    pub async fn set_label_rule_enabled(
        &self,
        id: &str,
        enabled: bool,
    ) -> Result<(), RuleRepositoryError> {
        self.set_enabled("label_rules", id, enabled).await
    }

    pub async fn set_assignee_rule_enabled(
        &self,
        id: &str,
        enabled: bool,
    ) -> Result<(), RuleRepositoryError> {
        self.set_enabled("assignee_rules", id, enabled).await
    }

    async fn set_enabled(
        &self,
        table: &str,
        id: &str,
        enabled: bool,
    ) -> Result<(), RuleRepositoryError> {
        let enabled_flag = enabled as i64;
        let enabled_json = if enabled { "true" } else { "false" };
        let now = to_rfc3339(&now_millis());
        let conn = self.db.connection().await?;
        let mut rows = conn
            .query(
                &format!(
                    "UPDATE {table}
                     SET enabled = ?1,
                         rule_json = json_set(rule_json, '$.enabled', json(?2)),
                         updated_at = ?3
                     WHERE id = ?4
                     RETURNING id"
                ),
                params![enabled_flag, enabled_json, now, id],
            )
            .await?;

        match rows.next().await? {
            Some(_) => Ok(()),
            None => Err(RuleRepositoryError::NotFound(id.to_string())),
        }
    }

    pub async fn delete_label_rule(&self, id: &str) -> Result<(), RuleRepositoryError> {
        self.delete("label_rules", id).await
    }

    pub async fn delete_assignee_rule(&self, id: &str) -> Result<(), RuleRepositoryError> {
        self.delete("assignee_rules", id).await
    }

    async fn delete(&self, table: &str, id: &str) -> Result<(), RuleRepositoryError> {
        let conn = self.db.connection().await?;
        let mut rows = conn
            .query(
                &format!("DELETE FROM {table} WHERE id = ?1 RETURNING id"),
                params![id],
            )
            .await?;

        match rows.next().await? {
            Some(_) => Ok(()),
            None => Err(RuleRepositoryError::NotFound(id.to_string())),
        }
    }
}

fn now_millis() -> DateTime<Utc> {
    let now = Utc::now();
    DateTime::parse_from_rfc3339(&to_rfc3339(&now))
        .map(|parsed| parsed.with_timezone(&Utc))
        .unwrap_or(now)
}

fn to_rfc3339(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, RuleRepositoryError> {
    Ok(DateTime::parse_from_rfc3339(value)?.with_timezone(&Utc))
}

fn row_to_label_rule(row: Row) -> Result<LabelRule, RuleRepositoryError> {
    let id: String = row.get(0)?;
    let rule_json: String = row.get(1)?;
    let enabled: i64 = row.get(2)?;
    let created_at: String = row.get(3)?;

    let mut stored: StoredLabelRule = serde_json::from_str(&rule_json)?;
    // Columns are authoritative over whatever the document carries.
    stored.id = id;
    stored.enabled = enabled != 0;
    stored.created_at = Some(parse_timestamp(&created_at)?);
    Ok(LabelRule::try_from(stored)?)
}

fn row_to_assignee_rule(row: Row) -> Result<AssigneeRule, RuleRepositoryError> {
    let id: String = row.get(0)?;
    let priority: i64 = row.get(1)?;
    let rule_json: String = row.get(2)?;
    let enabled: i64 = row.get(3)?;
    let created_at: String = row.get(4)?;
    let updated_at: Option<String> = row.get(5)?;

    let mut stored: StoredAssigneeRule = serde_json::from_str(&rule_json)?;
    stored.id = id;
    stored.priority = priority;
    stored.enabled = enabled != 0;
    stored.created_at = Some(parse_timestamp(&created_at)?);
    stored.updated_at = updated_at.as_deref().map(parse_timestamp).transpose()?;
    Ok(AssigneeRule::try_from(stored)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrations::run_migrations;
    use crate::rules::types::{AssignTo, SenderMatch, StoredSenderMatch};
    use std::collections::BTreeSet;
    use tempfile::TempDir;

    async fn setup_repo() -> (RuleRepository, TempDir) {
        let dir = TempDir::new().expect("temp dir");
        let db_name = format!("db_{}.sqlite", Uuid::new_v4());
        let db = Database::new(&dir.path().join(db_name))
            .await
            .expect("create db");
        run_migrations(&db).await.expect("migrations");
        (RuleRepository::new(db), dir)
    }

    fn new_label_rule(matcher: SenderMatch, labels: &[&str]) -> NewLabelRule {
        NewLabelRule {
            matcher,
            label_names: labels.iter().map(|label| label.to_string()).collect(),
            assign_to: None,
            enabled: true,
        }
    }

    fn new_assignee_rule(priority: i64, domain: &str, assignee: &str) -> NewAssigneeRule {
        NewAssigneeRule {
            enabled: true,
            priority,
            matcher: SenderMatch::domain(domain),
            assignee_email: assignee.into(),
            dangerous_domain_confirm: false,
        }
    }

    #[tokio::test]
    async fn create_and_list_label_rules() {
        let (repo, _dir) = setup_repo().await;
        let mut new_rule = new_label_rule(SenderMatch::domain("@Vendor.IO"), &["VIP"]);
        new_rule.assign_to = Some(AssignTo::Me);

        let created = repo.create_label_rule(new_rule).await.expect("create");
        assert_eq!(created.matcher.from_domain.as_deref(), Some("vendor.io"));

        let listed = repo.list_label_rules().await.expect("list");
        assert_eq!(listed, vec![created]);
    }

    #[tokio::test]
    async fn legacy_documents_are_normalized_on_read() {
        let (repo, _dir) = setup_repo().await;
        let legacy = StoredLabelRule {
            id: "legacy-1".into(),
            matcher: StoredSenderMatch {
                from_email: Some("Alerts@Vendor.io".into()),
                from_domain: None,
            },
            label_name: Some("Alerts".into()),
            label_names: None,
            assign_to: None,
            enabled: true,
            created_at: None,
        };
        repo.insert_label_document(&legacy).await.expect("insert");

        let rules = repo.list_label_rules().await.expect("list");
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].id, "legacy-1");
        assert_eq!(rules[0].label_names, BTreeSet::from(["Alerts".to_string()]));
        assert_eq!(
            rules[0].matcher.from_email.as_deref(),
            Some("alerts@vendor.io")
        );
    }

    #[tokio::test]
    async fn malformed_documents_are_skipped() {
        let (repo, _dir) = setup_repo().await;
        let broken = StoredLabelRule {
            id: "broken".into(),
            label_names: Some(vec!["VIP".into()]),
            enabled: true,
            ..Default::default()
        };
        repo.insert_label_document(&broken).await.expect("insert");
        repo.create_label_rule(new_label_rule(SenderMatch::domain("vendor.io"), &["VIP"]))
            .await
            .expect("create");

        let rules = repo.list_label_rules().await.expect("list");
        assert_eq!(rules.len(), 1);
        assert_ne!(rules[0].id, "broken");
    }

    #[tokio::test]
    async fn assignee_rules_are_validated_and_sorted_by_priority() {
        let (repo, _dir) = setup_repo().await;
        let allowed = vec!["team.io".to_string()];

        let late = repo
            .create_assignee_rule(new_assignee_rule(5, "vendor.io", "B@Team.io"), &allowed)
            .await
            .expect("create late");
        let early = repo
            .create_assignee_rule(new_assignee_rule(0, "vendor.io", "a@team.io"), &allowed)
            .await
            .expect("create early");
        assert_eq!(late.assignee_email, "b@team.io");

        let rejected = repo
            .create_assignee_rule(new_assignee_rule(1, "vendor.io", "x@other.io"), &allowed)
            .await;
        assert!(matches!(
            rejected,
            Err(RuleRepositoryError::Validation(
                RuleValidationError::AssigneeDomainNotAllowed { .. }
            ))
        ));

        let rules = repo.list_assignee_rules().await.expect("list");
        let ids: Vec<&str> = rules.iter().map(|rule| rule.id.as_str()).collect();
        assert_eq!(ids, vec![early.id.as_str(), late.id.as_str()]);
        assert!(rules.iter().all(|rule| rule.unassigned_only));
    }

    #[tokio::test]
    async fn toggling_and_deleting_rules() {
        let (repo, _dir) = setup_repo().await;
        let rule = repo
            .create_label_rule(new_label_rule(SenderMatch::domain("vendor.io"), &["VIP"]))
            .await
            .expect("create");

        repo.set_label_rule_enabled(&rule.id, false)
            .await
            .expect("disable");
        let rules = repo.load_rule_set().await.expect("load");
        assert!(!rules.label_rules[0].enabled);

        repo.delete_label_rule(&rule.id).await.expect("delete");
        assert!(repo.list_label_rules().await.expect("list").is_empty());
        assert!(matches!(
            repo.delete_label_rule(&rule.id).await,
            Err(RuleRepositoryError::NotFound(_))
        ));
    }
}
