use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::matcher::normalize_email;
use super::safety::normalize_domain;

/// Sender condition shared by label and assignee rules.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SenderMatch {
    pub from_email: Option<String>,
    pub from_domain: Option<String>,
}

impl SenderMatch {
    pub fn email(email: impl Into<String>) -> Self {
        Self {
            from_email: Some(email.into()),
            from_domain: None,
        }
    }

    pub fn domain(domain: impl Into<String>) -> Self {
        Self {
            from_email: None,
            from_domain: Some(domain.into()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.from_email.is_none() && self.from_domain.is_none()
    }

    /// Normalize both fields, dropping values that are blank after trimming.
    pub fn normalized(&self) -> Self {
        let from_email = self
            .from_email
            .as_deref()
            .map(|email| email.trim().to_lowercase())
            .filter(|email| !email.is_empty());
        let from_domain = self
            .from_domain
            .as_deref()
            .map(normalize_domain)
            .filter(|domain| !domain.is_empty());
        Self {
            from_email,
            from_domain,
        }
    }
}

impl fmt::Display for SenderMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.from_email, &self.from_domain) {
            (Some(email), Some(domain)) => write!(f, "fromEmail={email} | fromDomain={domain}"),
            (Some(email), None) => write!(f, "fromEmail={email}"),
            (None, Some(domain)) => write!(f, "fromDomain={domain}"),
            (None, None) => write!(f, "(no condition)"),
        }
    }
}

/// Which part of a sender condition produced a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MatchReason {
    FromEmail,
    FromDomain,
}

impl MatchReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchReason::FromEmail => "fromEmail",
            MatchReason::FromDomain => "fromDomain",
        }
    }
}

/// Assignment directive carried by a label rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AssignTo {
    /// The person applying the rule takes the message.
    Me,
    Assignee { assignee_email: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelRule {
    pub id: String,
    #[serde(rename = "match")]
    pub matcher: SenderMatch,
    pub label_names: BTreeSet<String>,
    pub assign_to: Option<AssignTo>,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssigneeRule {
    pub id: String,
    pub enabled: bool,
    pub priority: i64,
    #[serde(rename = "match")]
    pub matcher: SenderMatch,
    pub assignee_email: String,
    /// Assignment only targets unassigned messages; kept for the stored shape.
    pub unassigned_only: bool,
    pub dangerous_domain_confirm: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Label rules plus assignee rules as read for one analysis call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleSet {
    pub label_rules: Vec<LabelRule>,
    pub assignee_rules: Vec<AssigneeRule>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewLabelRule {
    pub matcher: SenderMatch,
    pub label_names: BTreeSet<String>,
    pub assign_to: Option<AssignTo>,
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewAssigneeRule {
    pub enabled: bool,
    pub priority: i64,
    pub matcher: SenderMatch,
    pub assignee_email: String,
    pub dangerous_domain_confirm: bool,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RuleShapeError {
    #[error("rule {0} has neither fromEmail nor fromDomain")]
    MissingMatchCondition(String),
    #[error("label rule {0} has no label names")]
    MissingLabels(String),
    #[error("rule {id} has unsupported assignTo value {value}")]
    InvalidAssignTo { id: String, value: String },
    #[error("assignee rule {0} has no assignee email")]
    MissingAssignee(String),
}

/// Stored label rule document, tolerant of legacy shapes.
///
/// Older documents carry a single `labelName`; newer ones a `labelNames` list.
/// `assignTo` is either the string `"me"` or an object with `assigneeEmail`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredLabelRule {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "match", default)]
    pub matcher: StoredSenderMatch,
    #[serde(default)]
    pub label_name: Option<String>,
    #[serde(default)]
    pub label_names: Option<Vec<String>>,
    #[serde(default)]
    pub assign_to: Option<StoredAssignTo>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredSenderMatch {
    #[serde(default)]
    pub from_email: Option<String>,
    #[serde(default)]
    pub from_domain: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StoredAssignTo {
    Keyword(String),
    #[serde(rename_all = "camelCase")]
    Target { assignee_email: String },
}

/// Stored assignee rule document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredAssigneeRule {
    #[serde(default)]
    pub id: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub priority: i64,
    #[serde(rename = "match", default)]
    pub matcher: StoredSenderMatch,
    #[serde(default)]
    pub assignee_email: String,
    #[serde(default)]
    pub when: Option<StoredWhen>,
    #[serde(default)]
    pub safety: Option<StoredSafety>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredWhen {
    #[serde(default)]
    pub unassigned_only: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredSafety {
    #[serde(default)]
    pub dangerous_domain_confirm: bool,
}

fn default_true() -> bool {
    true
}

impl From<StoredSenderMatch> for SenderMatch {
    fn from(stored: StoredSenderMatch) -> Self {
        SenderMatch {
            from_email: stored.from_email,
            from_domain: stored.from_domain,
        }
        .normalized()
    }
}

impl TryFrom<StoredLabelRule> for LabelRule {
    type Error = RuleShapeError;

    fn try_from(stored: StoredLabelRule) -> Result<Self, Self::Error> {
        let matcher = SenderMatch::from(stored.matcher);
        if matcher.is_empty() {
            return Err(RuleShapeError::MissingMatchCondition(stored.id));
        }

        let label_names: BTreeSet<String> = stored
            .label_names
            .unwrap_or_default()
            .into_iter()
            .chain(stored.label_name)
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
            .collect();
        if label_names.is_empty() {
            return Err(RuleShapeError::MissingLabels(stored.id));
        }

        let assign_to = match stored.assign_to {
            None => None,
            Some(StoredAssignTo::Keyword(value)) if value.eq_ignore_ascii_case("me") => {
                Some(AssignTo::Me)
            }
            Some(StoredAssignTo::Keyword(value)) if value.trim().is_empty() => None,
            Some(StoredAssignTo::Keyword(value)) => {
                return Err(RuleShapeError::InvalidAssignTo {
                    id: stored.id,
                    value,
                });
            }
            Some(StoredAssignTo::Target { assignee_email }) => {
                match normalize_email(&assignee_email) {
                    Some(assignee_email) => Some(AssignTo::Assignee { assignee_email }),
                    None => {
                        return Err(RuleShapeError::InvalidAssignTo {
                            id: stored.id,
                            value: assignee_email,
                        });
                    }
                }
            }
        };

        Ok(LabelRule {
            id: stored.id,
            matcher,
            label_names,
            assign_to,
            enabled: stored.enabled,
            created_at: stored.created_at.unwrap_or_default(),
        })
    }
}

impl TryFrom<StoredAssigneeRule> for AssigneeRule {
    type Error = RuleShapeError;

    fn try_from(stored: StoredAssigneeRule) -> Result<Self, Self::Error> {
        let matcher = SenderMatch::from(stored.matcher);
        if matcher.is_empty() {
            return Err(RuleShapeError::MissingMatchCondition(stored.id));
        }
        let assignee_email = stored.assignee_email.trim().to_lowercase();
        if assignee_email.is_empty() {
            return Err(RuleShapeError::MissingAssignee(stored.id));
        }

        Ok(AssigneeRule {
            id: stored.id,
            enabled: stored.enabled,
            priority: stored.priority,
            matcher,
            assignee_email,
            // Stored documents may say otherwise; assignment never overrides an owner.
            unassigned_only: true,
            dangerous_domain_confirm: stored
                .safety
                .map(|safety| safety.dangerous_domain_confirm)
                .unwrap_or(false),
            created_at: stored.created_at.unwrap_or_default(),
            updated_at: stored.updated_at,
        })
    }
}

impl From<&LabelRule> for StoredLabelRule {
    fn from(rule: &LabelRule) -> Self {
        StoredLabelRule {
            id: rule.id.clone(),
            matcher: StoredSenderMatch {
                from_email: rule.matcher.from_email.clone(),
                from_domain: rule.matcher.from_domain.clone(),
            },
            label_name: None,
            label_names: Some(rule.label_names.iter().cloned().collect()),
            assign_to: rule.assign_to.as_ref().map(|assign_to| match assign_to {
                AssignTo::Me => StoredAssignTo::Keyword("me".to_string()),
                AssignTo::Assignee { assignee_email } => StoredAssignTo::Target {
                    assignee_email: assignee_email.clone(),
                },
            }),
            enabled: rule.enabled,
            created_at: Some(rule.created_at),
        }
    }
}

impl From<&AssigneeRule> for StoredAssigneeRule {
    fn from(rule: &AssigneeRule) -> Self {
        StoredAssigneeRule {
            id: rule.id.clone(),
            enabled: rule.enabled,
            priority: rule.priority,
            matcher: StoredSenderMatch {
                from_email: rule.matcher.from_email.clone(),
                from_domain: rule.matcher.from_domain.clone(),
            },
            assignee_email: rule.assignee_email.clone(),
            when: Some(StoredWhen {
                unassigned_only: Some(true),
            }),
            safety: Some(StoredSafety {
                dangerous_domain_confirm: rule.dangerous_domain_confirm,
            }),
            created_at: Some(rule.created_at),
            updated_at: rule.updated_at,
        }
    }
}
