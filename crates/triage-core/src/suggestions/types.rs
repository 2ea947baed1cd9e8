use serde::{Deserialize, Serialize};

use crate::rules::{NewAssigneeRule, NewLabelRule};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionType {
    AutoLabel,
    AutoMute,
    AutoAssign,
}

impl SuggestionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SuggestionType::AutoLabel => "auto_label",
            SuggestionType::AutoMute => "auto_mute",
            SuggestionType::AutoAssign => "auto_assign",
        }
    }
}

/// Mining window and the two evidence thresholds. Both thresholds must hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuggestionParams {
    pub days: u32,
    pub min_actions: usize,
    pub min_actors: usize,
}

impl Default for SuggestionParams {
    fn default() -> Self {
        Self {
            days: 14,
            min_actions: 3,
            min_actors: 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MinerConfig {
    /// Sender lookups in flight at once, per category.
    pub lookup_concurrency: usize,
    /// Label proposed by auto_mute suggestions.
    pub mute_label: String,
    /// Mine `label_apply` audit entries into auto_label suggestions.
    pub mine_label_applications: bool,
}

impl Default for MinerConfig {
    fn default() -> Self {
        Self {
            lookup_concurrency: 8,
            mute_label: "Muted".to_string(),
            mine_label_applications: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuggestedSender {
    pub from_email: String,
    pub from_domain: String,
}

/// Rule a suggestion would create if accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProposedRule {
    Label(NewLabelRule),
    Assignee(NewAssigneeRule),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionWarning {
    BroadDomain,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSuggestion {
    pub suggestion_id: String,
    #[serde(rename = "type")]
    pub suggestion_type: SuggestionType,
    pub sender: SuggestedSender,
    pub reason: String,
    pub evidence_count: usize,
    pub actor_count: usize,
    /// Up to five actors, sorted.
    pub actors: Vec<String>,
    pub proposed_rule: ProposedRule,
    pub warnings: Vec<SuggestionWarning>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuggestionReport {
    pub suggestions: Vec<RuleSuggestion>,
    pub warnings: Vec<String>,
}
