use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::rules::{AssignTo, MatchReason, ResolvedAssignee};

/// Sample size and the absolute hit count above which a rule is flagged.
///
/// The two are independent: with the defaults a single draw can never exceed
/// the threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct InspectorConfig {
    pub sample_size: usize,
    pub too_many_matches_threshold: usize,
}

impl Default for InspectorConfig {
    fn default() -> Self {
        Self {
            sample_size: 50,
            too_many_matches_threshold: 100,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleType {
    Label,
    Assignee,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictType {
    LabelLabel,
    AssigneeAssignee,
    /// A label rule and an assignee rule on the same sender. Never produced.
    CrossType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleConflict {
    #[serde(rename = "type")]
    pub conflict_type: ConflictType,
    /// Always two ids, smallest first.
    pub rule_ids: Vec<String>,
    pub match_condition: String,
    /// Outcome of each rule, in `rule_ids` order.
    pub conflicting_results: Vec<String>,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DangerReason {
    BroadDomain,
    TooManyMatches,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DangerousRule {
    pub rule_id: String,
    pub rule_type: RuleType,
    pub reason: DangerReason,
    pub match_condition: String,
    pub message: String,
    /// Hits in the sample draw, when that draw succeeded.
    pub preview_count: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InactiveRule {
    pub rule_id: String,
    pub rule_type: RuleType,
    pub match_condition: String,
    pub message: String,
}

/// Messages actually evaluated per audience. `None` means the draw failed
/// and findings derived from it were omitted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleCoverage {
    pub label_sample_size: Option<usize>,
    pub assignee_sample_size: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DangerReport {
    pub dangerous_rules: Vec<DangerousRule>,
    pub coverage: SampleCoverage,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InactivityReport {
    pub inactive_rules: Vec<InactiveRule>,
    pub coverage: SampleCoverage,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleHealthReport {
    pub conflicts: Vec<RuleConflict>,
    pub dangerous_rules: Vec<DangerousRule>,
    pub inactive_rules: Vec<InactiveRule>,
    pub coverage: SampleCoverage,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelRuleTrace {
    pub rule_id: String,
    pub enabled: bool,
    pub match_condition: String,
    pub reason: Option<MatchReason>,
    pub label_names: BTreeSet<String>,
    /// Enabled and matched: its labels are in the outcome.
    pub applied: bool,
    /// This rule supplied the outcome's assignment.
    pub assign_to_applied: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssigneeRuleTrace {
    pub rule_id: String,
    pub enabled: bool,
    pub priority: i64,
    pub match_condition: String,
    pub reason: Option<MatchReason>,
    pub assignee_email: String,
    pub selected: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExplainedOutcome {
    pub labels: BTreeSet<String>,
    pub assign_to: Option<AssignTo>,
    pub assignee: Option<ResolvedAssignee>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageExplanation {
    pub message_id: String,
    pub from_email: Option<String>,
    pub label_rules: Vec<LabelRuleTrace>,
    /// In evaluation order.
    pub assignee_rules: Vec<AssigneeRuleTrace>,
    pub outcome: ExplainedOutcome,
    pub warnings: Vec<String>,
}
