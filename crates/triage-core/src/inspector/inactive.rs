use crate::rules::{AssigneeRule, LabelRule};

use super::sample::Samples;
use super::types::{InactiveRule, RuleType};

/// Enabled rules with zero hits in their audience's draw.
///
/// An empty draw proves nothing, so it yields no findings, and neither does
/// a failed one.
pub(crate) fn inactive_rules(
    label_rules: &[LabelRule],
    assignee_rules: &[AssigneeRule],
    samples: &Samples,
) -> Vec<InactiveRule> {
    let mut findings = Vec::new();

    if let Some(draw) = samples.label.as_ref().filter(|draw| draw.size > 0) {
        findings.extend(
            label_rules
                .iter()
                .filter(|rule| rule.enabled && draw.hits(&rule.matcher) == 0)
                .map(|rule| InactiveRule {
                    rule_id: rule.id.clone(),
                    rule_type: RuleType::Label,
                    match_condition: rule.matcher.to_string(),
                    message: format!(
                        "enabled label rule matched none of {} sampled messages",
                        draw.size
                    ),
                }),
        );
    }

    if let Some(draw) = samples.assignee.as_ref().filter(|draw| draw.size > 0) {
        findings.extend(
            assignee_rules
                .iter()
                .filter(|rule| rule.enabled && draw.hits(&rule.matcher) == 0)
                .map(|rule| InactiveRule {
                    rule_id: rule.id.clone(),
                    rule_type: RuleType::Assignee,
                    match_condition: rule.matcher.to_string(),
                    message: format!(
                        "enabled assignee rule matched none of {} sampled unassigned messages",
                        draw.size
                    ),
                }),
        );
    }

    findings
}
