//! Pairwise conflict detection between enabled rules.

use std::collections::BTreeSet;

use crate::rules::{AssigneeRule, LabelRule, SenderMatch, extract_domain};

use super::types::{ConflictType, RuleConflict};

/// Describe the condition two matchers share, if they cover the same senders.
///
/// Equivalent means the same address, the same domain, or one side's address
/// living in the other side's domain.
pub fn shared_condition(a: &SenderMatch, b: &SenderMatch) -> Option<String> {
    let a = a.normalized();
    let b = b.normalized();

    if let (Some(left), Some(right)) = (&a.from_email, &b.from_email) {
        if left == right {
            return Some(format!("fromEmail={left}"));
        }
    }
    if let (Some(left), Some(right)) = (&a.from_domain, &b.from_domain) {
        if left == right {
            return Some(format!("fromDomain={left}"));
        }
    }
    email_within_domain(&a, &b).or_else(|| email_within_domain(&b, &a))
}

fn email_within_domain(with_email: &SenderMatch, with_domain: &SenderMatch) -> Option<String> {
    let email = with_email.from_email.as_deref()?;
    let domain = with_domain.from_domain.as_deref()?;
    (extract_domain(email) == Some(domain))
        .then(|| format!("fromEmail={email} within fromDomain={domain}"))
}

fn join_labels(labels: &BTreeSet<String>) -> String {
    labels.iter().cloned().collect::<Vec<_>>().join(", ")
}

fn ordered<'a, T>(a: (&'a str, T), b: (&'a str, T)) -> [(&'a str, T); 2] {
    if b.0 < a.0 { [b, a] } else { [a, b] }
}

pub fn label_conflicts(rules: &[LabelRule]) -> Vec<RuleConflict> {
    let enabled: Vec<&LabelRule> = rules.iter().filter(|rule| rule.enabled).collect();
    let mut conflicts = Vec::new();

    for (index, a) in enabled.iter().enumerate() {
        for b in &enabled[index + 1..] {
            if a.label_names == b.label_names {
                continue;
            }
            let Some(condition) = shared_condition(&a.matcher, &b.matcher) else {
                continue;
            };

            let [first, second] = ordered(
                (a.id.as_str(), join_labels(&a.label_names)),
                (b.id.as_str(), join_labels(&b.label_names)),
            );
            conflicts.push(RuleConflict {
                conflict_type: ConflictType::LabelLabel,
                rule_ids: vec![first.0.to_string(), second.0.to_string()],
                message: format!(
                    "label rules {} and {} both match {condition} but apply different labels",
                    first.0, second.0
                ),
                match_condition: condition,
                conflicting_results: vec![first.1, second.1],
            });
        }
    }

    conflicts
}

/// Only rules at the same priority can conflict; otherwise the lower one wins.
pub fn assignee_conflicts(rules: &[AssigneeRule]) -> Vec<RuleConflict> {
    let enabled: Vec<&AssigneeRule> = rules.iter().filter(|rule| rule.enabled).collect();
    let mut conflicts = Vec::new();

    for (index, a) in enabled.iter().enumerate() {
        for b in &enabled[index + 1..] {
            if a.priority != b.priority
                || a.assignee_email.eq_ignore_ascii_case(&b.assignee_email)
            {
                continue;
            }
            let Some(condition) = shared_condition(&a.matcher, &b.matcher) else {
                continue;
            };

            let [first, second] = ordered(
                (a.id.as_str(), a.assignee_email.clone()),
                (b.id.as_str(), b.assignee_email.clone()),
            );
            conflicts.push(RuleConflict {
                conflict_type: ConflictType::AssigneeAssignee,
                rule_ids: vec![first.0.to_string(), second.0.to_string()],
                message: format!(
                    "assignee rules {} and {} share priority {} and both match {condition} but assign different people",
                    first.0, second.0, a.priority
                ),
                match_condition: condition,
                conflicting_results: vec![first.1, second.1],
            });
        }
    }

    conflicts
}

/// All conflicts, sorted by type and then rule ids so input order never shows.
pub fn find_conflicts(
    label_rules: &[LabelRule],
    assignee_rules: &[AssigneeRule],
) -> Vec<RuleConflict> {
    let mut conflicts = label_conflicts(label_rules);
    conflicts.extend(assignee_conflicts(assignee_rules));
    // ConflictType::CrossType is not detected.
    conflicts.sort_by(|a, b| {
        a.conflict_type
            .cmp(&b.conflict_type)
            .then_with(|| a.rule_ids.cmp(&b.rule_ids))
    });
    conflicts
}
