//! Sender matching for label rules and assignee rules.
//!
//! Every function here is pure: same sender and same rules give the same
//! answer. Invalid senders never produce an error, they simply match nothing.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::types::{AssignTo, AssigneeRule, LabelRule, MatchReason, SenderMatch};

/// Labels and assignment decided for one sender.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelMatchResult {
    pub labels: BTreeSet<String>,
    pub assign_to: Option<AssignTo>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssigneeMatchOutcome {
    pub ok: bool,
    pub reason: Option<MatchReason>,
}

impl AssigneeMatchOutcome {
    pub fn matched(reason: MatchReason) -> Self {
        Self {
            ok: true,
            reason: Some(reason),
        }
    }

    pub fn no_match() -> Self {
        Self {
            ok: false,
            reason: None,
        }
    }
}

/// Winning assignee rule for a sender.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedAssignee {
    pub rule_id: String,
    pub assignee_email: String,
    pub priority: i64,
    pub reason: MatchReason,
}

/// Normalized sender address with its domain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sender {
    pub email: String,
    pub domain: String,
}

impl Sender {
    pub fn parse(input: &str) -> Option<Self> {
        let email = normalize_email(input)?;
        let domain = extract_domain(&email)?.to_string();
        Some(Self { email, domain })
    }
}

/// Lower-case and trim an address, unwrapping `Name <addr>` forms.
///
/// Returns `None` when the result has no `@` or nothing after it.
pub fn normalize_email(input: &str) -> Option<String> {
    let trimmed = input.trim();
    let address = match (trimmed.rfind('<'), trimmed.rfind('>')) {
        (Some(start), Some(end)) if start < end => &trimmed[start + 1..end],
        _ => trimmed,
    };
    let email = address.trim().to_lowercase();
    extract_domain(&email)?;
    Some(email)
}

pub fn extract_domain(email: &str) -> Option<&str> {
    let at_index = email.rfind('@')?;
    let domain = &email[at_index + 1..];
    if domain.is_empty() { None } else { Some(domain) }
}

/// Does a sender condition cover this sender, and through which field.
///
/// An exact address match takes precedence over a domain match. The
/// condition is normalized first, so `@Vendor.io` behaves like `vendor.io`.
pub fn sender_match_reason(matcher: &SenderMatch, sender: &Sender) -> Option<MatchReason> {
    let matcher = matcher.normalized();
    if matcher.from_email.as_deref() == Some(sender.email.as_str()) {
        return Some(MatchReason::FromEmail);
    }
    if matcher.from_domain.as_deref() == Some(sender.domain.as_str()) {
        return Some(MatchReason::FromDomain);
    }
    None
}

pub fn label_rule_match_reason(rule: &LabelRule, sender: &Sender) -> Option<MatchReason> {
    sender_match_reason(&rule.matcher, sender)
}

/// Evaluate label rules in the order supplied.
///
/// Labels from every enabled matching rule are unioned. Only the first
/// matching rule that declares an assignment contributes one.
pub fn match_label_rules(from_email: &str, rules: &[LabelRule]) -> LabelMatchResult {
    let mut result = LabelMatchResult::default();
    let Some(sender) = Sender::parse(from_email) else {
        return result;
    };

    for rule in rules.iter().filter(|rule| rule.enabled) {
        if label_rule_match_reason(rule, &sender).is_none() {
            continue;
        }
        result.labels.extend(rule.label_names.iter().cloned());
        if result.assign_to.is_none() {
            result.assign_to = rule.assign_to.clone();
        }
    }

    result
}

/// Single-rule predicate. Ignores `enabled` and `priority`; resolution across
/// rules is [`resolve_assignee`]'s job.
pub fn match_assignee_rule(from_email: &str, rule: &AssigneeRule) -> AssigneeMatchOutcome {
    Sender::parse(from_email)
        .and_then(|sender| sender_match_reason(&rule.matcher, &sender))
        .map(AssigneeMatchOutcome::matched)
        .unwrap_or_else(AssigneeMatchOutcome::no_match)
}

/// Assignee rules in evaluation order: ascending priority, ties keep input order.
pub fn sort_assignee_rules(rules: &[AssigneeRule]) -> Vec<&AssigneeRule> {
    let mut sorted: Vec<&AssigneeRule> = rules.iter().collect();
    sorted.sort_by_key(|rule| rule.priority);
    sorted
}

/// Pick the assignee for a sender from enabled rules, lowest priority first.
///
/// Whether the message is currently unassigned is for the caller to check.
pub fn resolve_assignee(from_email: &str, rules: &[AssigneeRule]) -> Option<ResolvedAssignee> {
    let sender = Sender::parse(from_email)?;
    sort_assignee_rules(rules)
        .into_iter()
        .filter(|rule| rule.enabled)
        .find_map(|rule| {
            sender_match_reason(&rule.matcher, &sender).map(|reason| ResolvedAssignee {
                rule_id: rule.id.clone(),
                assignee_email: rule.assignee_email.clone(),
                priority: rule.priority,
                reason,
            })
        })
}
