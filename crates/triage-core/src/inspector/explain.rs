use crate::rules::{
    AssigneeRule, LabelRule, Sender, label_rule_match_reason, match_label_rules,
    resolve_assignee, sender_match_reason, sort_assignee_rules,
};

use super::types::{AssigneeRuleTrace, ExplainedOutcome, LabelRuleTrace, MessageExplanation};

/// Trace every rule against one sender, including rules that did not match
/// or are disabled.
pub(crate) fn explain(
    message_id: &str,
    from_email: Option<&str>,
    label_rules: &[LabelRule],
    assignee_rules: &[AssigneeRule],
) -> MessageExplanation {
    let mut warnings = Vec::new();
    let sender = from_email.and_then(Sender::parse);
    if let (Some(raw), None) = (from_email, &sender) {
        warnings.push(format!("sender {raw} is not a valid address; no rule can match"));
    }

    let mut assignment_taken = false;
    let label_traces = label_rules
        .iter()
        .map(|rule| {
            let reason = sender
                .as_ref()
                .and_then(|sender| label_rule_match_reason(rule, sender));
            let applied = rule.enabled && reason.is_some();
            let assign_to_applied = applied && !assignment_taken && rule.assign_to.is_some();
            assignment_taken |= assign_to_applied;
            LabelRuleTrace {
                rule_id: rule.id.clone(),
                enabled: rule.enabled,
                match_condition: rule.matcher.to_string(),
                reason,
                label_names: rule.label_names.clone(),
                applied,
                assign_to_applied,
            }
        })
        .collect();

    let mut selected_taken = false;
    let assignee_traces = sort_assignee_rules(assignee_rules)
        .into_iter()
        .map(|rule| {
            let reason = sender
                .as_ref()
                .and_then(|sender| sender_match_reason(&rule.matcher, sender));
            let selected = rule.enabled && reason.is_some() && !selected_taken;
            selected_taken |= selected;
            AssigneeRuleTrace {
                rule_id: rule.id.clone(),
                enabled: rule.enabled,
                priority: rule.priority,
                match_condition: rule.matcher.to_string(),
                reason,
                assignee_email: rule.assignee_email.clone(),
                selected,
            }
        })
        .collect();

    let outcome = match &sender {
        Some(sender) => {
            let matched = match_label_rules(&sender.email, label_rules);
            ExplainedOutcome {
                labels: matched.labels,
                assign_to: matched.assign_to,
                assignee: resolve_assignee(&sender.email, assignee_rules),
            }
        }
        None => ExplainedOutcome::default(),
    };

    MessageExplanation {
        message_id: message_id.to_string(),
        from_email: sender.map(|sender| sender.email),
        label_rules: label_traces,
        assignee_rules: assignee_traces,
        outcome,
        warnings,
    }
}
