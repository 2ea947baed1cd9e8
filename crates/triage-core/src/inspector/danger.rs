use tracing::debug;

use crate::rules::{AssigneeRule, LabelRule, is_broad_domain};

use super::sample::Samples;
use super::types::{DangerReason, DangerousRule, RuleType};

fn broad_domain_message(broad_domain: Option<&str>) -> String {
    match broad_domain {
        Some(domain) => {
            format!("fromDomain {domain} is broad and may match mail from unrelated senders")
        }
        None => "rule was saved with a dangerous domain confirmation".to_string(),
    }
}

fn too_many_message(hits: usize, sample: usize, threshold: usize) -> String {
    format!("matched {hits} of {sample} sampled messages, above the limit of {threshold}")
}

/// Broad-domain and too-many-matches findings for enabled rules.
///
/// Sample-derived findings are only produced for audiences whose draw
/// succeeded; broad-domain findings never depend on a draw.
pub(crate) fn dangerous_rules(
    label_rules: &[LabelRule],
    assignee_rules: &[AssigneeRule],
    samples: &Samples,
    threshold: usize,
) -> Vec<DangerousRule> {
    let mut findings = Vec::new();

    for rule in label_rules.iter().filter(|rule| rule.enabled) {
        let condition = rule.matcher.to_string();
        let hits = samples.label.as_ref().map(|draw| draw.hits(&rule.matcher));
        let broad_domain = rule
            .matcher
            .from_domain
            .as_deref()
            .filter(|domain| is_broad_domain(domain));

        if broad_domain.is_some() {
            findings.push(DangerousRule {
                rule_id: rule.id.clone(),
                rule_type: RuleType::Label,
                reason: DangerReason::BroadDomain,
                match_condition: condition.clone(),
                message: broad_domain_message(broad_domain),
                preview_count: hits,
            });
        }

        if let (Some(hits), Some(draw)) = (hits, samples.label.as_ref()) {
            if hits > threshold {
                findings.push(DangerousRule {
                    rule_id: rule.id.clone(),
                    rule_type: RuleType::Label,
                    reason: DangerReason::TooManyMatches,
                    match_condition: condition,
                    message: too_many_message(hits, draw.size, threshold),
                    preview_count: Some(hits),
                });
            }
        }
    }

    for rule in assignee_rules.iter().filter(|rule| rule.enabled) {
        let condition = rule.matcher.to_string();
        let hits = samples.assignee.as_ref().map(|draw| draw.hits(&rule.matcher));
        let broad_domain = rule
            .matcher
            .from_domain
            .as_deref()
            .filter(|domain| is_broad_domain(domain));

        if broad_domain.is_some() || rule.dangerous_domain_confirm {
            findings.push(DangerousRule {
                rule_id: rule.id.clone(),
                rule_type: RuleType::Assignee,
                reason: DangerReason::BroadDomain,
                match_condition: condition.clone(),
                message: broad_domain_message(broad_domain),
                preview_count: hits,
            });
        }

        if let (Some(hits), Some(draw)) = (hits, samples.assignee.as_ref()) {
            if hits > threshold {
                findings.push(DangerousRule {
                    rule_id: rule.id.clone(),
                    rule_type: RuleType::Assignee,
                    reason: DangerReason::TooManyMatches,
                    match_condition: condition,
                    message: too_many_message(hits, draw.size, threshold),
                    preview_count: Some(hits),
                });
            }
        }
    }

    debug!(findings = findings.len(), threshold, "evaluated dangerous rules");
    findings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inspector::sample::SampleDraw;
    use crate::rules::SenderMatch;
    use crate::store::SampledMessage;
    use chrono::Utc;

    fn label_rule(id: &str, matcher: SenderMatch) -> LabelRule {
        LabelRule {
            id: id.into(),
            matcher,
            label_names: ["VIP".to_string()].into(),
            assign_to: None,
            enabled: true,
            created_at: Utc::now(),
        }
    }

    fn assignee_rule(id: &str, matcher: SenderMatch, confirm: bool) -> AssigneeRule {
        AssigneeRule {
            id: id.into(),
            enabled: true,
            priority: 0,
            matcher,
            assignee_email: "agent@support.io".into(),
            unassigned_only: true,
            dangerous_domain_confirm: confirm,
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    fn draw(senders: &[&str]) -> SampleDraw {
        let messages: Vec<SampledMessage> = senders
            .iter()
            .enumerate()
            .map(|(index, sender)| SampledMessage {
                id: format!("m{index}"),
                sender_email: Some(sender.to_string()),
                labels: vec![],
                assignee_email: None,
            })
            .collect();
        SampleDraw::from_messages(&messages)
    }

    #[test]
    fn broad_domains_and_confirmed_rules_are_flagged() {
        let labels = [
            label_rule("broad", SenderMatch::domain("gmail.com")),
            label_rule("narrow", SenderMatch::domain("store-a.example.com")),
        ];
        let assignees = [
            assignee_rule("confirmed", SenderMatch::email("x@partner.io"), true),
            assignee_rule("apex", SenderMatch::domain("example.com"), false),
            assignee_rule("fine", SenderMatch::domain("support.vendor.io"), false),
        ];

        let findings = dangerous_rules(&labels, &assignees, &Samples::default(), 100);
        let flagged: Vec<_> = findings.iter().map(|f| f.rule_id.as_str()).collect();
        assert_eq!(flagged, vec!["broad", "confirmed", "apex"]);
        assert!(findings.iter().all(|f| f.reason == DangerReason::BroadDomain));
        assert!(findings.iter().all(|f| f.preview_count.is_none()));
    }

    #[test]
    fn too_many_matches_uses_a_strict_threshold_per_audience() {
        let labels = [label_rule("vendor", SenderMatch::domain("vendor.io"))];
        let assignees = [assignee_rule("vendor-owner", SenderMatch::domain("vendor.io"), false)];
        let samples = Samples {
            label: Some(draw(&["a@vendor.io", "b@vendor.io", "c@vendor.io"])),
            assignee: Some(draw(&["a@vendor.io", "b@vendor.io"])),
        };

        let findings = dangerous_rules(&labels, &assignees, &samples, 2);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].rule_id, "vendor");
        assert_eq!(findings[0].reason, DangerReason::TooManyMatches);
        assert_eq!(findings[0].preview_count, Some(3));
    }

    #[test]
    fn disabled_rules_are_ignored() {
        let mut rule = label_rule("broad", SenderMatch::domain("gmail.com"));
        rule.enabled = false;
        assert!(dangerous_rules(&[rule], &[], &Samples::default(), 100).is_empty());
    }
}
