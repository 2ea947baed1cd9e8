use thiserror::Error;

use super::matcher::{extract_domain, normalize_email};
use super::safety::{is_broad_domain, normalize_domain};
use super::types::{NewAssigneeRule, NewLabelRule, SenderMatch};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RuleValidationError {
    #[error("rule needs a fromEmail or fromDomain condition")]
    MissingMatchCondition,
    #[error("fromEmail {0} is not a valid address")]
    InvalidSenderEmail(String),
    #[error("label rule needs at least one label name")]
    MissingLabels,
    #[error("assignee email {0} is not a valid address")]
    InvalidAssigneeEmail(String),
    #[error("assignee domain {domain} is not in the allowed list")]
    AssigneeDomainNotAllowed { domain: String },
    #[error("fromDomain {0} is broad; confirm the dangerous domain to save this rule")]
    BroadDomainNotConfirmed(String),
}

/// Normalize a sender condition, rejecting empty ones.
pub fn validate_sender_match(matcher: &SenderMatch) -> Result<SenderMatch, RuleValidationError> {
    let normalized = matcher.normalized();
    if normalized.is_empty() {
        return Err(RuleValidationError::MissingMatchCondition);
    }
    if let Some(email) = normalized.from_email.as_deref() {
        if normalize_email(email).is_none() {
            return Err(RuleValidationError::InvalidSenderEmail(email.to_string()));
        }
    }
    Ok(normalized)
}

/// Lower-case an assignee address and check its domain against the allow-list.
///
/// An empty allow-list accepts any well-formed address.
pub fn validate_assignee_email(
    email: &str,
    allowed_domains: &[String],
) -> Result<String, RuleValidationError> {
    let normalized = normalize_email(email)
        .ok_or_else(|| RuleValidationError::InvalidAssigneeEmail(email.to_string()))?;
    let domain = extract_domain(&normalized)
        .ok_or_else(|| RuleValidationError::InvalidAssigneeEmail(email.to_string()))?;

    if !allowed_domains.is_empty()
        && !allowed_domains
            .iter()
            .any(|allowed| normalize_domain(allowed) == domain)
    {
        return Err(RuleValidationError::AssigneeDomainNotAllowed {
            domain: domain.to_string(),
        });
    }

    Ok(normalized)
}

pub fn validate_new_label_rule(rule: NewLabelRule) -> Result<NewLabelRule, RuleValidationError> {
    let matcher = validate_sender_match(&rule.matcher)?;
    let label_names = rule
        .label_names
        .into_iter()
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .collect::<std::collections::BTreeSet<_>>();
    if label_names.is_empty() {
        return Err(RuleValidationError::MissingLabels);
    }
    Ok(NewLabelRule {
        matcher,
        label_names,
        ..rule
    })
}

/// Validate an assignee rule before it is written.
///
/// A broad `fromDomain` is only accepted with `dangerous_domain_confirm` set.
pub fn validate_new_assignee_rule(
    rule: NewAssigneeRule,
    allowed_domains: &[String],
) -> Result<NewAssigneeRule, RuleValidationError> {
    let matcher = validate_sender_match(&rule.matcher)?;
    let assignee_email = validate_assignee_email(&rule.assignee_email, allowed_domains)?;

    if let Some(domain) = matcher.from_domain.as_deref() {
        if is_broad_domain(domain) && !rule.dangerous_domain_confirm {
            return Err(RuleValidationError::BroadDomainNotConfirmed(
                domain.to_string(),
            ));
        }
    }

    Ok(NewAssigneeRule {
        matcher,
        assignee_email,
        ..rule
    })
}
