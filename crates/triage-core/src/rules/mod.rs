pub mod matcher;
pub mod repositories;
pub mod safety;
pub mod types;
pub mod validation;

pub use matcher::{
    AssigneeMatchOutcome, LabelMatchResult, ResolvedAssignee, Sender, extract_domain,
    label_rule_match_reason, match_assignee_rule, match_label_rules, normalize_email,
    resolve_assignee, sender_match_reason, sort_assignee_rules,
};
pub use repositories::{RuleRepository, RuleRepositoryError};
pub use safety::{is_broad_domain, normalize_domain};
pub use types::{
    AssignTo, AssigneeRule, LabelRule, MatchReason, NewAssigneeRule, NewLabelRule, RuleSet,
    RuleShapeError, SenderMatch, StoredAssignTo, StoredAssigneeRule, StoredLabelRule,
    StoredSenderMatch,
};
pub use validation::{
    RuleValidationError, validate_assignee_email, validate_new_assignee_rule,
    validate_new_label_rule, validate_sender_match,
};
