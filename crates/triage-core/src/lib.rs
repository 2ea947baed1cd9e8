pub mod config;
pub mod db;
pub mod inspector;
pub mod migrations;
pub mod rules;
pub mod store;
pub mod suggestions;
pub mod telemetry;

pub use config::Config;
pub use db::Database;
pub use inspector::{
    DangerReport, InactivityReport, InspectorConfig, MessageExplanation, RuleConflict,
    RuleHealthReport, RuleInspector,
};
pub use rules::{
    AssigneeRule, LabelRule, RuleRepository, RuleSet, is_broad_domain, match_assignee_rule,
    match_label_rules, resolve_assignee,
};
pub use store::{AuditLog, AuditLogRepository, MessageRepository, MessageStore, StoreError};
pub use suggestions::{
    MinerConfig, RuleSuggestion, SuggestionMiner, SuggestionParams, SuggestionReport,
};
pub use telemetry::{TelemetryError, TelemetryGuard, init_logging, init_telemetry};
