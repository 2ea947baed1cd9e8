use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use futures::stream::{self, StreamExt};
use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument, warn};

use crate::rules::{
    NewAssigneeRule, NewLabelRule, RuleSet, Sender, SenderMatch, is_broad_domain,
    label_rule_match_reason, normalize_email, sender_match_reason,
};
use crate::store::{
    ACTION_ASSIGN, ACTION_LABEL_APPLY, ACTION_MUTE, ACTION_TAKEOVER, AuditLog, AuditLogEntry,
    MessageStore,
};

use super::types::{
    MinerConfig, ProposedRule, RuleSuggestion, SuggestedSender, SuggestionParams,
    SuggestionReport, SuggestionType, SuggestionWarning,
};

/// Only mined when `MinerConfig::mine_label_applications` is set.
const LABEL_APPLY_ACTIONS: &[&str] = &[ACTION_LABEL_APPLY];
const MUTE_ACTIONS: &[&str] = &[ACTION_MUTE];
const ASSIGN_ACTIONS: &[&str] = &[ACTION_ASSIGN, ACTION_TAKEOVER];

const MAX_LISTED_ACTORS: usize = 5;

fn actions_for(kind: SuggestionType, config: &MinerConfig) -> &'static [&'static str] {
    match kind {
        SuggestionType::AutoLabel if config.mine_label_applications => LABEL_APPLY_ACTIONS,
        SuggestionType::AutoLabel => &[],
        SuggestionType::AutoMute => MUTE_ACTIONS,
        SuggestionType::AutoAssign => ASSIGN_ACTIONS,
    }
}

/// Start of the mining window. Windows reaching past the earliest
/// representable instant cover the whole log.
fn window_start(now: DateTime<Utc>, days: u32) -> DateTime<Utc> {
    Duration::try_days(i64::from(days))
        .and_then(|window| now.checked_sub_signed(window))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// `sug_` plus the first 16 hex chars of SHA-256 over `type:email:domain`.
pub fn suggestion_id(kind: SuggestionType, from_email: &str, from_domain: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("{}:{from_email}:{from_domain}", kind.as_str()).as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    format!("sug_{}", &digest[..16])
}

#[derive(Debug)]
struct SenderEvidence {
    sender: Sender,
    evidence_count: usize,
    actors: BTreeSet<String>,
    /// Label or assignee each action pointed at.
    targets: BTreeMap<String, usize>,
}

impl SenderEvidence {
    fn new(sender: Sender) -> Self {
        Self {
            sender,
            evidence_count: 0,
            actors: BTreeSet::new(),
            targets: BTreeMap::new(),
        }
    }

    /// Most frequent target; ties go to the smallest value.
    fn top_target(&self) -> Option<(&str, usize)> {
        self.targets
            .iter()
            .fold(None, |best: Option<(&str, usize)>, (target, count)| match best {
                Some((_, best_count)) if best_count >= *count => best,
                _ => Some((target.as_str(), *count)),
            })
    }
}

#[derive(Debug, Default)]
struct CategoryOutcome {
    suggestions: Vec<RuleSuggestion>,
    failed_lookups: usize,
}

/// Mines the audit log for senders the team keeps handling by hand.
#[derive(Clone)]
pub struct SuggestionMiner {
    audit_log: Arc<dyn AuditLog>,
    store: Arc<dyn MessageStore>,
    config: MinerConfig,
}

impl SuggestionMiner {
    pub fn new(
        audit_log: Arc<dyn AuditLog>,
        store: Arc<dyn MessageStore>,
        config: MinerConfig,
    ) -> Self {
        Self {
            audit_log,
            store,
            config,
        }
    }

    pub async fn generate_suggestions(
        &self,
        params: SuggestionParams,
        rules: &RuleSet,
    ) -> SuggestionReport {
        self.generate_suggestions_at(Utc::now(), params, rules)
            .await
    }

    #[instrument(skip(self, rules), fields(days = params.days))]
    pub async fn generate_suggestions_at(
        &self,
        now: DateTime<Utc>,
        params: SuggestionParams,
        rules: &RuleSet,
    ) -> SuggestionReport {
        let since = window_start(now, params.days);
        let entries = match self.audit_log.list_entries(since).await {
            Ok(entries) => entries,
            Err(err) => {
                warn!(error = %err, "audit log listing failed");
                return SuggestionReport {
                    suggestions: Vec::new(),
                    warnings: vec![format!("audit log unavailable: {err}")],
                };
            }
        };
        let entries: Vec<AuditLogEntry> = entries
            .into_iter()
            .filter(|entry| entry.timestamp >= since)
            .collect();
        debug!(entries = entries.len(), %since, "loaded audit window");

        let (labels, mutes, assigns) = tokio::join!(
            self.mine(SuggestionType::AutoLabel, &entries, params, rules),
            self.mine(SuggestionType::AutoMute, &entries, params, rules),
            self.mine(SuggestionType::AutoAssign, &entries, params, rules),
        );

        let mut report = SuggestionReport::default();
        let mut failed_lookups = 0;
        for outcome in [labels, mutes, assigns] {
            failed_lookups += outcome.failed_lookups;
            report.suggestions.extend(outcome.suggestions);
        }

        if failed_lookups > 0 {
            report.warnings.push(format!(
                "{failed_lookups} sender lookups failed; their audit entries were skipped"
            ));
        }
        if report
            .suggestions
            .iter()
            .any(|suggestion| suggestion.warnings.contains(&SuggestionWarning::BroadDomain))
        {
            report
                .warnings
                .push("some suggestions target broad sender domains; review before accepting".into());
        }

        info!(
            suggestions = report.suggestions.len(),
            failed_lookups, "generated rule suggestions"
        );
        report
    }

    async fn mine(
        &self,
        kind: SuggestionType,
        entries: &[AuditLogEntry],
        params: SuggestionParams,
        rules: &RuleSet,
    ) -> CategoryOutcome {
        let actions = actions_for(kind, &self.config);
        let relevant: Vec<&AuditLogEntry> = entries
            .iter()
            .filter(|entry| actions.contains(&entry.action.as_str()))
            .collect();
        if relevant.is_empty() {
            return CategoryOutcome::default();
        }

        let (senders, failed_lookups) = self.resolve_senders(&relevant).await;

        let mut grouped: BTreeMap<String, SenderEvidence> = BTreeMap::new();
        for entry in relevant {
            let Some(sender) = senders.get(&entry.message_id) else {
                continue;
            };
            let evidence = grouped
                .entry(sender.email.clone())
                .or_insert_with(|| SenderEvidence::new(sender.clone()));
            evidence.evidence_count += 1;
            evidence.actors.insert(normalize_actor(&entry.actor_email));
            if let Some(target) = action_target(kind, entry) {
                *evidence.targets.entry(target).or_default() += 1;
            }
        }

        let mut suggestions: Vec<RuleSuggestion> = grouped
            .into_values()
            .filter(|evidence| !is_covered(kind, &evidence.sender, rules))
            .filter(|evidence| {
                evidence.evidence_count >= params.min_actions
                    && evidence.actors.len() >= params.min_actors
            })
            .filter_map(|evidence| self.build_suggestion(kind, &evidence, params))
            .collect();

        suggestions.sort_by(|a, b| {
            b.evidence_count
                .cmp(&a.evidence_count)
                .then_with(|| a.sender.from_email.cmp(&b.sender.from_email))
        });

        debug!(
            kind = kind.as_str(),
            suggestions = suggestions.len(),
            failed_lookups,
            "mined category"
        );
        CategoryOutcome {
            suggestions,
            failed_lookups,
        }
    }

    /// Look up each distinct message once, a bounded number at a time.
    async fn resolve_senders(&self, entries: &[&AuditLogEntry]) -> (HashMap<String, Sender>, usize) {
        let message_ids: BTreeSet<&str> = entries
            .iter()
            .map(|entry| entry.message_id.as_str())
            .collect();
        let store = &self.store;

        let results: Vec<_> = stream::iter(message_ids)
            .map(|message_id| async move { (message_id, store.sender_email(message_id).await) })
            .buffer_unordered(self.config.lookup_concurrency.max(1))
            .collect()
            .await;

        let mut senders = HashMap::new();
        let mut failed = 0;
        for (message_id, result) in results {
            match result {
                Ok(Some(email)) => match Sender::parse(&email) {
                    Some(sender) => {
                        senders.insert(message_id.to_string(), sender);
                    }
                    None => debug!(message_id, "sender is not a valid address"),
                },
                Ok(None) => debug!(message_id, "message has no known sender"),
                Err(err) => {
                    warn!(message_id, error = %err, "sender lookup failed");
                    failed += 1;
                }
            }
        }
        (senders, failed)
    }

    fn build_suggestion(
        &self,
        kind: SuggestionType,
        evidence: &SenderEvidence,
        params: SuggestionParams,
    ) -> Option<RuleSuggestion> {
        let sender = &evidence.sender;
        let matcher = SenderMatch::email(sender.email.clone());
        let evidence_count = evidence.evidence_count;
        let actor_count = evidence.actors.len();

        let (reason, proposed_rule) = match kind {
            SuggestionType::AutoLabel => {
                let (label, _) = evidence.top_target()?;
                (
                    format!(
                        "label {label} applied {evidence_count} times by {actor_count} people in the last {} days",
                        params.days
                    ),
                    ProposedRule::Label(NewLabelRule {
                        matcher,
                        label_names: BTreeSet::from([label.to_string()]),
                        assign_to: None,
                        enabled: true,
                    }),
                )
            }
            SuggestionType::AutoMute => (
                format!(
                    "muted {evidence_count} times by {actor_count} people in the last {} days",
                    params.days
                ),
                ProposedRule::Label(NewLabelRule {
                    matcher,
                    label_names: BTreeSet::from([self.config.mute_label.clone()]),
                    assign_to: None,
                    enabled: true,
                }),
            ),
            SuggestionType::AutoAssign => {
                let Some((assignee, handled)) = evidence.top_target() else {
                    debug!(sender = %sender.email, "assignment evidence names no assignee");
                    return None;
                };
                (
                    format!(
                        "assigned {evidence_count} times by {actor_count} people in the last {} days; {assignee} took {handled} of them",
                        params.days
                    ),
                    ProposedRule::Assignee(NewAssigneeRule {
                        enabled: true,
                        priority: 0,
                        matcher,
                        assignee_email: assignee.to_string(),
                        dangerous_domain_confirm: false,
                    }),
                )
            }
        };

        let warnings = if is_broad_domain(&sender.domain) {
            vec![SuggestionWarning::BroadDomain]
        } else {
            Vec::new()
        };

        Some(RuleSuggestion {
            suggestion_id: suggestion_id(kind, &sender.email, &sender.domain),
            suggestion_type: kind,
            sender: SuggestedSender {
                from_email: sender.email.clone(),
                from_domain: sender.domain.clone(),
            },
            reason,
            evidence_count,
            actor_count,
            actors: evidence
                .actors
                .iter()
                .take(MAX_LISTED_ACTORS)
                .cloned()
                .collect(),
            proposed_rule,
            warnings,
        })
    }
}

fn normalize_actor(actor: &str) -> String {
    normalize_email(actor).unwrap_or_else(|| actor.trim().to_lowercase())
}

/// What an action pointed at: the applied label, or the new assignee.
fn action_target(kind: SuggestionType, entry: &AuditLogEntry) -> Option<String> {
    match kind {
        SuggestionType::AutoLabel => entry.label.clone(),
        SuggestionType::AutoMute => None,
        SuggestionType::AutoAssign => entry
            .metadata_str(&["assigneeEmail", "assignee_email"])
            .and_then(normalize_email)
            .or_else(|| {
                (entry.action == ACTION_TAKEOVER)
                    .then(|| normalize_email(&entry.actor_email))
                    .flatten()
            }),
    }
}

/// Covered by an enabled rule of the kind the suggestion would create.
fn is_covered(kind: SuggestionType, sender: &Sender, rules: &RuleSet) -> bool {
    match kind {
        SuggestionType::AutoLabel | SuggestionType::AutoMute => rules
            .label_rules
            .iter()
            .any(|rule| rule.enabled && label_rule_match_reason(rule, sender).is_some()),
        SuggestionType::AutoAssign => rules
            .assignee_rules
            .iter()
            .any(|rule| rule.enabled && sender_match_reason(&rule.matcher, sender).is_some()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::{AssigneeRule, LabelRule};
    use crate::store::{
        ACTION_LABEL_APPLY, InMemoryAuditLog, InMemoryMessageStore, SampledMessage,
    };
    use chrono::TimeZone;
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
    }

    fn message(id: &str, sender: &str) -> SampledMessage {
        SampledMessage {
            id: id.into(),
            sender_email: Some(sender.into()),
            labels: vec![],
            assignee_email: None,
        }
    }

    fn entry(actor: &str, action: &str, message_id: &str, days_ago: i64) -> AuditLogEntry {
        AuditLogEntry {
            timestamp: now() - Duration::days(days_ago),
            actor_email: actor.into(),
            action: action.into(),
            message_id: message_id.into(),
            label: None,
            metadata: None,
        }
    }

    fn assign_entry(actor: &str, message_id: &str, assignee: &str) -> AuditLogEntry {
        AuditLogEntry {
            metadata: Some(json!({ "assigneeEmail": assignee })),
            ..entry(actor, ACTION_ASSIGN, message_id, 1)
        }
    }

    fn label_rule(matcher: SenderMatch, enabled: bool) -> LabelRule {
        LabelRule {
            id: "existing".into(),
            matcher,
            label_names: BTreeSet::from(["Muted".to_string()]),
            assign_to: None,
            enabled,
            created_at: now(),
        }
    }

    fn assignee_rule(matcher: SenderMatch) -> AssigneeRule {
        AssigneeRule {
            id: "existing".into(),
            enabled: true,
            priority: 0,
            matcher,
            assignee_email: "owner@support.io".into(),
            unassigned_only: true,
            dangerous_domain_confirm: false,
            created_at: now(),
            updated_at: None,
        }
    }

    /// Four mutes of spam@ads.com by three people, plus one stale mute.
    fn mute_fixture() -> (InMemoryAuditLog, InMemoryMessageStore) {
        let store = InMemoryMessageStore::with_messages([
            message("m1", "spam@ads.com"),
            message("m2", "Spam@Ads.com"),
            message("m3", "spam@ads.com"),
            message("m4", "spam@ads.com"),
            message("m5", "spam@ads.com"),
        ]);
        let log = InMemoryAuditLog::new();
        log.record(entry("alice@support.io", ACTION_MUTE, "m1", 1));
        log.record(entry("bob@support.io", ACTION_MUTE, "m2", 2));
        log.record(entry("carol@support.io", ACTION_MUTE, "m3", 3));
        log.record(entry("Alice@Support.io", ACTION_MUTE, "m4", 4));
        log.record(entry("dave@support.io", ACTION_MUTE, "m5", 30));
        (log, store)
    }

    fn miner(log: &InMemoryAuditLog, store: &InMemoryMessageStore) -> SuggestionMiner {
        SuggestionMiner::new(
            Arc::new(log.clone()),
            Arc::new(store.clone()),
            MinerConfig::default(),
        )
    }

    fn params(min_actions: usize, min_actors: usize) -> SuggestionParams {
        SuggestionParams {
            days: 14,
            min_actions,
            min_actors,
        }
    }

    #[test]
    fn suggestion_ids_are_stable_and_prefixed() {
        let id = suggestion_id(SuggestionType::AutoMute, "spam@ads.com", "ads.com");
        assert_eq!(id, suggestion_id(SuggestionType::AutoMute, "spam@ads.com", "ads.com"));
        assert_ne!(id, suggestion_id(SuggestionType::AutoLabel, "spam@ads.com", "ads.com"));
        assert!(id.starts_with("sug_"));
        assert_eq!(id.len(), 20);
        assert!(id[4..].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[tokio::test]
    async fn repeated_mutes_by_several_people_become_an_auto_mute_suggestion() {
        let (log, store) = mute_fixture();
        let report = miner(&log, &store)
            .generate_suggestions_at(now(), params(3, 2), &RuleSet::default())
            .await;

        assert_eq!(report.suggestions.len(), 1);
        let suggestion = &report.suggestions[0];
        assert_eq!(suggestion.suggestion_type, SuggestionType::AutoMute);
        assert_eq!(suggestion.sender.from_email, "spam@ads.com");
        assert_eq!(suggestion.sender.from_domain, "ads.com");
        assert_eq!(suggestion.evidence_count, 4);
        assert_eq!(suggestion.actor_count, 3);
        assert_eq!(
            suggestion.actors,
            vec!["alice@support.io", "bob@support.io", "carol@support.io"]
        );
        assert_eq!(suggestion.warnings, vec![SuggestionWarning::BroadDomain]);
        assert_eq!(report.warnings.len(), 1);
        match &suggestion.proposed_rule {
            ProposedRule::Label(rule) => {
                assert_eq!(rule.matcher, SenderMatch::email("spam@ads.com"));
                assert!(rule.label_names.contains("Muted"));
            }
            other => panic!("unexpected proposal: {other:?}"),
        }
    }

    #[tokio::test]
    async fn suggestion_ids_survive_independent_runs() {
        let (log, store) = mute_fixture();
        let miner = miner(&log, &store);
        let first = miner
            .generate_suggestions_at(now(), params(3, 2), &RuleSet::default())
            .await;
        let second = miner
            .generate_suggestions_at(now() + Duration::hours(1), params(3, 2), &RuleSet::default())
            .await;
        let ids = |report: &SuggestionReport| {
            report
                .suggestions
                .iter()
                .map(|s| s.suggestion_id.clone())
                .collect::<Vec<_>>()
        };
        assert_eq!(ids(&first), ids(&second));
        assert!(!ids(&first).is_empty());
    }

    #[tokio::test]
    async fn both_thresholds_must_hold() {
        let (log, store) = mute_fixture();
        let miner = miner(&log, &store);
        let too_few_actions = miner
            .generate_suggestions_at(now(), params(5, 1), &RuleSet::default())
            .await;
        assert!(too_few_actions.suggestions.is_empty());

        let too_few_actors = miner
            .generate_suggestions_at(now(), params(1, 4), &RuleSet::default())
            .await;
        assert!(too_few_actors.suggestions.is_empty());
    }

    #[tokio::test]
    async fn senders_covered_by_enabled_rules_are_not_suggested() {
        let (log, store) = mute_fixture();
        let miner = miner(&log, &store);

        for matcher in [SenderMatch::email("spam@ads.com"), SenderMatch::domain("ads.com")] {
            let rules = RuleSet {
                label_rules: vec![label_rule(matcher, true)],
                assignee_rules: vec![],
            };
            let report = miner.generate_suggestions_at(now(), params(3, 2), &rules).await;
            assert!(report.suggestions.is_empty());
        }

        let disabled = RuleSet {
            label_rules: vec![label_rule(SenderMatch::domain("ads.com"), false)],
            assignee_rules: vec![],
        };
        let report = miner.generate_suggestions_at(now(), params(3, 2), &disabled).await;
        assert_eq!(report.suggestions.len(), 1);

        let other_kind = RuleSet {
            label_rules: vec![],
            assignee_rules: vec![assignee_rule(SenderMatch::domain("ads.com"))],
        };
        let report = miner.generate_suggestions_at(now(), params(3, 2), &other_kind).await;
        assert_eq!(report.suggestions.len(), 1);
    }

    #[tokio::test]
    async fn auto_assign_proposes_the_busiest_assignee_on_combined_evidence() {
        let store = InMemoryMessageStore::with_messages([
            message("a1", "billing@vendor.io"),
            message("a2", "billing@vendor.io"),
            message("a3", "billing@vendor.io"),
            message("a4", "billing@vendor.io"),
        ]);
        let log = InMemoryAuditLog::new();
        log.record(assign_entry("lead@support.io", "a1", "zed@support.io"));
        log.record(assign_entry("lead@support.io", "a2", "amy@support.io"));
        log.record(entry("zed@support.io", ACTION_TAKEOVER, "a3", 1));
        log.record(assign_entry("ops@support.io", "a4", "Amy@Support.io"));

        let report = miner(&log, &store)
            .generate_suggestions_at(now(), params(4, 3), &RuleSet::default())
            .await;

        assert_eq!(report.suggestions.len(), 1);
        let suggestion = &report.suggestions[0];
        assert_eq!(suggestion.suggestion_type, SuggestionType::AutoAssign);
        assert_eq!(suggestion.evidence_count, 4);
        assert_eq!(suggestion.actor_count, 3);
        assert!(suggestion.warnings.is_empty());
        match &suggestion.proposed_rule {
            ProposedRule::Assignee(rule) => assert_eq!(rule.assignee_email, "amy@support.io"),
            other => panic!("unexpected proposal: {other:?}"),
        }
    }

    fn label_apply_fixture() -> (InMemoryAuditLog, InMemoryMessageStore) {
        let store = InMemoryMessageStore::with_messages([
            message("l1", "news@vendor.io"),
            message("l2", "news@vendor.io"),
        ]);
        let log = InMemoryAuditLog::new();
        for (actor, message_id, label) in [
            ("a@support.io", "l1", "Newsletter"),
            ("b@support.io", "l2", "Newsletter"),
            ("c@support.io", "l2", "Reading"),
        ] {
            log.record(AuditLogEntry {
                label: Some(label.into()),
                ..entry(actor, ACTION_LABEL_APPLY, message_id, 1)
            });
        }
        (log, store)
    }

    #[tokio::test]
    async fn label_apply_history_is_not_mined_by_default() {
        let (log, store) = label_apply_fixture();

        let report = miner(&log, &store)
            .generate_suggestions_at(now(), params(1, 1), &RuleSet::default())
            .await;
        assert!(report.suggestions.is_empty());
        assert_eq!(store.lookup_calls(), 0);
    }

    #[tokio::test]
    async fn enabled_label_mining_proposes_the_most_applied_label() {
        let (log, store) = label_apply_fixture();
        let miner = SuggestionMiner::new(
            Arc::new(log.clone()),
            Arc::new(store.clone()),
            MinerConfig {
                mine_label_applications: true,
                ..MinerConfig::default()
            },
        );

        let report = miner
            .generate_suggestions_at(now(), params(3, 3), &RuleSet::default())
            .await;

        assert_eq!(report.suggestions.len(), 1);
        let suggestion = &report.suggestions[0];
        assert_eq!(suggestion.suggestion_type, SuggestionType::AutoLabel);
        assert_eq!(suggestion.sender.from_email, "news@vendor.io");
        assert_eq!(suggestion.evidence_count, 3);
        assert_eq!(
            suggestion.suggestion_id,
            suggestion_id(SuggestionType::AutoLabel, "news@vendor.io", "vendor.io")
        );
        match &suggestion.proposed_rule {
            ProposedRule::Label(rule) => {
                assert_eq!(rule.label_names, BTreeSet::from(["Newsletter".to_string()]));
                assert_eq!(rule.matcher, SenderMatch::email("news@vendor.io"));
            }
            other => panic!("unexpected proposal: {other:?}"),
        }

        let covered = RuleSet {
            label_rules: vec![label_rule(SenderMatch::domain("vendor.io"), true)],
            assignee_rules: vec![],
        };
        let report = miner.generate_suggestions_at(now(), params(3, 3), &covered).await;
        assert!(report.suggestions.is_empty());
    }

    #[tokio::test]
    async fn oversized_window_reads_the_whole_log() {
        let (log, store) = mute_fixture();
        let report = miner(&log, &store)
            .generate_suggestions_at(
                now(),
                SuggestionParams {
                    days: u32::MAX,
                    min_actions: 1,
                    min_actors: 1,
                },
                &RuleSet::default(),
            )
            .await;

        assert_eq!(report.suggestions.len(), 1);
        assert_eq!(report.suggestions[0].evidence_count, 5);
        assert_eq!(window_start(now(), u32::MAX), DateTime::<Utc>::MIN_UTC);
        assert_eq!(window_start(now(), 1), now() - Duration::days(1));
    }

    #[tokio::test]
    async fn lookups_are_deduplicated_and_failures_become_warnings() {
        let (log, store) = mute_fixture();
        log.record(entry("erin@support.io", ACTION_MUTE, "m1", 1));
        log.record(entry("frank@support.io", ACTION_MUTE, "gone", 1));
        store.fail_lookup("gone");

        let report = miner(&log, &store)
            .generate_suggestions_at(now(), params(3, 2), &RuleSet::default())
            .await;

        assert_eq!(report.suggestions[0].evidence_count, 5);
        assert_eq!(store.lookup_calls(), 5);
        assert!(
            report
                .warnings
                .iter()
                .any(|warning| warning.contains("1 sender lookups failed"))
        );
        assert_eq!(store.sample_calls(), 0);
    }

    #[tokio::test]
    async fn audit_log_failure_yields_an_empty_report_with_a_warning() {
        let (log, store) = mute_fixture();
        log.fail_listing();
        let report = miner(&log, &store)
            .generate_suggestions_at(now(), params(3, 2), &RuleSet::default())
            .await;
        assert!(report.suggestions.is_empty());
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(log.list_calls(), 1);
    }
}
