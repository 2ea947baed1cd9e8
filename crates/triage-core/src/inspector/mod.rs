//! Read-only diagnostics over a rule set: conflicts, dangerous rules, dead
//! rules and per-message explanations.
//!
//! Message-store failures never surface as errors here. A failed draw is
//! logged and the findings that depended on it are left out.

mod conflicts;
mod danger;
mod explain;
mod inactive;
mod sample;
pub mod types;

use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use crate::rules::{AssigneeRule, LabelRule};
use crate::store::{MessageStore, SampleFilter};

pub use conflicts::{assignee_conflicts, find_conflicts, label_conflicts, shared_condition};
pub use types::{
    AssigneeRuleTrace, ConflictType, DangerReason, DangerReport, DangerousRule, ExplainedOutcome,
    InactiveRule, InactivityReport, InspectorConfig, LabelRuleTrace, MessageExplanation,
    RuleConflict, RuleHealthReport, RuleType, SampleCoverage,
};

use sample::{SampleDraw, Samples};

#[derive(Clone)]
pub struct RuleInspector {
    store: Arc<dyn MessageStore>,
    config: InspectorConfig,
}

impl RuleInspector {
    pub fn new(store: Arc<dyn MessageStore>, config: InspectorConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &InspectorConfig {
        &self.config
    }

    /// Pairwise conflicts among enabled rules. Needs no message data.
    pub fn inspect_conflicts(
        &self,
        label_rules: &[LabelRule],
        assignee_rules: &[AssigneeRule],
    ) -> Vec<RuleConflict> {
        let conflicts = find_conflicts(label_rules, assignee_rules);
        debug!(conflicts = conflicts.len(), "inspected conflicts");
        conflicts
    }

    #[instrument(skip_all, fields(label_rules = label_rules.len(), assignee_rules = assignee_rules.len()))]
    pub async fn inspect_dangerous_rules(
        &self,
        label_rules: &[LabelRule],
        assignee_rules: &[AssigneeRule],
    ) -> DangerReport {
        let samples = self.draw_samples().await;
        DangerReport {
            dangerous_rules: danger::dangerous_rules(
                label_rules,
                assignee_rules,
                &samples,
                self.config.too_many_matches_threshold,
            ),
            coverage: coverage(&samples),
        }
    }

    #[instrument(skip_all, fields(label_rules = label_rules.len(), assignee_rules = assignee_rules.len()))]
    pub async fn inspect_inactive_rules(
        &self,
        label_rules: &[LabelRule],
        assignee_rules: &[AssigneeRule],
    ) -> InactivityReport {
        let samples = self.draw_samples().await;
        InactivityReport {
            inactive_rules: inactive::inactive_rules(label_rules, assignee_rules, &samples),
            coverage: coverage(&samples),
        }
    }

    /// Full decision trail for one message.
    ///
    /// Without `from_email` the sender is looked up in the message store; a
    /// failed or empty lookup yields an explanation with no sender.
    #[instrument(skip(self, from_email, label_rules, assignee_rules))]
    pub async fn explain_message(
        &self,
        message_id: &str,
        from_email: Option<&str>,
        label_rules: &[LabelRule],
        assignee_rules: &[AssigneeRule],
    ) -> MessageExplanation {
        let mut lookup_warning = None;
        let looked_up;
        let sender = match from_email {
            Some(email) => Some(email),
            None => {
                looked_up = match self.store.sender_email(message_id).await {
                    Ok(Some(email)) => Some(email),
                    Ok(None) => {
                        lookup_warning = Some(format!("message {message_id} has no known sender"));
                        None
                    }
                    Err(err) => {
                        warn!(error = %err, "sender lookup failed");
                        lookup_warning = Some(format!("sender lookup failed: {err}"));
                        None
                    }
                };
                looked_up.as_deref()
            }
        };

        let mut explanation = explain::explain(message_id, sender, label_rules, assignee_rules);
        explanation.warnings.extend(lookup_warning);
        explanation
    }

    /// Conflicts, danger and inactivity from a single pair of sample draws.
    #[instrument(skip_all, fields(label_rules = label_rules.len(), assignee_rules = assignee_rules.len()))]
    pub async fn inspect_rule_set(
        &self,
        label_rules: &[LabelRule],
        assignee_rules: &[AssigneeRule],
    ) -> RuleHealthReport {
        let samples = self.draw_samples().await;
        let report = RuleHealthReport {
            conflicts: self.inspect_conflicts(label_rules, assignee_rules),
            dangerous_rules: danger::dangerous_rules(
                label_rules,
                assignee_rules,
                &samples,
                self.config.too_many_matches_threshold,
            ),
            inactive_rules: inactive::inactive_rules(label_rules, assignee_rules, &samples),
            coverage: coverage(&samples),
        };

        info!(
            conflicts = report.conflicts.len(),
            dangerous = report.dangerous_rules.len(),
            inactive = report.inactive_rules.len(),
            "rule set inspected"
        );
        report
    }

    async fn draw_samples(&self) -> Samples {
        let (label, assignee) = tokio::join!(
            self.draw(SampleFilter::all()),
            self.draw(SampleFilter::unassigned())
        );
        Samples { label, assignee }
    }

    async fn draw(&self, filter: SampleFilter) -> Option<SampleDraw> {
        match self
            .store
            .sample_messages(self.config.sample_size, filter)
            .await
        {
            Ok(messages) => {
                debug!(
                    unassigned_only = filter.unassigned_only,
                    sampled = messages.len(),
                    "drew message sample"
                );
                Some(SampleDraw::from_messages(&messages))
            }
            Err(err) => {
                warn!(
                    unassigned_only = filter.unassigned_only,
                    error = %err,
                    "message sample failed; omitting sample-derived findings"
                );
                None
            }
        }
    }
}

fn coverage(samples: &Samples) -> SampleCoverage {
    SampleCoverage {
        label_sample_size: samples.label.as_ref().map(|draw| draw.size),
        assignee_sample_size: samples.assignee.as_ref().map(|draw| draw.size),
    }
}
