use std::env;
use std::error::Error;
use std::sync::Arc;

use serde::Serialize;
use tracing::info;
use triage_core::{
    AuditLogRepository, Config, Database, MessageRepository, RuleHealthReport, RuleInspector,
    RuleRepository, SuggestionMiner, SuggestionReport, init_telemetry, migrations,
};

type AnyError = Box<dyn Error + Send + Sync>;

const USAGE: &str = "usage: triage-report [health | suggestions | explain <message-id> [sender]]";

#[derive(Serialize)]
struct FullReport {
    health: RuleHealthReport,
    suggestions: SuggestionReport,
}

#[tokio::main]
async fn main() -> Result<(), AnyError> {
    let args: Vec<String> = env::args().skip(1).collect();
    let config_path = env::var("CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string());
    let config = Config::load(&config_path)?;

    let _guard = init_telemetry(&config.app, &config.telemetry)?;

    let db = Database::new(&config.paths.database).await?;
    migrations::run_migrations(&db).await?;

    let rules = RuleRepository::new(db.clone()).load_rule_set().await?;
    let messages = Arc::new(MessageRepository::new(db.clone()));
    let inspector = RuleInspector::new(messages.clone(), config.inspector);
    let miner = SuggestionMiner::new(
        Arc::new(AuditLogRepository::new(db)),
        messages,
        config.suggestions.miner_config(),
    );
    info!(
        label_rules = rules.label_rules.len(),
        assignee_rules = rules.assignee_rules.len(),
        "loaded rules"
    );

    let output = match args.first().map(String::as_str) {
        None => {
            let (health, suggestions) = tokio::join!(
                inspector.inspect_rule_set(&rules.label_rules, &rules.assignee_rules),
                miner.generate_suggestions(config.suggestions.params(), &rules),
            );
            serde_json::to_string_pretty(&FullReport {
                health,
                suggestions,
            })?
        }
        Some("health") => serde_json::to_string_pretty(
            &inspector
                .inspect_rule_set(&rules.label_rules, &rules.assignee_rules)
                .await,
        )?,
        Some("suggestions") => serde_json::to_string_pretty(
            &miner
                .generate_suggestions(config.suggestions.params(), &rules)
                .await,
        )?,
        Some("explain") => {
            let message_id = args.get(1).ok_or(USAGE)?;
            let explanation = inspector
                .explain_message(
                    message_id,
                    args.get(2).map(String::as_str),
                    &rules.label_rules,
                    &rules.assignee_rules,
                )
                .await;
            serde_json::to_string_pretty(&explanation)?
        }
        Some(_) => return Err(USAGE.into()),
    };

    println!("{output}");
    Ok(())
}
