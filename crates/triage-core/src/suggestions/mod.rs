//! Candidate rules learned from repeated manual actions in the audit log.
//!
//! A suggestion needs enough actions and enough distinct people behind them.
//! Nothing here creates rules.

mod miner;
pub mod types;

pub use miner::{SuggestionMiner, suggestion_id};
pub use types::{
    MinerConfig, ProposedRule, RuleSuggestion, SuggestedSender, SuggestionParams,
    SuggestionReport, SuggestionType, SuggestionWarning,
};
