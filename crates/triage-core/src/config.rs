use serde::Deserialize;
use std::{env, path::Path, path::PathBuf};
use thiserror::Error;

use crate::inspector::InspectorConfig;
use crate::suggestions::{MinerConfig, SuggestionParams};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    pub app: AppConfig,
    pub paths: PathsConfig,
    pub telemetry: TelemetryConfig,
    #[serde(default)]
    pub inspector: InspectorConfig,
    #[serde(default)]
    pub suggestions: SuggestionsConfig,
    #[serde(default)]
    pub assignees: AssigneesConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct AppConfig {
    pub service_name: String,
    pub env: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct PathsConfig {
    pub database: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct TelemetryConfig {
    pub otlp_endpoint: Option<String>,
    pub export_traces: bool,
}

/// Mining window, thresholds and collaborator fan-out for suggestions.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct SuggestionsConfig {
    pub days: u32,
    pub min_actions: usize,
    pub min_actors: usize,
    pub lookup_concurrency: usize,
    pub mute_label: String,
    pub mine_label_applications: bool,
}

impl Default for SuggestionsConfig {
    fn default() -> Self {
        let miner = MinerConfig::default();
        let params = SuggestionParams::default();
        Self {
            days: params.days,
            min_actions: params.min_actions,
            min_actors: params.min_actors,
            lookup_concurrency: miner.lookup_concurrency,
            mute_label: miner.mute_label,
            mine_label_applications: miner.mine_label_applications,
        }
    }
}

impl SuggestionsConfig {
    pub fn params(&self) -> SuggestionParams {
        SuggestionParams {
            days: self.days,
            min_actions: self.min_actions,
            min_actors: self.min_actors,
        }
    }

    pub fn miner_config(&self) -> MinerConfig {
        MinerConfig {
            lookup_concurrency: self.lookup_concurrency,
            mute_label: self.mute_label.clone(),
            mine_label_applications: self.mine_label_applications,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct AssigneesConfig {
    /// Domains assignee addresses may belong to. Empty allows any domain.
    /// Pass to `RuleRepository::create_assignee_rule` when writing rules.
    #[serde(default)]
    pub allowed_domains: Vec<String>,
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read configuration file: {0}")]
    ConfigBuild(config::ConfigError),
    #[error("failed to parse configuration: {0}")]
    Deserialize(config::ConfigError),
    #[error("missing required environment variable {0}")]
    MissingEnvVar(String),
    #[error("invalid TRIAGE_SAMPLE_SIZE override: {0}")]
    InvalidSampleSize(std::num::ParseIntError),
}

impl Config {
    /// Load configuration from the provided path, apply environment overrides, and
    /// resolve any `env:` indirections.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .build()
            .map_err(ConfigError::ConfigBuild)?;

        let mut cfg: Config = raw.try_deserialize().map_err(ConfigError::Deserialize)?;
        cfg.apply_env_overrides()?;
        cfg.resolve_env_markers()?;
        cfg.expand_paths();
        Ok(cfg)
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(app_env) = env::var("APP_ENV") {
            self.app.env = app_env;
        }

        if let Ok(otlp) = env::var("OTLP_ENDPOINT") {
            self.telemetry.otlp_endpoint = Some(otlp);
        }

        if let Ok(database) = env::var("DATABASE_PATH") {
            self.paths.database = PathBuf::from(database);
        }

        if let Ok(sample_size) = env::var("TRIAGE_SAMPLE_SIZE") {
            self.inspector.sample_size = sample_size
                .parse()
                .map_err(ConfigError::InvalidSampleSize)?;
        }

        Ok(())
    }

    fn resolve_env_markers(&mut self) -> Result<(), ConfigError> {
        apply_env_marker(&mut self.app.service_name)?;
        apply_env_marker(&mut self.app.env)?;
        apply_env_marker_path(&mut self.paths.database)?;
        if let Some(endpoint) = &mut self.telemetry.otlp_endpoint {
            apply_env_marker(endpoint)?;
        }
        apply_env_marker(&mut self.suggestions.mute_label)?;
        for domain in &mut self.assignees.allowed_domains {
            apply_env_marker(domain)?;
        }
        Ok(())
    }

    fn expand_paths(&mut self) {
        let database_string = self.paths.database.to_string_lossy().to_string();
        let database = shellexpand::tilde(&database_string);
        self.paths.database = PathBuf::from(database.as_ref());
    }
}

fn apply_env_marker(value: &mut String) -> Result<(), ConfigError> {
    if let Some(rest) = value.strip_prefix("env:") {
        let resolved = env::var(rest).map_err(|_| ConfigError::MissingEnvVar(rest.to_string()))?;
        *value = resolved;
    }
    Ok(())
}

fn apply_env_marker_path(path: &mut PathBuf) -> Result<(), ConfigError> {
    let mut value = path.to_string_lossy().to_string();
    apply_env_marker(&mut value)?;
    *path = PathBuf::from(value);
    Ok(())
}
