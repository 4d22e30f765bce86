//! Shared domain types and configuration for the product scraper.

pub mod app_config;
pub mod config;
pub mod identifier;
pub mod products;
pub mod rules;

pub use app_config::{AppConfig, Environment};
pub use config::{load_app_config, load_app_config_from_env};
pub use identifier::{Asin, IdentifierError};
pub use products::{ProductRecord, StoredProduct};
pub use rules::{builtin_rulesets, load_rulesets, Field, FieldRule, Ruleset, RulesFile};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },

    #[error("failed to read rules file {path}: {source}")]
    RulesFileIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse rules file: {0}")]
    RulesFileParse(#[from] serde_yaml::Error),

    #[error("rules validation failed: {0}")]
    Validation(String),

    /// `key` is `site@version`, or `site@latest` when no version was pinned.
    #[error("no ruleset matches {key}")]
    UnknownRuleset { key: String },
}
