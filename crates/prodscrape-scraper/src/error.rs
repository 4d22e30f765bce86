use prodscrape_core::Field;
use thiserror::Error;

/// Construction-time failures. Runtime fetch and extraction problems are
/// reported through [`crate::FetchOutcome`] and [`crate::ScrapeError`].
#[derive(Debug, Error)]
pub enum ScraperError {
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid fetcher configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid selector \"{selector}\" for {field} in ruleset {ruleset}: {reason}")]
    InvalidSelector {
        ruleset: String,
        field: Field,
        selector: String,
        reason: String,
    },
}
