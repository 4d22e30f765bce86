use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::identifier::Asin;

/// Fields extracted from one product page.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductRecord {
    pub asin: Asin,
    pub title: Option<String>,
    /// Currency-agnostic amount; `None` when the price was absent or unparseable.
    #[serde(with = "rust_decimal::serde::float_option")]
    pub price: Option<Decimal>,
    /// Image URLs in document order. Duplicates are kept as found.
    pub images: Vec<String>,
    /// `site@version` of the ruleset that produced this record.
    pub ruleset: String,
    pub scraped_at: DateTime<Utc>,
}

/// A [`ProductRecord`] acknowledged by a sink, with the id it assigned.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredProduct {
    pub id: i64,
    #[serde(flatten)]
    pub record: ProductRecord,
}
