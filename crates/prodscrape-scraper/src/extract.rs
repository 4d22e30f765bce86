//! Selector-driven extraction of product fields from page HTML.
//!
//! One generic routine interprets a [`Ruleset`]: each field's selector is
//! compiled once when the [`Extractor`] is built, then applied to every page.

use std::str::FromStr;
use std::sync::LazyLock;

use chrono::Utc;
use prodscrape_core::{Asin, Field, ProductRecord, Ruleset};
use regex::Regex;
use rust_decimal::Decimal;
use scraper::{ElementRef, Html, Selector};
use thiserror::Error;

use crate::error::ScraperError;

/// Everything that is not part of a plain decimal number.
static PRICE_NOISE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^0-9.\-]").expect("valid price regex"));

/// Attribute read for `images` when the rule does not name one.
const DEFAULT_IMAGE_ATTRIBUTE: &str = "src";

/// The page did not contain one or more required fields. Layout changes do
/// not heal on retry, so this is treated as a permanent failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("required fields missing: {}", join_fields(.missing))]
pub struct ExtractionFailure {
    /// In `title, price, images` order.
    pub missing: Vec<Field>,
}

fn join_fields(fields: &[Field]) -> String {
    fields
        .iter()
        .map(|f| f.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Debug)]
struct CompiledRule {
    field: Field,
    selector: Selector,
    attribute: Option<String>,
    required: bool,
}

#[derive(Debug)]
pub struct Extractor {
    label: String,
    rules: Vec<CompiledRule>,
}

impl Extractor {
    /// Compiles every selector in `ruleset`.
    ///
    /// # Errors
    ///
    /// Returns [`ScraperError::InvalidSelector`] naming the first selector
    /// that does not parse.
    pub fn new(ruleset: &Ruleset) -> Result<Self, ScraperError> {
        let label = ruleset.label();
        let rules = ruleset
            .fields
            .iter()
            .map(|(&field, rule)| -> Result<CompiledRule, ScraperError> {
                let selector = Selector::parse(&rule.selector).map_err(|e| {
                    ScraperError::InvalidSelector {
                        ruleset: label.clone(),
                        field,
                        selector: rule.selector.clone(),
                        reason: e.to_string(),
                    }
                })?;
                let attribute = rule.attribute.clone().or_else(|| {
                    (field == Field::Images).then(|| DEFAULT_IMAGE_ATTRIBUTE.to_string())
                });
                Ok(CompiledRule {
                    field,
                    selector,
                    attribute,
                    required: rule.required,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { label, rules })
    }

    /// `site@version` of the compiled ruleset.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Applies every rule to `html`.
    ///
    /// Optional fields that do not match are left as `None` / empty. A price
    /// that matches but does not parse counts as not found.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractionFailure`] listing every required field that was
    /// not found.
    pub fn extract(&self, asin: &Asin, html: &str) -> Result<ProductRecord, ExtractionFailure> {
        let document = Html::parse_document(html);
        let mut record = ProductRecord {
            asin: asin.clone(),
            title: None,
            price: None,
            images: Vec::new(),
            ruleset: self.label.clone(),
            scraped_at: Utc::now(),
        };
        let mut missing = Vec::new();

        for rule in &self.rules {
            let found = match rule.field {
                Field::Title => {
                    record.title = first_value(&document, rule);
                    record.title.is_some()
                }
                Field::Price => {
                    let text = first_value(&document, rule);
                    record.price = text.as_deref().and_then(parse_price);
                    if record.price.is_none() {
                        if let Some(text) = text {
                            tracing::debug!(asin = %asin, text = %text, "price text did not parse");
                        }
                    }
                    record.price.is_some()
                }
                Field::Images => {
                    record.images = all_values(&document, rule);
                    !record.images.is_empty()
                }
            };

            if !found {
                if rule.required {
                    missing.push(rule.field);
                } else {
                    tracing::debug!(asin = %asin, field = %rule.field, "optional field not found");
                }
            }
        }

        if missing.is_empty() {
            Ok(record)
        } else {
            Err(ExtractionFailure { missing })
        }
    }
}

/// Value of the first matching element that yields a non-empty value.
fn first_value(document: &Html, rule: &CompiledRule) -> Option<String> {
    document
        .select(&rule.selector)
        .find_map(|el| element_value(el, rule.attribute.as_deref()))
}

/// Values of every matching element, in document order, duplicates kept.
fn all_values(document: &Html, rule: &CompiledRule) -> Vec<String> {
    document
        .select(&rule.selector)
        .filter_map(|el| element_value(el, rule.attribute.as_deref()))
        .collect()
}

fn element_value(element: ElementRef<'_>, attribute: Option<&str>) -> Option<String> {
    let value = match attribute {
        Some(name) => element.value().attr(name)?.trim().to_string(),
        None => element
            .text()
            .flat_map(str::split_whitespace)
            .collect::<Vec<_>>()
            .join(" "),
    };
    (!value.is_empty()).then_some(value)
}

/// Parses a displayed price into a decimal.
///
/// Everything except digits, `.` and `-` is stripped first, so currency
/// symbols and thousands separators are ignored. Returns `None` when nothing
/// numeric is left or the remainder is not a valid number.
#[must_use]
pub fn parse_price(text: &str) -> Option<Decimal> {
    let cleaned = PRICE_NOISE.replace_all(text, "");
    if cleaned.is_empty() {
        return None;
    }
    Decimal::from_str(&cleaned).ok()
}

#[cfg(test)]
#[path = "extract_test.rs"]
mod tests;
