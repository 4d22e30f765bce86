//! Versioned extraction rulesets.
//!
//! A ruleset maps each logical [`Field`] of a product page to a CSS selector
//! and a required flag. Rulesets are loaded once at startup, either from the
//! built-in table or from a YAML file, and looked up by `(site, version)`.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::identifier::Asin;
use crate::ConfigError;

/// Placeholder substituted with the ASIN when building a page URL.
pub const ASIN_PLACEHOLDER: &str = "{asin}";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Field {
    Title,
    Price,
    Images,
}

impl Field {
    pub const ALL: [Field; 3] = [Field::Title, Field::Price, Field::Images];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Field::Title => "title",
            Field::Price => "price",
            Field::Images => "images",
        }
    }
}

impl std::fmt::Display for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldRule {
    pub selector: String,
    /// Read this attribute instead of the element text. `images` defaults to `src`.
    #[serde(default)]
    pub attribute: Option<String>,
    #[serde(default)]
    pub required: bool,
}

impl FieldRule {
    #[must_use]
    pub fn new(selector: &str, required: bool) -> Self {
        Self {
            selector: selector.to_string(),
            attribute: None,
            required,
        }
    }

    #[must_use]
    pub fn with_attribute(mut self, attribute: &str) -> Self {
        self.attribute = Some(attribute.to_string());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ruleset {
    pub site: String,
    pub version: u32,
    /// Page URL with an `{asin}` placeholder, e.g. `https://www.amazon.com/dp/{asin}`.
    pub url_template: String,
    pub fields: BTreeMap<Field, FieldRule>,
}

impl Ruleset {
    /// `site@version`, recorded on every product this ruleset produces.
    #[must_use]
    pub fn label(&self) -> String {
        format!("{}@{}", self.site, self.version)
    }

    #[must_use]
    pub fn page_url(&self, asin: &Asin) -> String {
        self.url_template.replace(ASIN_PLACEHOLDER, asin.as_str())
    }

    #[must_use]
    pub fn field(&self, field: Field) -> Option<&FieldRule> {
        self.fields.get(&field)
    }

    /// Returns a copy pointed at a different host, keeping the selectors.
    #[must_use]
    pub fn with_url_template(mut self, url_template: &str) -> Self {
        self.url_template = url_template.to_string();
        self
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RulesFile {
    pub rulesets: Vec<Ruleset>,
}

impl RulesFile {
    /// Looks up a ruleset by site and version. `None` picks the highest version.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownRuleset`] if nothing matches.
    pub fn select(&self, site: &str, version: Option<u32>) -> Result<&Ruleset, ConfigError> {
        let found = match version {
            Some(v) => self
                .rulesets
                .iter()
                .find(|r| r.site == site && r.version == v),
            None => self
                .rulesets
                .iter()
                .filter(|r| r.site == site)
                .max_by_key(|r| r.version),
        };
        found.ok_or_else(|| ConfigError::UnknownRuleset {
            key: format!(
                "{site}@{}",
                version.map_or_else(|| "latest".to_string(), |v| v.to_string())
            ),
        })
    }
}

/// The rulesets compiled into the binary, used when no rules file is configured.
#[must_use]
pub fn builtin_rulesets() -> RulesFile {
    let fields = BTreeMap::from([
        (Field::Title, FieldRule::new("#productTitle", true)),
        (Field::Price, FieldRule::new(".a-price .a-offscreen", false)),
        (
            Field::Images,
            FieldRule::new("#altImages img", false).with_attribute("src"),
        ),
    ]);

    RulesFile {
        rulesets: vec![Ruleset {
            site: "amazon".to_string(),
            version: 1,
            url_template: "https://www.amazon.com/dp/{asin}".to_string(),
            fields,
        }],
    }
}

/// Load and validate rulesets from a YAML file.
///
/// # Errors
///
/// Returns `ConfigError` if the file cannot be read, parsed, or fails validation.
pub fn load_rulesets(path: &Path) -> Result<RulesFile, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::RulesFileIo {
        path: path.display().to_string(),
        source: e,
    })?;
    parse_rulesets(&content)
}

/// Parse and validate rulesets from YAML text.
///
/// # Errors
///
/// Returns `ConfigError` if the text is not valid YAML or fails validation.
pub fn parse_rulesets(yaml: &str) -> Result<RulesFile, ConfigError> {
    let rules_file: RulesFile = serde_yaml::from_str(yaml)?;
    validate_rulesets(&rules_file)?;
    Ok(rules_file)
}

fn validate_rulesets(rules_file: &RulesFile) -> Result<(), ConfigError> {
    if rules_file.rulesets.is_empty() {
        return Err(ConfigError::Validation(
            "at least one ruleset is required".to_string(),
        ));
    }

    let mut seen = HashSet::new();
    for ruleset in &rules_file.rulesets {
        if ruleset.site.trim().is_empty() {
            return Err(ConfigError::Validation(
                "ruleset site must be non-empty".to_string(),
            ));
        }

        if ruleset.version == 0 {
            return Err(ConfigError::Validation(format!(
                "ruleset '{}' has version 0; versions start at 1",
                ruleset.site
            )));
        }

        if !seen.insert((ruleset.site.as_str(), ruleset.version)) {
            return Err(ConfigError::Validation(format!(
                "duplicate ruleset: '{}'",
                ruleset.label()
            )));
        }

        if !ruleset.url_template.contains(ASIN_PLACEHOLDER) {
            return Err(ConfigError::Validation(format!(
                "ruleset '{}' url_template must contain {ASIN_PLACEHOLDER}",
                ruleset.label()
            )));
        }

        if let Some((field, _)) = ruleset
            .fields
            .iter()
            .find(|(_, rule)| rule.selector.trim().is_empty())
        {
            return Err(ConfigError::Validation(format!(
                "ruleset '{}' has an empty selector for '{field}'",
                ruleset.label()
            )));
        }

        // A ruleset with nothing required would accept any page, even an error page.
        if !ruleset.fields.values().any(|rule| rule.required) {
            return Err(ConfigError::Validation(format!(
                "ruleset '{}' must mark at least one field as required",
                ruleset.label()
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
#[path = "rules_test.rs"]
mod tests;
