use super::*;

const EXAMPLE_RULES: &str = include_str!("../../../config/rules.example.yaml");

fn single_ruleset_yaml(body: &str) -> String {
    format!("rulesets:\n{body}")
}

#[test]
fn builtin_rulesets_pass_validation() {
    validate_rulesets(&builtin_rulesets()).expect("built-in rulesets must be valid");
}

#[test]
fn builtin_amazon_requires_only_title() {
    let rules = builtin_rulesets();
    let amazon = rules.select("amazon", None).unwrap();
    assert_eq!(amazon.label(), "amazon@1");
    assert!(amazon.field(Field::Title).unwrap().required);
    assert!(!amazon.field(Field::Price).unwrap().required);
    assert!(!amazon.field(Field::Images).unwrap().required);
}

#[test]
fn page_url_substitutes_asin() {
    let rules = builtin_rulesets();
    let amazon = rules.select("amazon", Some(1)).unwrap();
    let asin = Asin::parse("B000TEST01").unwrap();
    assert_eq!(amazon.page_url(&asin), "https://www.amazon.com/dp/B000TEST01");
}

#[test]
fn example_file_parses() {
    let rules = parse_rulesets(EXAMPLE_RULES).expect("example rules should parse");
    assert_eq!(rules.rulesets.len(), 3);
}

#[test]
fn select_without_version_picks_latest() {
    let rules = parse_rulesets(EXAMPLE_RULES).unwrap();
    assert_eq!(rules.select("amazon", None).unwrap().version, 2);
    assert_eq!(rules.select("amazon", Some(1)).unwrap().version, 1);
}

#[test]
fn select_unknown_version_fails() {
    let rules = parse_rulesets(EXAMPLE_RULES).unwrap();
    let err = rules.select("amazon", Some(9)).unwrap_err();
    assert!(matches!(err, ConfigError::UnknownRuleset { ref key } if key == "amazon@9"));
}

#[test]
fn select_unknown_site_reports_latest() {
    let rules = builtin_rulesets();
    let err = rules.select("ebay", None).unwrap_err();
    assert_eq!(err.to_string(), "no ruleset matches ebay@latest");
}

#[test]
fn missing_attribute_and_required_default() {
    let rules = parse_rulesets(EXAMPLE_RULES).unwrap();
    let uk = rules.select("amazon-uk", None).unwrap();
    let images = uk.field(Field::Images).unwrap();
    assert_eq!(images.attribute, None);
    assert!(!images.required);
}

#[test]
fn rejects_duplicate_site_version() {
    let body = r#"
  - site: shop
    version: 1
    url_template: "https://shop.test/{asin}"
    fields:
      title: { selector: "h1", required: true }
  - site: shop
    version: 1
    url_template: "https://shop.test/p/{asin}"
    fields:
      title: { selector: "h1", required: true }
"#;
    let err = parse_rulesets(&single_ruleset_yaml(body)).unwrap_err();
    assert!(err.to_string().contains("duplicate ruleset: 'shop@1'"));
}

#[test]
fn rejects_template_without_placeholder() {
    let body = r#"
  - site: shop
    version: 1
    url_template: "https://shop.test/product"
    fields:
      title: { selector: "h1", required: true }
"#;
    let err = parse_rulesets(&single_ruleset_yaml(body)).unwrap_err();
    assert!(err.to_string().contains("must contain {asin}"));
}

#[test]
fn rejects_ruleset_without_required_field() {
    let body = r#"
  - site: shop
    version: 1
    url_template: "https://shop.test/{asin}"
    fields:
      title: { selector: "h1" }
"#;
    let err = parse_rulesets(&single_ruleset_yaml(body)).unwrap_err();
    assert!(err.to_string().contains("at least one field as required"));
}

#[test]
fn rejects_empty_selector() {
    let body = r#"
  - site: shop
    version: 1
    url_template: "https://shop.test/{asin}"
    fields:
      title: { selector: "h1", required: true }
      price: { selector: "  " }
"#;
    let err = parse_rulesets(&single_ruleset_yaml(body)).unwrap_err();
    assert!(err.to_string().contains("empty selector for 'price'"));
}

#[test]
fn rejects_unknown_field_name() {
    let body = r#"
  - site: shop
    version: 1
    url_template: "https://shop.test/{asin}"
    fields:
      title: { selector: "h1", required: true }
      rating: { selector: ".stars" }
"#;
    let err = parse_rulesets(&single_ruleset_yaml(body)).unwrap_err();
    assert!(matches!(err, ConfigError::RulesFileParse(_)));
}

#[test]
fn rejects_empty_file() {
    let err = parse_rulesets("rulesets: []").unwrap_err();
    assert!(matches!(err, ConfigError::Validation(_)));
}

#[test]
fn load_rulesets_reports_missing_file() {
    let err = load_rulesets(Path::new("/nonexistent/rules.yaml")).unwrap_err();
    assert!(matches!(err, ConfigError::RulesFileIo { .. }));
}
