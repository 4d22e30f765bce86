use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

use crate::app_config::{AppConfig, Environment};
use crate::ConfigError;

/// Desktop browser UA sent by default; retail sites tend to serve a
/// degraded page to obvious bots.
pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

/// Load application configuration from environment variables.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files before reading env vars.
///
/// # Errors
///
/// Returns `ConfigError` if a value is present but invalid.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_app_config_from_env()
}

/// Load application configuration from environment variables already in the process.
///
/// Unlike [`load_app_config`], this does NOT load `.env` files.
///
/// # Errors
///
/// Returns `ConfigError` if a value is present but invalid.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

/// Build application configuration using the provided env-var lookup function.
///
/// Decoupled from the real environment so tests can drive it from a `HashMap`.
fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    let parse_with_default = |var: &str, default: &str| -> Result<String, ConfigError> {
        let raw = or_default(var, default);
        if raw.trim().is_empty() {
            return Err(ConfigError::InvalidEnvVar {
                var: var.to_string(),
                reason: "must not be empty".to_string(),
            });
        }
        Ok(raw)
    };

    let env = parse_environment(&or_default("PRODSCRAPE_ENV", "development"))?;
    let bind_addr: SocketAddr = parse_value(
        "PRODSCRAPE_BIND_ADDR",
        &or_default("PRODSCRAPE_BIND_ADDR", "0.0.0.0:9001"),
    )?;
    let log_level = or_default("PRODSCRAPE_LOG_LEVEL", "info");
    let api_keys = parse_api_keys(&or_default("PRODSCRAPE_API_KEYS", ""));

    let request_timeout_secs: u64 = parse_positive(
        "PRODSCRAPE_REQUEST_TIMEOUT_SECS",
        &or_default("PRODSCRAPE_REQUEST_TIMEOUT_SECS", "30"),
    )?;
    let user_agent = parse_with_default("PRODSCRAPE_USER_AGENT", DEFAULT_USER_AGENT)?;
    let max_attempts: u32 = parse_positive(
        "PRODSCRAPE_MAX_ATTEMPTS",
        &or_default("PRODSCRAPE_MAX_ATTEMPTS", "3"),
    )?;
    let retry_base_delay_ms: u64 = parse_value(
        "PRODSCRAPE_RETRY_BASE_DELAY_MS",
        &or_default("PRODSCRAPE_RETRY_BASE_DELAY_MS", "500"),
    )?;
    let rate_limit_capacity: u32 = parse_positive(
        "PRODSCRAPE_RATE_LIMIT_CAPACITY",
        &or_default("PRODSCRAPE_RATE_LIMIT_CAPACITY", "5"),
    )?;
    let rate_limit_refill_ms: u64 = parse_positive(
        "PRODSCRAPE_RATE_LIMIT_REFILL_MS",
        &or_default("PRODSCRAPE_RATE_LIMIT_REFILL_MS", "1000"),
    )?;
    let scrape_deadline_secs: u64 = parse_positive(
        "PRODSCRAPE_SCRAPE_DEADLINE_SECS",
        &or_default("PRODSCRAPE_SCRAPE_DEADLINE_SECS", "120"),
    )?;

    let rules_path = lookup("PRODSCRAPE_RULES_PATH")
        .ok()
        .filter(|p| !p.trim().is_empty())
        .map(PathBuf::from);
    let ruleset = parse_with_default("PRODSCRAPE_RULESET", "amazon")?;
    let ruleset_version = match lookup("PRODSCRAPE_RULESET_VERSION") {
        Ok(raw) if !raw.trim().is_empty() => {
            Some(parse_positive::<u32>("PRODSCRAPE_RULESET_VERSION", &raw)?)
        }
        _ => None,
    };

    Ok(AppConfig {
        env,
        bind_addr,
        log_level,
        api_keys,
        request_timeout_secs,
        user_agent,
        max_attempts,
        retry_base_delay_ms,
        rate_limit_capacity,
        rate_limit_refill_ms,
        scrape_deadline_secs,
        rules_path,
        ruleset,
        ruleset_version,
    })
}

fn parse_value<T>(var: &str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidEnvVar {
            var: var.to_string(),
            reason: e.to_string(),
        })
}

/// Like [`parse_value`] but rejects zero: timeouts, capacities and attempt
/// budgets of zero would either hang or never run.
fn parse_positive<T>(var: &str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr + Default + PartialEq,
    T::Err: std::fmt::Display,
{
    let value = parse_value::<T>(var, raw)?;
    if value == T::default() {
        return Err(ConfigError::InvalidEnvVar {
            var: var.to_string(),
            reason: "must be greater than zero".to_string(),
        });
    }
    Ok(value)
}

fn parse_api_keys(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToOwned::to_owned)
        .collect()
}

/// Parse a string into an `Environment` variant.
///
/// # Errors
///
/// Returns `ConfigError::InvalidEnvVar` for unrecognized values.
fn parse_environment(s: &str) -> Result<Environment, ConfigError> {
    match s {
        "development" => Ok(Environment::Development),
        "test" => Ok(Environment::Test),
        "production" => Ok(Environment::Production),
        other => Err(ConfigError::InvalidEnvVar {
            var: "PRODSCRAPE_ENV".to_string(),
            reason: format!("unknown environment '{other}'"),
        }),
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
