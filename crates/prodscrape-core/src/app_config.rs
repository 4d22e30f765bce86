use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Test => write!(f, "test"),
            Environment::Production => write!(f, "production"),
        }
    }
}

/// Process configuration, loaded once at startup and never reloaded.
#[derive(Clone)]
pub struct AppConfig {
    pub env: Environment,
    pub bind_addr: SocketAddr,
    pub log_level: String,
    /// Bearer tokens accepted by the scrape route. Empty disables auth in development.
    pub api_keys: Vec<String>,
    pub request_timeout_secs: u64,
    pub user_agent: String,
    /// Total attempts per fetch, including the first one.
    pub max_attempts: u32,
    pub retry_base_delay_ms: u64,
    pub rate_limit_capacity: u32,
    /// One token is returned to the bucket every `rate_limit_refill_ms`.
    pub rate_limit_refill_ms: u64,
    pub scrape_deadline_secs: u64,
    /// YAML rulesets file; `None` uses the built-in rulesets.
    pub rules_path: Option<PathBuf>,
    pub ruleset: String,
    /// `None` selects the highest version of `ruleset`.
    pub ruleset_version: Option<u32>,
}

impl AppConfig {
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    #[must_use]
    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }

    #[must_use]
    pub fn rate_limit_refill(&self) -> Duration {
        Duration::from_millis(self.rate_limit_refill_ms)
    }

    #[must_use]
    pub fn scrape_deadline(&self) -> Duration {
        Duration::from_secs(self.scrape_deadline_secs)
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("env", &self.env)
            .field("bind_addr", &self.bind_addr)
            .field("log_level", &self.log_level)
            .field("api_keys", &format!("[{} redacted]", self.api_keys.len()))
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("user_agent", &self.user_agent)
            .field("max_attempts", &self.max_attempts)
            .field("retry_base_delay_ms", &self.retry_base_delay_ms)
            .field("rate_limit_capacity", &self.rate_limit_capacity)
            .field("rate_limit_refill_ms", &self.rate_limit_refill_ms)
            .field("scrape_deadline_secs", &self.scrape_deadline_secs)
            .field("rules_path", &self.rules_path)
            .field("ruleset", &self.ruleset)
            .field("ruleset_version", &self.ruleset_version)
            .finish()
    }
}
