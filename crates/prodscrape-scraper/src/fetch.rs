//! Single-attempt page fetcher with outcome classification.
//!
//! [`HttpFetcher::fetch`] never retries and never returns an error: every
//! result is folded into one of the three [`FetchOutcome`] variants so the
//! retry policy can decide what to do next.

use std::time::Duration;

use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, StatusCode};

use crate::error::ScraperError;

/// Upper bound on TCP connect time, independent of the overall request timeout.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Success { content: Bytes, status: u16 },
    /// Worth retrying: 429, 5xx, timeouts, connection failures.
    Transient { reason: String },
    /// Retrying cannot help: other 4xx, malformed URL.
    Permanent { reason: String },
}

impl FetchOutcome {
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, FetchOutcome::Transient { .. })
    }

    /// Failure reason, or `None` for a success.
    #[must_use]
    pub fn reason(&self) -> Option<&str> {
        match self {
            FetchOutcome::Success { .. } => None,
            FetchOutcome::Transient { reason } | FetchOutcome::Permanent { reason } => {
                Some(reason)
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct FetcherConfig {
    pub timeout: Duration,
    pub user_agent: String,
    /// Extra headers sent with every request.
    pub headers: Vec<(String, String)>,
}

impl FetcherConfig {
    /// Config with browser-like `Accept` headers, which product pages expect.
    #[must_use]
    pub fn new(timeout: Duration, user_agent: &str) -> Self {
        Self {
            timeout,
            user_agent: user_agent.to_string(),
            headers: vec![
                (
                    "accept".to_string(),
                    "text/html,application/xhtml+xml;q=0.9,*/*;q=0.8".to_string(),
                ),
                ("accept-language".to_string(), "en-US,en;q=0.9".to_string()),
            ],
        }
    }

    #[must_use]
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }
}

/// Page fetcher backed by a shared `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    /// Builds the underlying client with the configured timeout, `User-Agent`
    /// and default headers.
    ///
    /// # Errors
    ///
    /// Returns [`ScraperError::InvalidConfig`] for a zero timeout or an
    /// invalid header, and [`ScraperError::Http`] if the client cannot be built.
    pub fn new(config: &FetcherConfig) -> Result<Self, ScraperError> {
        if config.timeout.is_zero() {
            return Err(ScraperError::InvalidConfig(
                "request timeout must be greater than zero".to_string(),
            ));
        }

        let mut headers = HeaderMap::new();
        for (name, value) in &config.headers {
            let name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
                ScraperError::InvalidConfig(format!("invalid header name {name:?}: {e}"))
            })?;
            let value = HeaderValue::from_str(value).map_err(|e| {
                ScraperError::InvalidConfig(format!("invalid value for header {name}: {e}"))
            })?;
            headers.insert(name, value);
        }

        let client = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.timeout.min(CONNECT_TIMEOUT))
            .user_agent(config.user_agent.as_str())
            .default_headers(headers)
            .build()?;
        Ok(Self { client })
    }

    /// Issues one GET request and classifies the result.
    pub async fn fetch(&self, url: &str) -> FetchOutcome {
        let parsed = match reqwest::Url::parse(url) {
            Ok(u) if matches!(u.scheme(), "http" | "https") => u,
            Ok(u) => {
                return FetchOutcome::Permanent {
                    reason: format!("unsupported URL scheme '{}' in {url}", u.scheme()),
                }
            }
            Err(e) => {
                return FetchOutcome::Permanent {
                    reason: format!("malformed URL {url:?}: {e}"),
                }
            }
        };

        let response = match self.client.get(parsed).send().await {
            Ok(response) => response,
            Err(err) => return classify_transport_error(&err, url),
        };

        let status = response.status();
        tracing::debug!(url, status = status.as_u16(), "fetched page");

        if !status.is_success() {
            return classify_status(status, url);
        }

        match response.bytes().await {
            Ok(content) => FetchOutcome::Success {
                content,
                status: status.as_u16(),
            },
            Err(e) => FetchOutcome::Transient {
                reason: format!("failed reading body from {url}: {e}"),
            },
        }
    }
}

/// Maps a non-2xx status: 429 and 5xx are transient, everything else permanent.
fn classify_status(status: StatusCode, url: &str) -> FetchOutcome {
    let reason = format!("HTTP {status} from {url}");
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        FetchOutcome::Transient { reason }
    } else {
        FetchOutcome::Permanent { reason }
    }
}

/// Builder and redirect errors will repeat on every attempt; timeouts,
/// connect failures and resets may not.
fn classify_transport_error(err: &reqwest::Error, url: &str) -> FetchOutcome {
    if err.is_builder() || err.is_redirect() {
        FetchOutcome::Permanent {
            reason: format!("request to {url} cannot succeed: {err}"),
        }
    } else if err.is_timeout() {
        FetchOutcome::Transient {
            reason: format!("request to {url} timed out"),
        }
    } else {
        FetchOutcome::Transient {
            reason: format!("request to {url} failed: {err}"),
        }
    }
}
