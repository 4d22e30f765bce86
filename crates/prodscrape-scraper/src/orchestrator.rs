//! Per-identifier scrape pipeline.
//!
//! Each call walks `Pending -> RateWait -> Fetching -> Extracting ->
//! Persisting` and ends in `Completed` or `Failed`. Stages run strictly in
//! order; the retry loop lives entirely inside `Fetching`. A failure jumps
//! straight to `Failed` and earlier stages are not undone: a page that was
//! fetched stays fetched even if the insert fails.

use prodscrape_core::{Asin, IdentifierError, Ruleset, StoredProduct};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::error::ScraperError;
use crate::extract::{ExtractionFailure, Extractor};
use crate::fetch::{FetchOutcome, HttpFetcher};
use crate::rate_limit::TokenBucket;
use crate::retry::RetryPolicy;
use crate::sink::{ProductSink, SinkError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrapeStage {
    Pending,
    RateWait,
    Fetching,
    Extracting,
    Persisting,
    Completed,
    Failed,
}

impl std::fmt::Display for ScrapeStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ScrapeStage::Pending => "pending",
            ScrapeStage::RateWait => "rate_wait",
            ScrapeStage::Fetching => "fetching",
            ScrapeStage::Extracting => "extracting",
            ScrapeStage::Persisting => "persisting",
            ScrapeStage::Completed => "completed",
            ScrapeStage::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Machine-readable failure category reported to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrapeErrorKind {
    InvalidIdentifier,
    FetchFailed,
    ExtractionFailed,
    PersistenceFailed,
    Cancelled,
}

impl ScrapeErrorKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ScrapeErrorKind::InvalidIdentifier => "InvalidIdentifier",
            ScrapeErrorKind::FetchFailed => "FetchFailed",
            ScrapeErrorKind::ExtractionFailed => "ExtractionFailed",
            ScrapeErrorKind::PersistenceFailed => "PersistenceFailed",
            ScrapeErrorKind::Cancelled => "Cancelled",
        }
    }
}

#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("invalid identifier: {0}")]
    InvalidIdentifier(#[from] IdentifierError),

    /// `retryable` is true when the attempt budget ran out on transient
    /// failures, false when the page failed permanently.
    #[error("fetching {url} failed after {attempts} attempt(s): {reason}")]
    FetchFailed {
        url: String,
        reason: String,
        attempts: u32,
        retryable: bool,
    },

    #[error("extraction failed for {url}: {source}")]
    ExtractionFailed {
        url: String,
        #[source]
        source: ExtractionFailure,
    },

    #[error("persistence failed: {0}")]
    PersistenceFailed(#[from] SinkError),

    #[error("cancelled during {stage}")]
    Cancelled { stage: ScrapeStage },
}

impl ScrapeError {
    #[must_use]
    pub fn kind(&self) -> ScrapeErrorKind {
        match self {
            ScrapeError::InvalidIdentifier(_) => ScrapeErrorKind::InvalidIdentifier,
            ScrapeError::FetchFailed { .. } => ScrapeErrorKind::FetchFailed,
            ScrapeError::ExtractionFailed { .. } => ScrapeErrorKind::ExtractionFailed,
            ScrapeError::PersistenceFailed(_) => ScrapeErrorKind::PersistenceFailed,
            ScrapeError::Cancelled { .. } => ScrapeErrorKind::Cancelled,
        }
    }
}

/// Composes rate limiter, retried fetcher, extractor and sink for one
/// ruleset. Built once at startup and shared by every request.
#[derive(Debug)]
pub struct ScrapeOrchestrator<S> {
    ruleset: Ruleset,
    extractor: Extractor,
    fetcher: HttpFetcher,
    retry: RetryPolicy,
    limiter: TokenBucket,
    sink: S,
}

impl<S: ProductSink> ScrapeOrchestrator<S> {
    /// # Errors
    ///
    /// Returns [`ScraperError::InvalidSelector`] if the ruleset does not compile.
    pub fn new(
        ruleset: Ruleset,
        fetcher: HttpFetcher,
        retry: RetryPolicy,
        limiter: TokenBucket,
        sink: S,
    ) -> Result<Self, ScraperError> {
        let extractor = Extractor::new(&ruleset)?;
        Ok(Self {
            ruleset,
            extractor,
            fetcher,
            retry,
            limiter,
            sink,
        })
    }

    #[must_use]
    pub fn ruleset(&self) -> &Ruleset {
        &self.ruleset
    }

    #[must_use]
    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Scrapes and stores one product.
    ///
    /// `cancel` is observed before every stage and during the rate-limit
    /// wait, the in-flight request and backoff sleeps. Once the insert has
    /// started it runs to completion.
    ///
    /// # Errors
    ///
    /// Returns the [`ScrapeError`] of the stage that failed.
    pub async fn scrape(
        &self,
        identifier: &str,
        cancel: &CancellationToken,
    ) -> Result<StoredProduct, ScrapeError> {
        let result = self.run(identifier, cancel).await;
        match &result {
            Ok(stored) => tracing::info!(
                asin = %stored.record.asin,
                id = stored.id,
                stage = %ScrapeStage::Completed,
                "scrape completed"
            ),
            Err(err) => tracing::warn!(
                identifier,
                stage = %ScrapeStage::Failed,
                kind = err.kind().as_str(),
                error = %err,
                "scrape failed"
            ),
        }
        result
    }

    async fn run(
        &self,
        identifier: &str,
        cancel: &CancellationToken,
    ) -> Result<StoredProduct, ScrapeError> {
        enter(ScrapeStage::Pending, identifier, cancel)?;
        let asin = Asin::parse(identifier)?;
        let url = self.ruleset.page_url(&asin);

        enter(ScrapeStage::RateWait, identifier, cancel)?;
        self.limiter
            .acquire(cancel)
            .await
            .map_err(|_| ScrapeError::Cancelled {
                stage: ScrapeStage::RateWait,
            })?;

        enter(ScrapeStage::Fetching, identifier, cancel)?;
        let retried = self
            .retry
            .run(cancel, || self.fetcher.fetch(&url))
            .await
            .map_err(|_| ScrapeError::Cancelled {
                stage: ScrapeStage::Fetching,
            })?;
        let attempts = retried.state.attempts;
        let content = match retried.outcome {
            FetchOutcome::Success { content, .. } => content,
            FetchOutcome::Transient { reason } => {
                return Err(ScrapeError::FetchFailed {
                    url,
                    reason,
                    attempts,
                    retryable: true,
                })
            }
            FetchOutcome::Permanent { reason } => {
                return Err(ScrapeError::FetchFailed {
                    url,
                    reason,
                    attempts,
                    retryable: false,
                })
            }
        };

        enter(ScrapeStage::Extracting, identifier, cancel)?;
        let html = String::from_utf8_lossy(&content);
        let record = self
            .extractor
            .extract(&asin, &html)
            .map_err(|source| ScrapeError::ExtractionFailed {
                url: url.clone(),
                source,
            })?;
        tracing::info!(
            asin = %record.asin,
            title = record.title.as_deref().unwrap_or_default(),
            price = ?record.price,
            images = record.images.len(),
            attempts,
            "scraped product data"
        );

        enter(ScrapeStage::Persisting, identifier, cancel)?;
        Ok(self.sink.insert(record).await?)
    }
}

/// Logs the transition into `stage`, or fails with `Cancelled` if the token
/// has already fired.
fn enter(
    stage: ScrapeStage,
    identifier: &str,
    cancel: &CancellationToken,
) -> Result<(), ScrapeError> {
    if cancel.is_cancelled() {
        return Err(ScrapeError::Cancelled { stage });
    }
    tracing::debug!(identifier, stage = %stage, "entering stage");
    Ok(())
}
