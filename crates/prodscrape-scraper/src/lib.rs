//! Fetch-and-extract core: rate limiting, retried page fetches, selector
//! extraction and persistence for a single product identifier.

pub mod error;
pub mod extract;
pub mod fetch;
pub mod orchestrator;
pub mod rate_limit;
pub mod retry;
pub mod sink;

pub use error::ScraperError;
pub use extract::{parse_price, ExtractionFailure, Extractor};
pub use fetch::{FetchOutcome, FetcherConfig, HttpFetcher};
pub use orchestrator::{ScrapeError, ScrapeErrorKind, ScrapeOrchestrator, ScrapeStage};
pub use rate_limit::{Acquire, TokenBucket};
pub use retry::{Retried, RetryPolicy, RetryState};
pub use sink::{InMemorySink, ProductSink, SinkError};

/// Returned by any suspension point whose cancellation token fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("operation cancelled")]
pub struct Cancelled;
