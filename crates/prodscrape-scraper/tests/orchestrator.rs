//! End-to-end tests for `ScrapeOrchestrator::scrape` against a mock page.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use prodscrape_core::{builtin_rulesets, ProductRecord, Ruleset, StoredProduct};
use prodscrape_scraper::{
    FetcherConfig, HttpFetcher, InMemorySink, ProductSink, RetryPolicy, ScrapeError,
    ScrapeErrorKind, ScrapeOrchestrator, ScrapeStage, SinkError, TokenBucket,
};

const WIDGET_PAGE: &str = r#"<html><body>
  <span id="productTitle">Widget</span>
  <span class="a-price"><span class="a-offscreen">$9.99</span></span>
  <div id="altImages">
    <img src="https://img.test/widget-1.jpg">
    <img src="https://img.test/widget-2.jpg">
  </div>
</body></html>"#;

/// Wraps the in-memory sink and counts insert calls.
#[derive(Debug, Default)]
struct CountingSink {
    inner: InMemorySink,
    calls: AtomicUsize,
}

impl ProductSink for CountingSink {
    async fn insert(&self, record: ProductRecord) -> Result<StoredProduct, SinkError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.insert(record).await
    }
}

fn ruleset_for(server: &MockServer) -> Ruleset {
    builtin_rulesets()
        .select("amazon", None)
        .unwrap()
        .clone()
        .with_url_template(&format!("{}/dp/{{asin}}", server.uri()))
}

fn orchestrator(
    server: &MockServer,
    max_attempts: u32,
    limiter: TokenBucket,
) -> ScrapeOrchestrator<Arc<CountingSink>> {
    let fetcher =
        HttpFetcher::new(&FetcherConfig::new(Duration::from_secs(5), "prodscrape-test/0.1"))
            .unwrap();
    ScrapeOrchestrator::new(
        ruleset_for(server),
        fetcher,
        RetryPolicy::new(max_attempts, Duration::from_millis(1)),
        limiter,
        Arc::new(CountingSink::default()),
    )
    .expect("orchestrator")
}

fn roomy_limiter() -> TokenBucket {
    TokenBucket::new(10, Duration::from_millis(10))
}

#[tokio::test]
async fn scrapes_extracts_and_stores_widget() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/dp/B000TEST01"))
        .respond_with(ResponseTemplate::new(200).set_body_string(WIDGET_PAGE))
        .expect(1)
        .mount(&server)
        .await;

    let orch = orchestrator(&server, 3, roomy_limiter());
    let stored = orch
        .scrape("B000TEST01", &CancellationToken::new())
        .await
        .expect("scrape should succeed");

    assert_eq!(stored.record.asin.as_str(), "B000TEST01");
    assert_eq!(stored.record.title.as_deref(), Some("Widget"));
    assert_eq!(stored.record.price, Some(Decimal::new(999, 2)));
    assert_eq!(
        stored.record.images,
        vec!["https://img.test/widget-1.jpg", "https://img.test/widget-2.jpg"]
    );
    assert_eq!(orch.sink().calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn retries_transient_errors_until_success() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string(WIDGET_PAGE))
        .expect(1)
        .mount(&server)
        .await;

    let orch = orchestrator(&server, 3, roomy_limiter());
    let stored = orch
        .scrape("B000TEST01", &CancellationToken::new())
        .await
        .expect("third attempt should succeed");
    assert_eq!(stored.id, 1);
}

#[tokio::test]
async fn exhausted_retries_report_fetch_failed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(429))
        .expect(2)
        .mount(&server)
        .await;

    let orch = orchestrator(&server, 2, roomy_limiter());
    let err = orch
        .scrape("B000TEST01", &CancellationToken::new())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ScrapeErrorKind::FetchFailed);
    assert!(matches!(
        err,
        ScrapeError::FetchFailed {
            attempts: 2,
            retryable: true,
            ..
        }
    ));
    assert_eq!(orch.sink().calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn not_found_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let orch = orchestrator(&server, 5, roomy_limiter());
    let err = orch
        .scrape("B000TEST01", &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ScrapeError::FetchFailed {
            attempts: 1,
            retryable: false,
            ..
        }
    ));
}

#[tokio::test]
async fn missing_title_is_extraction_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string("<html><body><p>captcha</p></body></html>"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let orch = orchestrator(&server, 3, roomy_limiter());
    let err = orch
        .scrape("B000TEST01", &CancellationToken::new())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ScrapeErrorKind::ExtractionFailed);
    assert!(err.to_string().contains("required fields missing: title"));
    assert_eq!(orch.sink().calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn invalid_identifier_makes_no_request() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let orch = orchestrator(&server, 3, roomy_limiter());
    let err = orch
        .scrape("../etc/pw", &CancellationToken::new())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ScrapeErrorKind::InvalidIdentifier);
}

#[tokio::test]
async fn second_scrape_of_same_product_is_persistence_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string(WIDGET_PAGE))
        .expect(2)
        .mount(&server)
        .await;

    let orch = orchestrator(&server, 1, roomy_limiter());
    let cancel = CancellationToken::new();
    orch.scrape("B000TEST01", &cancel).await.unwrap();
    let err = orch.scrape("B000TEST01", &cancel).await.unwrap_err();
    assert_eq!(err.kind(), ScrapeErrorKind::PersistenceFailed);
    assert!(matches!(
        err,
        ScrapeError::PersistenceFailed(SinkError::Duplicate { .. })
    ));
    assert_eq!(orch.sink().calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn cancellation_during_rate_wait_makes_no_request() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string(WIDGET_PAGE))
        .expect(0)
        .mount(&server)
        .await;

    // Drain the only token so the scrape has to wait a full minute.
    let limiter = TokenBucket::new(1, Duration::from_secs(60));
    limiter.acquire(&CancellationToken::new()).await.unwrap();

    let orch = orchestrator(&server, 3, limiter);
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let err = orch.scrape("B000TEST01", &cancel).await.unwrap_err();
    assert!(
        matches!(
            err,
            ScrapeError::Cancelled {
                stage: ScrapeStage::RateWait
            }
        ),
        "got {err:?}"
    );
    assert_eq!(orch.sink().calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn cancellation_during_slow_fetch_is_never_success() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(WIDGET_PAGE)
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let orch = orchestrator(&server, 3, roomy_limiter());
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let err = orch.scrape("B000TEST01", &cancel).await.unwrap_err();
    assert!(matches!(
        err,
        ScrapeError::Cancelled {
            stage: ScrapeStage::Fetching
        }
    ));
    assert_eq!(orch.sink().calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn concurrent_scrapes_share_the_rate_budget() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string(WIDGET_PAGE))
        .expect(3)
        .mount(&server)
        .await;

    let interval = Duration::from_millis(50);
    let orch = Arc::new(orchestrator(&server, 1, TokenBucket::new(1, interval)));
    let started = tokio::time::Instant::now();

    let results = futures::future::join_all(["B000TEST01", "B000TEST02", "B000TEST03"].map(
        |asin| {
            let orch = Arc::clone(&orch);
            async move { orch.scrape(asin, &CancellationToken::new()).await }
        },
    ))
    .await;

    assert!(results.iter().all(Result::is_ok));
    assert!(started.elapsed() >= interval * 2);
    assert_eq!(orch.sink().inner.len().await, 3);
}
