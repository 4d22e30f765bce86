mod api;
mod middleware;

use std::sync::Arc;

use prodscrape_core::{builtin_rulesets, load_rulesets, Environment};
use prodscrape_scraper::{
    FetcherConfig, HttpFetcher, InMemorySink, RetryPolicy, ScrapeOrchestrator, TokenBucket,
};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use crate::{
    api::{build_app, AppState},
    middleware::AuthState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = prodscrape_core::load_app_config()?;
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let rules = match &config.rules_path {
        Some(path) => load_rulesets(path)?,
        None => builtin_rulesets(),
    };
    let ruleset = rules
        .select(&config.ruleset, config.ruleset_version)?
        .clone();
    tracing::info!(
        ruleset = %ruleset.label(),
        rules_path = ?config.rules_path,
        "loaded extraction ruleset"
    );

    let fetcher = HttpFetcher::new(&FetcherConfig::new(
        config.request_timeout(),
        &config.user_agent,
    ))?;
    let orchestrator = ScrapeOrchestrator::new(
        ruleset,
        fetcher,
        RetryPolicy::new(config.max_attempts, config.retry_base_delay()),
        TokenBucket::new(config.rate_limit_capacity, config.rate_limit_refill()),
        InMemorySink::new(),
    )?;

    let auth = AuthState::from_config(
        &config.api_keys,
        matches!(config.env, Environment::Development),
    )?;
    let shutdown = CancellationToken::new();
    let state = AppState {
        orchestrator: Arc::new(orchestrator),
        scrape_deadline: config.scrape_deadline(),
        shutdown: shutdown.clone(),
    };
    let app = build_app(state, auth);

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, env = %config.env, "listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await?;
    Ok(())
}

/// Resolves on ctrl-c or SIGTERM and cancels in-flight scrapes so their
/// handlers answer `Cancelled` before the server drains.
async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to listen for ctrl-c");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("received shutdown signal, starting graceful shutdown");
    shutdown.cancel();
}
