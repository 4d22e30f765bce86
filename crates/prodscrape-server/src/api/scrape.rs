//! `POST /api/v1/scrape`: scrape one product under the request deadline.

use axum::{
    extract::{rejection::JsonRejection, State},
    Extension, Json,
};
use prodscrape_core::StoredProduct;
use prodscrape_scraper::ScrapeErrorKind;
use serde::{Deserialize, Serialize};

use crate::middleware::RequestId;

use super::{ApiError, AppState, ResponseMeta};

#[derive(Debug, Deserialize)]
pub(super) struct ScrapeRequest {
    pub asin: String,
}

#[derive(Debug, Serialize)]
pub(super) struct ScrapeResponse {
    pub status: &'static str,
    pub record: StoredProduct,
    pub meta: ResponseMeta,
}

/// A body that is not `{"asin": "..."}` is reported as an invalid identifier.
///
/// The scrape runs under a child of the shutdown token. The deadline fires it,
/// and the drop guard fires it when the client goes away and axum drops this
/// future.
pub(super) async fn scrape_product(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    payload: Result<Json<ScrapeRequest>, JsonRejection>,
) -> Result<Json<ScrapeResponse>, ApiError> {
    let Json(request) = payload.map_err(|rejection| {
        ApiError::new(
            req_id.0.clone(),
            ScrapeErrorKind::InvalidIdentifier,
            rejection.body_text(),
        )
    })?;

    let cancel = state.shutdown.child_token();
    let _cancel_on_drop = cancel.clone().drop_guard();

    let scrape = state.orchestrator.scrape(&request.asin, &cancel);
    tokio::pin!(scrape);
    let result = tokio::select! {
        result = &mut scrape => result,
        () = tokio::time::sleep(state.scrape_deadline) => {
            tracing::warn!(
                asin = %request.asin,
                deadline_ms = u64::try_from(state.scrape_deadline.as_millis()).unwrap_or(u64::MAX),
                "scrape deadline elapsed, cancelling"
            );
            cancel.cancel();
            scrape.await
        }
    };

    match result {
        Ok(record) => Ok(Json(ScrapeResponse {
            status: "success",
            record,
            meta: ResponseMeta::new(req_id.0),
        })),
        Err(err) => Err(ApiError::from_scrape(req_id.0, &err)),
    }
}
