//! Wallet history endpoint.
//!
//! Thin HTTP wrapper over [`HistoryRequestOrchestrator::load_history`]. The caller is identified
//! by the `x-user-id` header for request quotas; requests without it share one anonymous quota.

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::Deserialize;

use ledgerlens_shared::error::AppError;
use ledgerlens_shared::models::{DirectionFilter, HistoryResponseBody, KindFilter};

use crate::orchestrator::{Freshness, HistoryRequest, DEFAULT_PAGE_LIMIT};
use crate::state::AppState;

const USER_HEADER: &str = "x-user-id";
const ANONYMOUS_USER: &str = "anonymous";

#[derive(Deserialize)]
pub struct HistoryPath {
    chain_key: String,
    address: String,
}

#[derive(Deserialize)]
pub struct HistoryQuery {
    #[serde(default)]
    limit: Option<usize>,
    #[serde(default)]
    offset: Option<usize>,
    #[serde(default)]
    kind: Option<String>,
    #[serde(default)]
    direction: Option<String>,
}

fn parse_kind(raw: Option<&str>) -> Result<KindFilter, AppError> {
    match raw.map(str::to_ascii_lowercase).as_deref() {
        None | Some("all") => Ok(KindFilter::All),
        Some("native") => Ok(KindFilter::Native),
        Some("token") => Ok(KindFilter::Token),
        Some(other) => Err(AppError::InvalidQuery(format!(
            "kind must be one of all, native, token (got {other})"
        ))),
    }
}

fn parse_direction(raw: Option<&str>) -> Result<DirectionFilter, AppError> {
    match raw.map(str::to_ascii_lowercase).as_deref() {
        None | Some("all") => Ok(DirectionFilter::All),
        Some("in") => Ok(DirectionFilter::In),
        Some("out") => Ok(DirectionFilter::Out),
        Some(other) => Err(AppError::InvalidQuery(format!(
            "direction must be one of all, in, out (got {other})"
        ))),
    }
}

fn user_from_headers(headers: &HeaderMap) -> String {
    headers
        .get(USER_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or(ANONYMOUS_USER)
        .to_string()
}

/// Returns recent wallet activity, newest first.
///
/// Answers come from the local event store, the hot cache, the request cache or a live
/// explorer call, in that order. When the explorer is rate limited or times out, an aged
/// cached page may be returned with `stale: true`.
#[utoipa::path(
    get,
    path = "/v1/chains/{chain_key}/wallets/{address}/history",
    tag = "History",
    summary = "Get wallet transaction history",
    params(
        ("chain_key" = String, Path, description = "Short chain key (e.g. eth)"),
        ("address" = String, Path, description = "Wallet address"),
        ("limit" = Option<usize>, Query, description = "Page size, 1 to 100 (default 10)"),
        ("offset" = Option<usize>, Query, description = "Items to skip (default 0)"),
        ("kind" = Option<String>, Query, description = "all, native or token"),
        ("direction" = Option<String>, Query, description = "all, in or out"),
        ("x-user-id" = Option<String>, Header, description = "Caller identity for request quotas")
    ),
    responses(
        (status = 200, description = "History page", body = HistoryResponseBody),
        (status = 400, description = "Invalid query", body = ledgerlens_shared::models::ErrorBody),
        (status = 404, description = "Chain not found", body = ledgerlens_shared::models::ErrorBody),
        (status = 429, description = "Request quota exceeded", body = ledgerlens_shared::models::ErrorBody),
        (status = 502, description = "Upstream explorer failed", body = ledgerlens_shared::models::ErrorBody),
        (status = 504, description = "Upstream explorer timed out", body = ledgerlens_shared::models::ErrorBody)
    )
)]
pub async fn wallet_history(
    State(state): State<AppState>,
    Path(path): Path<HistoryPath>,
    Query(query): Query<HistoryQuery>,
    headers: HeaderMap,
) -> Result<Json<HistoryResponseBody>, AppError> {
    let request = HistoryRequest {
        user: user_from_headers(&headers),
        chain_key: path.chain_key,
        address: path.address,
        limit: query.limit.unwrap_or(DEFAULT_PAGE_LIMIT),
        offset: query.offset.unwrap_or(0),
        kind: parse_kind(query.kind.as_deref())?,
        direction: parse_direction(query.direction.as_deref())?,
    };

    let response = state.orchestrator.load_history(&request).await?;

    Ok(Json(HistoryResponseBody {
        items: response.page.items,
        next_offset: response.page.next_offset,
        stale: response.freshness == Freshness::Stale,
    }))
}
