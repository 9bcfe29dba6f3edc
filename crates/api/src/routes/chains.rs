//! Chain information endpoints.
//!
//! Chain configuration is compiled into the binary, so these handlers never touch state.

use axum::extract::Path;
use axum::Json;

use ledgerlens_shared::chains::{self, ChainConfig, CHAINS};
use ledgerlens_shared::error::AppError;
use ledgerlens_shared::models::ChainResponse;

fn to_response(chain: &ChainConfig) -> ChainResponse {
    ChainResponse {
        key: chain.key,
        name: chain.name,
        native_symbols: chain.native_symbols.to_vec(),
    }
}

/// Returns all supported chains with their key, name and native asset symbols.
#[utoipa::path(
    get,
    path = "/v1/chains",
    tag = "Chains",
    summary = "List all supported chains",
    responses(
        (status = 200, description = "List of chains", body = Vec<ChainResponse>)
    )
)]
pub async fn list_chains() -> Json<Vec<ChainResponse>> {
    Json(CHAINS.iter().map(to_response).collect())
}

#[utoipa::path(
    get,
    path = "/v1/chains/{chain_key}",
    tag = "Chains",
    summary = "Get a chain by key",
    params(
        ("chain_key" = String, Path, description = "Short chain key (e.g. eth, sol, tron)")
    ),
    responses(
        (status = 200, description = "Chain details", body = ChainResponse),
        (status = 404, description = "Chain not found", body = ledgerlens_shared::models::ErrorBody)
    )
)]
pub async fn get_chain(Path(chain_key): Path<String>) -> Result<Json<ChainResponse>, AppError> {
    let chain = chains::chain_by_key(&chain_key).ok_or(AppError::ChainNotFound(chain_key))?;
    Ok(Json(to_response(chain)))
}
