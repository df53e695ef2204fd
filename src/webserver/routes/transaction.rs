/// Sweep preparation endpoints
///
/// Assembles unsigned sweep transactions for verified wallets and exposes a
/// blockhash passthrough for clients that sign on their side.

use axum::{
    extract::State,
    http::StatusCode,
    response::{ IntoResponse, Json, Response },
    routing::{ get, post },
    Router,
};
use serde::{ Deserialize, Serialize };
use solana_sdk::pubkey::Pubkey;
use std::str::FromStr;
use std::sync::Arc;

use crate::errors::SweepError;
use crate::logger::{ debug, log, LogTag };
use crate::rpc::lamports_to_sol;
use crate::sweep::{ prepare_sweep, TokenTransfer };
use crate::webserver::routes::error_response;
use crate::webserver::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrepareRequest {
    pub public_key: String,
    #[serde(default)]
    pub verified: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrepareResponse {
    pub transaction: Vec<u8>,
    pub transfer_amount: u64,
    pub token_transfers: Vec<TokenTransfer>,
}

#[derive(Debug, Serialize)]
pub struct BlockhashResponse {
    pub blockhash: String,
}

/// Create transaction routes
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/prepare-transaction", post(prepare_transaction))
        .route("/blockhash", get(latest_blockhash))
}

/// POST /prepare-transaction
async fn prepare_transaction(
    State(state): State<Arc<AppState>>,
    Json(request): Json<PrepareRequest>
) -> Response {
    let owner = match Pubkey::from_str(&request.public_key) {
        Ok(key) => key,
        Err(_) => {
            return error_response(StatusCode::BAD_REQUEST, "invalid public key");
        }
    };

    // The client's own claim is advisory; the persisted store decides.
    if !state.store.is_verified(&owner) {
        debug(
            LogTag::Webserver,
            "UNVERIFIED",
            &format!("Prepare refused for {} (client claimed verified={})", owner, request.verified)
        );
        return error_response(StatusCode::FORBIDDEN, "wallet ownership not verified");
    }

    let destination = match Pubkey::from_str(&state.config.destination_wallet) {
        Ok(key) => key,
        Err(_) => {
            log(LogTag::Webserver, "ERROR", "destination_wallet is not a valid address");
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "destination wallet misconfigured"
            );
        }
    };

    match prepare_sweep(state.rpc.as_ref(), &owner, &destination, &state.config.sweep).await {
        Ok(plan) => {
            log(
                LogTag::Webserver,
                "PREPARED",
                &format!(
                    "Sweep for {}: {:.6} SOL and {} token transfers",
                    owner,
                    lamports_to_sol(plan.transfer_amount),
                    plan.token_transfers.len()
                )
            );
            Json(PrepareResponse {
                transaction: plan.transaction,
                transfer_amount: plan.transfer_amount,
                token_transfers: plan.token_transfers,
            }).into_response()
        }
        Err(e @ SweepError::InsufficientBalance { .. }) => {
            error_response(StatusCode::BAD_REQUEST, e.to_string())
        }
        Err(SweepError::AccountInvalid(message)) => {
            error_response(StatusCode::BAD_REQUEST, message)
        }
        Err(e) => {
            log(LogTag::Webserver, "ERROR", &format!("Prepare failed for {}: {}", owner, e));
            error_response(StatusCode::BAD_GATEWAY, e.to_string())
        }
    }
}

/// GET /blockhash
async fn latest_blockhash(State(state): State<Arc<AppState>>) -> Response {
    match state.rpc.get_latest_blockhash().await {
        Ok(blockhash) => Json(BlockhashResponse { blockhash: blockhash.to_string() }).into_response(),
        Err(e) => error_response(StatusCode::BAD_GATEWAY, e.to_string()),
    }
}
