/// Wallet ownership verification endpoint
///
/// Clients sign the challenge with the wallet's key; a valid signature adds
/// the wallet to the persistent verification store.

use axum::{
    extract::State,
    http::StatusCode,
    response::{ IntoResponse, Json, Response },
    routing::post,
    Router,
};
use serde::{ Deserialize, Serialize };
use solana_sdk::pubkey::Pubkey;
use std::str::FromStr;
use std::sync::Arc;

use crate::logger::{ log, LogTag };
use crate::verify::{ validate_challenge, verify_signature };
use crate::webserver::routes::error_response;
use crate::webserver::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyRequest {
    pub address: String,
    pub signature: String,
    pub message: String,
    #[serde(default)]
    pub wallet_type: String,
}

#[derive(Debug, Serialize)]
pub struct VerifyResponse {
    pub verified: bool,
}

/// Create verification routes
pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/verify-ownership", post(verify_ownership))
}

/// POST /verify-ownership
async fn verify_ownership(
    State(state): State<Arc<AppState>>,
    Json(request): Json<VerifyRequest>
) -> Response {
    let address = match Pubkey::from_str(&request.address) {
        Ok(key) => key,
        Err(_) => {
            return error_response(StatusCode::BAD_REQUEST, "invalid wallet address");
        }
    };

    let max_age = state.config.verification.challenge_max_age_secs;
    if let Err(e) = validate_challenge(&request.message, &address, max_age) {
        return error_response(StatusCode::BAD_REQUEST, e.to_string());
    }

    let wallet_type = if request.wallet_type.is_empty() {
        "unknown"
    } else {
        request.wallet_type.as_str()
    };

    match verify_signature(&address, &request.message, &request.signature) {
        Ok(true) => {
            state.store.record(&address);
            log(
                LogTag::Verify,
                "VERIFIED",
                &format!("Wallet {} proved ownership ({})", address, wallet_type)
            );
            Json(VerifyResponse { verified: true }).into_response()
        }
        Ok(false) => {
            log(
                LogTag::Verify,
                "INVALID",
                &format!("Signature check failed for {} ({})", address, wallet_type)
            );
            Json(VerifyResponse { verified: false }).into_response()
        }
        Err(e) => error_response(StatusCode::BAD_REQUEST, e.to_string()),
    }
}
