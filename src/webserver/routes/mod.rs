use axum::{
    http::StatusCode,
    response::{ IntoResponse, Response },
    Json,
    Router,
};
use serde::Serialize;
use std::sync::Arc;

use crate::webserver::state::AppState;

pub mod notify;
pub mod status;
pub mod transaction;
pub mod verify;

/// Uniform error payload for every endpoint.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

pub fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(ErrorResponse { error: message.into() })).into_response()
}

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(status::routes())
        .merge(verify::routes())
        .merge(transaction::routes())
        .merge(notify::routes())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::errors::SweepResult;
    use crate::events::{ MemoryNotifier, Notifications };
    use crate::price::{ PriceCache, QuoteSource };
    use crate::rpc::{ ConfirmationStatus, LedgerRpc, TokenAccountInfo };
    use crate::verify::{ build_challenge, VerificationStore };
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use solana_sdk::hash::Hash;
    use solana_sdk::pubkey::Pubkey;
    use solana_sdk::signature::Keypair;
    use solana_sdk::signer::Signer;
    use tempfile::TempDir;
    use tower::ServiceExt;

    struct StaticQuote(f64);

    #[async_trait]
    impl QuoteSource for StaticQuote {
        async fn fetch_quote(&self) -> SweepResult<f64> {
            Ok(self.0)
        }
    }

    struct MockLedger {
        balance: u64,
    }

    #[async_trait]
    impl LedgerRpc for MockLedger {
        async fn get_balance(&self, _address: &Pubkey) -> SweepResult<u64> {
            Ok(self.balance)
        }

        async fn get_latest_blockhash(&self) -> SweepResult<Hash> {
            Ok(Hash::new_unique())
        }

        async fn get_minimum_balance_for_rent_exemption(
            &self,
            _data_len: usize
        ) -> SweepResult<u64> {
            Ok(890_880)
        }

        async fn get_token_accounts(
            &self,
            _owner: &Pubkey
        ) -> SweepResult<Vec<TokenAccountInfo>> {
            Ok(vec![])
        }

        async fn get_accounts_exist(&self, addresses: &[Pubkey]) -> SweepResult<Vec<bool>> {
            Ok(vec![true; addresses.len()])
        }

        async fn send_transaction(&self, _tx_bytes: &[u8]) -> SweepResult<String> {
            Ok("sig".to_string())
        }

        async fn get_signature_status(
            &self,
            _signature: &str
        ) -> SweepResult<ConfirmationStatus> {
            Ok(ConfirmationStatus::Confirmed)
        }
    }

    fn test_state(dir: &TempDir, memory: Arc<MemoryNotifier>) -> Arc<AppState> {
        let mut config = Config::default();
        config.destination_wallet = Pubkey::new_unique().to_string();

        let store = VerificationStore::load(dir.path().join("verified_wallets.json"));

        Arc::new(
            AppState::new(
                Arc::new(config),
                Arc::new(MockLedger { balance: 1_000_000_000 }),
                Arc::new(PriceCache::new(Arc::new(StaticQuote(100.0)), 60)),
                Arc::new(store),
                Arc::new(Notifications::new().with_sink(memory))
            )
        )
    }

    fn json_post(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_status_endpoint_responds() {
        let dir = TempDir::new().unwrap();
        let state = test_state(&dir, Arc::new(MemoryNotifier::new()));
        let app = create_router(state);

        let response = app
            .oneshot(Request::builder().uri("/status").body(Body::empty()).unwrap()).await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_verify_ownership_records_wallet() {
        let dir = TempDir::new().unwrap();
        let state = test_state(&dir, Arc::new(MemoryNotifier::new()));
        let keypair = Keypair::new();
        let address = keypair.pubkey();
        let message = build_challenge(&address);
        let signature = keypair.sign_message(message.as_bytes()).to_string();

        let app = create_router(state.clone());
        let response = app
            .oneshot(
                json_post(
                    "/verify-ownership",
                    serde_json::json!({
                        "address": address.to_string(),
                        "signature": signature,
                        "message": message,
                        "walletType": "phantom",
                    })
                )
            ).await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(state.store.is_verified(&address));
    }

    #[tokio::test]
    async fn test_verify_rejects_foreign_signature() {
        let dir = TempDir::new().unwrap();
        let state = test_state(&dir, Arc::new(MemoryNotifier::new()));
        let keypair = Keypair::new();
        let address = keypair.pubkey();
        let message = build_challenge(&address);
        // Signed by a different keypair than the claimed address.
        let signature = Keypair::new().sign_message(message.as_bytes()).to_string();

        let app = create_router(state.clone());
        let response = app
            .oneshot(
                json_post(
                    "/verify-ownership",
                    serde_json::json!({
                        "address": address.to_string(),
                        "signature": signature,
                        "message": message,
                    })
                )
            ).await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(!state.store.is_verified(&address));
    }

    #[tokio::test]
    async fn test_prepare_rejects_unverified_wallet() {
        let dir = TempDir::new().unwrap();
        let state = test_state(&dir, Arc::new(MemoryNotifier::new()));
        let app = create_router(state);

        // The client-supplied flag alone must not open the gate.
        let response = app
            .oneshot(
                json_post(
                    "/prepare-transaction",
                    serde_json::json!({
                        "publicKey": Pubkey::new_unique().to_string(),
                        "verified": true,
                    })
                )
            ).await
            .unwrap();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_prepare_builds_plan_for_verified_wallet() {
        let dir = TempDir::new().unwrap();
        let state = test_state(&dir, Arc::new(MemoryNotifier::new()));
        let owner = Pubkey::new_unique();
        state.store.record(&owner);

        let app = create_router(state);
        let response = app
            .oneshot(
                json_post(
                    "/prepare-transaction",
                    serde_json::json!({ "publicKey": owner.to_string() })
                )
            ).await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_notify_emits_client_note() {
        let dir = TempDir::new().unwrap();
        let memory = Arc::new(MemoryNotifier::new());
        let state = test_state(&dir, memory.clone());

        let app = create_router(state);
        let response = app
            .oneshot(
                json_post(
                    "/notify",
                    serde_json::json!({
                        "address": Pubkey::new_unique().to_string(),
                        "balance": 1.5,
                        "walletType": "solflare",
                        "splTokens": [{ "mint": "abc", "amount": 10.0 }],
                    })
                )
            ).await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(memory.count("CLIENT_NOTE"), 1);
    }
}
