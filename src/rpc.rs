/// Centralized ledger RPC access
///
/// One trait covers every ledger query and mutation the sweep pipeline needs,
/// with an HTTP JSON-RPC implementation that rotates through fallback
/// endpoints on rate limits and network errors.

use async_trait::async_trait;
use base64::{ engine::general_purpose, Engine as _ };
use serde_json::{ json, Value };
use solana_sdk::{ hash::Hash, pubkey::Pubkey };
use std::str::FromStr;
use std::time::Duration;

use crate::errors::{ SweepError, SweepResult };
use crate::logger::{ debug, log, LogTag };

pub const LAMPORTS_PER_SOL: u64 = 1_000_000_000;

pub const TOKEN_PROGRAM_ID: &str = "TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA";
pub const TOKEN_2022_PROGRAM_ID: &str = "TokenzQdBNbLqP5VEhdkAS6EPFLC1PHnBqCXEpPxuEb";

/// Converts lamports to SOL amount
pub fn lamports_to_sol(lamports: u64) -> f64 {
    (lamports as f64) / (LAMPORTS_PER_SOL as f64)
}

/// Converts SOL amount to lamports (1 SOL = 1,000,000,000 lamports)
pub fn sol_to_lamports(sol_amount: f64) -> u64 {
    (sol_amount * (LAMPORTS_PER_SOL as f64)) as u64
}

/// One token account owned by the swept wallet.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenAccountInfo {
    pub account: Pubkey,
    pub mint: Pubkey,
    pub amount: u64,
    pub decimals: u8,
    pub is_token_2022: bool,
}

/// Confirmation state of a broadcast transaction.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfirmationStatus {
    Pending,
    Confirmed,
    Failed(String),
}

/// Ledger queries and submission used by the sweep pipeline. Implemented over
/// HTTP for production and mocked in tests.
#[async_trait]
pub trait LedgerRpc: Send + Sync {
    async fn get_balance(&self, address: &Pubkey) -> SweepResult<u64>;

    async fn get_latest_blockhash(&self) -> SweepResult<Hash>;

    async fn get_minimum_balance_for_rent_exemption(&self, data_len: usize) -> SweepResult<u64>;

    /// All token accounts owned by `owner`, across both token programs.
    async fn get_token_accounts(&self, owner: &Pubkey) -> SweepResult<Vec<TokenAccountInfo>>;

    /// Existence flags for `addresses`, in request order.
    async fn get_accounts_exist(&self, addresses: &[Pubkey]) -> SweepResult<Vec<bool>>;

    /// Broadcast a serialized signed transaction, returning its signature.
    async fn send_transaction(&self, tx_bytes: &[u8]) -> SweepResult<String>;

    async fn get_signature_status(&self, signature: &str) -> SweepResult<ConfirmationStatus>;
}

/// JSON-RPC client with a primary endpoint and ordered fallbacks.
pub struct HttpLedgerRpc {
    client: reqwest::Client,
    rpc_url: String,
    rpc_fallbacks: Vec<String>,
}

impl HttpLedgerRpc {
    pub fn new(rpc_url: &str, rpc_fallbacks: &[String]) -> Self {
        let client = reqwest::Client
            ::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            rpc_url: rpc_url.to_string(),
            rpc_fallbacks: rpc_fallbacks.to_vec(),
        }
    }

    pub fn from_config(config: &crate::config::Config) -> Self {
        Self::new(&config.rpc_url, &config.rpc_fallbacks)
    }

    fn endpoints(&self) -> impl Iterator<Item = &str> {
        std::iter
            ::once(self.rpc_url.as_str())
            .chain(self.rpc_fallbacks.iter().map(|s| s.as_str()))
    }

    /// POST a JSON-RPC request. Rate limits and network errors rotate to the
    /// next endpoint; a JSON-RPC error object is returned to the caller as-is
    /// since every endpoint would answer the same way.
    async fn rpc_call(&self, method: &str, params: Value) -> SweepResult<Value> {
        let payload = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });

        let mut last_error: Option<SweepError> = None;

        for url in self.endpoints() {
            let response = match self.client.post(url).json(&payload).send().await {
                Ok(response) => response,
                Err(e) => {
                    debug(LogTag::Rpc, "NETWORK", &format!("{} failed on {}: {}", method, url, e));
                    last_error = Some(SweepError::Network(e));
                    continue;
                }
            };

            if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
                log(
                    LogTag::Rpc,
                    "RATE_LIMIT",
                    &format!("{} rate limited on {}, rotating endpoint", method, url)
                );
                last_error = Some(SweepError::Rpc(format!("{} rate limited", url)));
                continue;
            }

            let body: Value = match response.json().await {
                Ok(body) => body,
                Err(e) => {
                    debug(LogTag::Rpc, "PARSE", &format!("{} returned non-JSON on {}: {}", method, url, e));
                    last_error = Some(SweepError::Network(e));
                    continue;
                }
            };

            if let Some(error) = body.get("error") {
                let message = error
                    .get("message")
                    .and_then(|m| m.as_str())
                    .unwrap_or("unknown RPC error");
                return Err(SweepError::Rpc(format!("{}: {}", method, message)));
            }

            return body
                .get("result")
                .cloned()
                .ok_or_else(|| SweepError::Rpc(format!("{}: missing result field", method)));
        }

        Err(last_error.unwrap_or_else(|| SweepError::Rpc("no RPC endpoints configured".to_string())))
    }
}

#[async_trait]
impl LedgerRpc for HttpLedgerRpc {
    async fn get_balance(&self, address: &Pubkey) -> SweepResult<u64> {
        let result = self.rpc_call(
            "getBalance",
            json!([address.to_string(), { "commitment": "confirmed" }])
        ).await?;

        result
            .get("value")
            .and_then(|v| v.as_u64())
            .ok_or_else(|| SweepError::Rpc("getBalance: malformed response".to_string()))
    }

    async fn get_latest_blockhash(&self) -> SweepResult<Hash> {
        let result = self.rpc_call(
            "getLatestBlockhash",
            json!([{ "commitment": "finalized" }])
        ).await?;

        let blockhash = result
            .pointer("/value/blockhash")
            .and_then(|v| v.as_str())
            .ok_or_else(|| SweepError::Rpc("getLatestBlockhash: malformed response".to_string()))?;

        Hash::from_str(blockhash).map_err(|e|
            SweepError::Rpc(format!("invalid blockhash {}: {}", blockhash, e))
        )
    }

    async fn get_minimum_balance_for_rent_exemption(&self, data_len: usize) -> SweepResult<u64> {
        // The blocking solana_client call runs on the blocking pool.
        let url = self.rpc_url.clone();
        tokio::task
            ::spawn_blocking(move || {
                let client = solana_client::rpc_client::RpcClient::new(url);
                client
                    .get_minimum_balance_for_rent_exemption(data_len)
                    .map_err(|e| SweepError::Rpc(format!("getMinimumBalanceForRentExemption: {}", e)))
            }).await
            .map_err(|e| SweepError::Rpc(format!("rent exemption task failed: {}", e)))?
    }

    async fn get_token_accounts(&self, owner: &Pubkey) -> SweepResult<Vec<TokenAccountInfo>> {
        let mut accounts = Vec::new();

        for (program_id, is_token_2022) in [
            (TOKEN_PROGRAM_ID, false),
            (TOKEN_2022_PROGRAM_ID, true),
        ] {
            let result = self.rpc_call(
                "getTokenAccountsByOwner",
                json!([
                    owner.to_string(),
                    { "programId": program_id },
                    { "encoding": "jsonParsed", "commitment": "confirmed" }
                ])
            ).await?;

            if let Some(entries) = result.get("value").and_then(|v| v.as_array()) {
                for entry in entries {
                    match parse_token_account(entry, is_token_2022) {
                        Some(info) => accounts.push(info),
                        None =>
                            debug(
                                LogTag::Rpc,
                                "PARSE",
                                &format!("Skipping malformed token account entry: {}", entry)
                            ),
                    }
                }
            }
        }

        debug(
            LogTag::Rpc,
            "TOKEN_ACCOUNTS",
            &format!("Fetched {} token accounts for {}", accounts.len(), owner)
        );
        Ok(accounts)
    }

    async fn get_accounts_exist(&self, addresses: &[Pubkey]) -> SweepResult<Vec<bool>> {
        if addresses.is_empty() {
            return Ok(Vec::new());
        }

        let mut exists = Vec::with_capacity(addresses.len());

        // getMultipleAccounts caps at 100 keys per request.
        for chunk in addresses.chunks(100) {
            let keys: Vec<String> = chunk
                .iter()
                .map(|a| a.to_string())
                .collect();

            let result = self.rpc_call(
                "getMultipleAccounts",
                json!([keys, { "encoding": "base64", "commitment": "confirmed" }])
            ).await?;

            let values = result
                .get("value")
                .and_then(|v| v.as_array())
                .ok_or_else(|| SweepError::Rpc("getMultipleAccounts: malformed response".to_string()))?;

            for value in values {
                exists.push(!value.is_null());
            }
        }

        Ok(exists)
    }

    async fn send_transaction(&self, tx_bytes: &[u8]) -> SweepResult<String> {
        let encoded = general_purpose::STANDARD.encode(tx_bytes);

        let result = self.rpc_call(
            "sendTransaction",
            json!([
                encoded,
                {
                    "encoding": "base64",
                    "skipPreflight": false,
                    "preflightCommitment": "processed",
                    "maxRetries": 3
                }
            ])
        ).await?;

        result
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| SweepError::Rpc("sendTransaction: malformed response".to_string()))
    }

    async fn get_signature_status(&self, signature: &str) -> SweepResult<ConfirmationStatus> {
        let result = self.rpc_call(
            "getSignatureStatuses",
            json!([[signature], { "searchTransactionHistory": true }])
        ).await?;

        Ok(parse_signature_status(&result))
    }
}

fn parse_token_account(entry: &Value, is_token_2022: bool) -> Option<TokenAccountInfo> {
    let account = entry.get("pubkey")?.as_str()?;
    let info = entry.pointer("/account/data/parsed/info")?;
    let mint = info.get("mint")?.as_str()?;
    let amount = info
        .pointer("/tokenAmount/amount")?
        .as_str()?
        .parse::<u64>()
        .ok()?;
    let decimals = info.pointer("/tokenAmount/decimals")?.as_u64()? as u8;

    Some(TokenAccountInfo {
        account: Pubkey::from_str(account).ok()?,
        mint: Pubkey::from_str(mint).ok()?,
        amount,
        decimals,
        is_token_2022,
    })
}

fn parse_signature_status(result: &Value) -> ConfirmationStatus {
    let status = match result.pointer("/value/0") {
        Some(v) if !v.is_null() => v,
        _ => {
            return ConfirmationStatus::Pending;
        }
    };

    if let Some(err) = status.get("err") {
        if !err.is_null() {
            return ConfirmationStatus::Failed(err.to_string());
        }
    }

    match status.get("confirmationStatus").and_then(|v| v.as_str()) {
        Some("confirmed") | Some("finalized") => ConfirmationStatus::Confirmed,
        _ => ConfirmationStatus::Pending,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lamports_conversions() {
        assert_eq!(lamports_to_sol(1_000_000_000), 1.0);
        assert_eq!(lamports_to_sol(500_000_000), 0.5);
        assert_eq!(sol_to_lamports(0.02), 20_000_000);
        assert_eq!(sol_to_lamports(1.5), 1_500_000_000);
    }

    #[test]
    fn test_parse_token_account() {
        let entry = json!({
            "pubkey": "4Nd1mBQtrMJVYVfKf2PJy9NZUZdTAsp7D4xWLs4gDB4T",
            "account": {
                "data": {
                    "parsed": {
                        "info": {
                            "mint": "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v",
                            "tokenAmount": {
                                "amount": "2500000",
                                "decimals": 6
                            }
                        }
                    }
                }
            }
        });

        let info = parse_token_account(&entry, false).unwrap();
        assert_eq!(info.amount, 2_500_000);
        assert_eq!(info.decimals, 6);
        assert!(!info.is_token_2022);
        assert_eq!(
            info.mint.to_string(),
            "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v"
        );
    }

    #[test]
    fn test_parse_token_account_rejects_malformed() {
        let entry = json!({ "pubkey": "not-a-key" });
        assert!(parse_token_account(&entry, false).is_none());
    }

    #[test]
    fn test_parse_signature_status_pending_when_unknown() {
        let result = json!({ "value": [null] });
        assert_eq!(parse_signature_status(&result), ConfirmationStatus::Pending);
    }

    #[test]
    fn test_parse_signature_status_confirmed() {
        let result = json!({
            "value": [{ "err": null, "confirmationStatus": "finalized" }]
        });
        assert_eq!(parse_signature_status(&result), ConfirmationStatus::Confirmed);

        let processed = json!({
            "value": [{ "err": null, "confirmationStatus": "processed" }]
        });
        assert_eq!(parse_signature_status(&processed), ConfirmationStatus::Pending);
    }

    #[test]
    fn test_parse_signature_status_failed() {
        let result = json!({
            "value": [{ "err": { "InstructionError": [0, "Custom"] }, "confirmationStatus": "confirmed" }]
        });
        match parse_signature_status(&result) {
            ConfirmationStatus::Failed(detail) => assert!(detail.contains("InstructionError")),
            other => panic!("expected failure, got {:?}", other),
        }
    }
}
