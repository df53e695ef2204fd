use chrono::{ DateTime, Utc };
use solana_sdk::pubkey::Pubkey;

use crate::errors::SweepResult;
use crate::logger::{ log, LogTag };
use crate::rpc::{ lamports_to_sol, LedgerRpc, TokenAccountInfo };
use crate::utils::truncate_address;

/// Point-in-time view of a wallet's holdings. Fetched fresh for every
/// connection and never persisted.
#[derive(Debug, Clone)]
pub struct AccountSnapshot {
    pub address: Pubkey,
    pub lamports: u64,
    pub holdings: Vec<TokenAccountInfo>,
    pub fetched_at: DateTime<Utc>,
}

impl AccountSnapshot {
    pub fn sol_balance(&self) -> f64 {
        lamports_to_sol(self.lamports)
    }

    /// Holdings with a positive balance, the only ones a sweep moves.
    pub fn positive_holdings(&self) -> impl Iterator<Item = &TokenAccountInfo> {
        self.holdings.iter().filter(|h| h.amount > 0)
    }
}

/// Query native balance and token accounts for `address`.
pub async fn fetch_account_snapshot(
    rpc: &dyn LedgerRpc,
    address: &Pubkey
) -> SweepResult<AccountSnapshot> {
    let lamports = rpc.get_balance(address).await?;
    let holdings = rpc.get_token_accounts(address).await?;

    log(
        LogTag::Wallet,
        "SNAPSHOT",
        &format!(
            "{} holds {:.9} SOL and {} token accounts ({} with balance)",
            truncate_address(&address.to_string()),
            lamports_to_sol(lamports),
            holdings.len(),
            holdings.iter().filter(|h| h.amount > 0).count()
        )
    );

    Ok(AccountSnapshot {
        address: *address,
        lamports,
        holdings,
        fetched_at: Utc::now(),
    })
}
