use thiserror::Error;

/// Error taxonomy for the sweep pipeline. Callers branch on the variant to
/// decide between retrying, surfacing, and aborting.
#[derive(Error, Debug)]
pub enum SweepError {
    #[error("Provider unavailable: {0}")] ProviderUnavailable(String),

    #[error("User rejected the request: {0}")] UserRejected(String),

    #[error("RPC error: {0}")] Rpc(String),

    #[error("Invalid account: {0}")] AccountInvalid(String),

    #[error("Timed out after {seconds}s while {operation}")] Timeout {
        operation: String,
        seconds: u64,
    },

    #[error("Insufficient balance: {balance_sol} SOL, need at least {required_sol} SOL")] InsufficientBalance {
        balance_sol: f64,
        required_sol: f64,
    },

    #[error("Transaction failed: {0}")] TransactionFailed(String),

    #[error("Signing error: {0}")] Signing(String),

    #[error("Verification error: {0}")] Verification(String),

    #[error("Configuration error: {0}")] Config(String),

    #[error("Notification error: {0}")] Notification(String),

    #[error("Serialization error: {0}")] Serialization(#[from] serde_json::Error),

    #[error("Encoding error: {0}")] Encoding(#[from] bincode::Error),

    #[error("IO error: {0}")] Io(#[from] std::io::Error),

    #[error("Network error: {0}")] Network(#[from] reqwest::Error),
}

pub type SweepResult<T> = Result<T, SweepError>;
