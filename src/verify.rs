//! Ownership verification: challenge construction, ed25519 signature
//! checking, and the trust-on-first-use store of verified addresses.

use chrono::Utc;
use ed25519_dalek::{ Signature, VerifyingKey };
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use solana_sdk::pubkey::Pubkey;
use std::collections::{ HashMap, HashSet };
use std::fs;
use std::path::{ Path, PathBuf };

use crate::errors::{ SweepError, SweepResult };
use crate::logger::{ log, LogTag };
use crate::providers::ProviderError;
use crate::utils::truncate_address;

/// Challenge text the wallet signs. Binds the request to one address and a
/// millisecond timestamp so replays age out.
pub fn build_challenge(address: &Pubkey) -> String {
    format!(
        "Verify wallet ownership for security purposes.\nTimestamp: {}\nWallet: {}",
        Utc::now().timestamp_millis(),
        truncate_address(&address.to_string())
    )
}

/// Server-side shape check for a submitted challenge: it must reference the
/// claimed address and carry a timestamp inside the freshness window.
pub fn validate_challenge(message: &str, address: &Pubkey, max_age_secs: u64) -> SweepResult<()> {
    let truncated = truncate_address(&address.to_string());
    if !message.contains(&truncated) {
        return Err(
            SweepError::Verification(format!("challenge does not reference wallet {}", truncated))
        );
    }

    let timestamp = message
        .lines()
        .find_map(|line| line.strip_prefix("Timestamp: "))
        .and_then(|t| t.trim().parse::<i64>().ok())
        .ok_or_else(|| SweepError::Verification("challenge carries no timestamp".to_string()))?;

    let age_ms = Utc::now().timestamp_millis() - timestamp;
    // Small allowance for client clock skew.
    if age_ms < -5_000 || age_ms > (max_age_secs as i64) * 1000 {
        return Err(
            SweepError::Verification(
                format!("challenge timestamp outside freshness window ({}s)", max_age_secs)
            )
        );
    }

    Ok(())
}

/// Check an ed25519 signature over `message` against a wallet address.
pub fn verify_signature(
    address: &Pubkey,
    message: &str,
    signature_bs58: &str
) -> SweepResult<bool> {
    let signature_bytes = bs58
        ::decode(signature_bs58)
        .into_vec()
        .map_err(|e| SweepError::Verification(format!("signature is not base58: {}", e)))?;

    let signature = Signature::from_slice(&signature_bytes).map_err(|e|
        SweepError::Verification(format!("signature malformed: {}", e))
    )?;

    let key = VerifyingKey::from_bytes(&address.to_bytes()).map_err(|e|
        SweepError::Verification(format!("address is not a valid ed25519 key: {}", e))
    )?;

    Ok(key.verify_strict(message.as_bytes(), &signature).is_ok())
}

/// Persisted set of addresses that have proven ownership once.
///
/// Trust-on-first-use: addresses found here skip the signature prompt on
/// later connections, trading re-verification for fewer wallet prompts.
pub struct VerificationStore {
    path: PathBuf,
    verified: RwLock<HashSet<String>>,
}

impl VerificationStore {
    /// Load the store, starting empty when the file is missing or unreadable.
    pub fn load<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref().to_path_buf();
        let verified = match fs::read_to_string(&path) {
            Ok(content) =>
                match serde_json::from_str::<HashSet<String>>(&content) {
                    Ok(set) => set,
                    Err(e) => {
                        log(
                            LogTag::Verify,
                            "ERROR",
                            &format!("Failed to parse {}: {}", path.display(), e)
                        );
                        HashSet::new()
                    }
                }
            Err(_) => HashSet::new(),
        };

        Self { path, verified: RwLock::new(verified) }
    }

    pub fn is_verified(&self, address: &Pubkey) -> bool {
        self.verified.read().contains(&address.to_string())
    }

    /// Record a successful verification and persist the set.
    pub fn record(&self, address: &Pubkey) {
        self.verified.write().insert(address.to_string());
        self.save();
    }

    pub fn len(&self) -> usize {
        self.verified.read().len()
    }

    fn save(&self) {
        let mut entries: Vec<String> = self.verified.read().iter().cloned().collect();
        entries.sort();

        match serde_json::to_string_pretty(&entries) {
            Ok(json) => {
                if let Err(e) = fs::write(&self.path, json) {
                    log(
                        LogTag::Verify,
                        "ERROR",
                        &format!("Failed to write {}: {}", self.path.display(), e)
                    );
                }
            }
            Err(e) => {
                log(LogTag::Verify, "ERROR", &format!("Failed to serialize verified set: {}", e));
            }
        }
    }
}

/// Error markers that indicate an explicit user rejection for one provider
/// family. Heuristic; extended per provider without touching call sites.
pub struct RejectionMarkers {
    pub codes: &'static [i64],
    pub substrings: &'static [&'static str],
    pub names: &'static [&'static str],
}

pub const DEFAULT_MARKERS: RejectionMarkers = RejectionMarkers {
    codes: &[4001, -32003],
    substrings: &["User rejected", "rejected", "cancelled", "Transaction cancelled"],
    names: &["UserRejectedRequestError"],
};

static PROVIDER_MARKERS: Lazy<HashMap<&'static str, RejectionMarkers>> = Lazy::new(|| {
    let mut table = HashMap::new();
    table.insert("solflare", RejectionMarkers {
        codes: &[4001, -32003],
        substrings: &[
            "User rejected",
            "rejected",
            "cancelled",
            "Transaction cancelled",
            "Signing cancelled",
        ],
        names: &["UserRejectedRequestError"],
    });
    table
});

/// Classify a provider error as an explicit user rejection.
pub fn is_user_rejection(
    provider_id: &str,
    code: Option<i64>,
    name: Option<&str>,
    message: &str
) -> bool {
    let markers = PROVIDER_MARKERS.get(provider_id).unwrap_or(&DEFAULT_MARKERS);

    if let Some(code) = code {
        if markers.codes.contains(&code) {
            return true;
        }
    }
    if let Some(name) = name {
        if markers.names.contains(&name) {
            return true;
        }
    }
    markers.substrings.iter().any(|s| message.contains(s))
}

/// Map a structured provider error onto the sweep error taxonomy.
pub fn classify_provider_error(provider_id: &str, error: &ProviderError) -> SweepError {
    if is_user_rejection(provider_id, error.code, error.name.as_deref(), &error.message) {
        SweepError::UserRejected(error.message.clone())
    } else {
        SweepError::Signing(error.message.clone())
    }
}
