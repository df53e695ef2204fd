//! Wallet capability providers.
//!
//! A provider is anything that can identify a wallet and sign for it. The
//! registry presents a uniform surface so connection and submission code
//! never branches on the concrete signer.

use async_trait::async_trait;
use serde::Serialize;
use solana_sdk::{ pubkey::Pubkey, signature::Keypair, signer::Signer, transaction::Transaction };
use std::fmt;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::Config;
use crate::errors::{ SweepError, SweepResult };

/// Error shape surfaced by providers. Carries the fields the rejection
/// classifier inspects: numeric code, error name, message text.
#[derive(Debug, Clone)]
pub struct ProviderError {
    pub code: Option<i64>,
    pub name: Option<String>,
    pub message: String,
}

impl ProviderError {
    pub fn message(message: impl Into<String>) -> Self {
        Self { code: None, name: None, message: message.into() }
    }
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "{} (code {})", self.message, code),
            None => write!(f, "{}", self.message),
        }
    }
}

pub type ProviderResult<T> = Result<T, ProviderError>;

/// Provider entry as shown by discovery.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderInfo {
    pub id: String,
    pub display_name: String,
    pub available: bool,
}

/// A wallet capability: identification, availability, connection, signing.
#[async_trait]
pub trait WalletProvider: Send + Sync {
    fn id(&self) -> &str;

    fn display_name(&self) -> &str;

    /// Whether the signing capability is present in this environment.
    async fn is_available(&self) -> bool;

    /// Establish the link and return the wallet's public key.
    async fn connect(&self) -> ProviderResult<Pubkey>;

    /// Sign an assembled transaction.
    async fn sign_transaction(&self, tx: Transaction) -> ProviderResult<Transaction>;

    /// Sign an arbitrary message (ownership challenges).
    async fn sign_message(&self, message: &[u8]) -> ProviderResult<Vec<u8>>;

    /// External step that can make an unavailable provider available, such
    /// as placing a key file. None when no such step exists.
    fn handoff_hint(&self) -> Option<String> {
        None
    }
}

/// Parse a secret key in bs58 or JSON-array form into a keypair.
pub fn parse_keypair(encoded: &str) -> SweepResult<Keypair> {
    let trimmed = encoded.trim();
    if trimmed.is_empty() {
        return Err(SweepError::Config("wallet secret key is empty".to_string()));
    }

    let bytes: Vec<u8> = if trimmed.starts_with('[') {
        serde_json::from_str(trimmed)?
    } else {
        bs58
            ::decode(trimmed)
            .into_vec()
            .map_err(|e| SweepError::Config(format!("wallet secret key is not base58: {}", e)))?
    };

    if bytes.len() != 64 {
        return Err(
            SweepError::Config(
                format!("wallet secret key must be 64 bytes, got {}", bytes.len())
            )
        );
    }

    Keypair::try_from(&bytes[..]).map_err(|e|
        SweepError::Config(format!("invalid wallet secret key: {}", e))
    )
}

fn sign_with_keypair(keypair: &Keypair, mut tx: Transaction) -> ProviderResult<Transaction> {
    let blockhash = tx.message.recent_blockhash;
    tx
        .try_sign(&[keypair], blockhash)
        .map_err(|e| ProviderError::message(format!("signing failed: {}", e)))?;
    Ok(tx)
}

/// Signs with key material from the configuration file.
pub struct KeypairProvider {
    keypair: Option<Keypair>,
}

impl KeypairProvider {
    pub fn from_config(config: &Config) -> Self {
        Self { keypair: parse_keypair(&config.wallet_private).ok() }
    }

    pub fn from_encoded(encoded: &str) -> SweepResult<Self> {
        Ok(Self { keypair: Some(parse_keypair(encoded)?) })
    }

    fn keypair(&self) -> ProviderResult<&Keypair> {
        self.keypair.as_ref().ok_or_else(|| ProviderError::message("no keypair configured"))
    }
}

#[async_trait]
impl WalletProvider for KeypairProvider {
    fn id(&self) -> &str {
        "keypair"
    }

    fn display_name(&self) -> &str {
        "Local Keypair"
    }

    async fn is_available(&self) -> bool {
        self.keypair.is_some()
    }

    async fn connect(&self) -> ProviderResult<Pubkey> {
        Ok(self.keypair()?.pubkey())
    }

    async fn sign_transaction(&self, tx: Transaction) -> ProviderResult<Transaction> {
        sign_with_keypair(self.keypair()?, tx)
    }

    async fn sign_message(&self, message: &[u8]) -> ProviderResult<Vec<u8>> {
        Ok(self.keypair()?.sign_message(message).as_ref().to_vec())
    }
}

/// Reads a keypair file placed by the operator. Availability tracks the file
/// system, so a connect can wait for the file to appear.
pub struct KeypairFileProvider {
    path: PathBuf,
}

impl KeypairFileProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn read_keypair(&self) -> ProviderResult<Keypair> {
        let content = fs
            ::read_to_string(&self.path)
            .map_err(|e| ProviderError::message(format!("cannot read {}: {}", self.path.display(), e)))?;
        parse_keypair(&content).map_err(|e| ProviderError::message(e.to_string()))
    }
}

#[async_trait]
impl WalletProvider for KeypairFileProvider {
    fn id(&self) -> &str {
        "keypair-file"
    }

    fn display_name(&self) -> &str {
        "Keypair File"
    }

    async fn is_available(&self) -> bool {
        self.path.exists() && self.read_keypair().is_ok()
    }

    async fn connect(&self) -> ProviderResult<Pubkey> {
        Ok(self.read_keypair()?.pubkey())
    }

    async fn sign_transaction(&self, tx: Transaction) -> ProviderResult<Transaction> {
        sign_with_keypair(&self.read_keypair()?, tx)
    }

    async fn sign_message(&self, message: &[u8]) -> ProviderResult<Vec<u8>> {
        Ok(self.read_keypair()?.sign_message(message).as_ref().to_vec())
    }

    fn handoff_hint(&self) -> Option<String> {
        Some(format!("place a wallet keypair file at {}", self.path.display()))
    }
}

/// Registry of wallet capability providers.
pub struct ProviderRegistry {
    providers: Vec<Arc<dyn WalletProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self { providers: Vec::new() }
    }

    /// Register a provider. Last registration wins for a duplicate id.
    pub fn register(&mut self, provider: Arc<dyn WalletProvider>) {
        self.providers.retain(|p| p.id() != provider.id());
        self.providers.push(provider);
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn WalletProvider>> {
        self.providers
            .iter()
            .find(|p| p.id() == id)
            .cloned()
    }

    /// Availability view over every registered provider.
    pub async fn discover(&self) -> Vec<ProviderInfo> {
        let mut infos = Vec::with_capacity(self.providers.len());
        for provider in &self.providers {
            infos.push(ProviderInfo {
                id: provider.id().to_string(),
                display_name: provider.display_name().to_string(),
                available: provider.is_available().await,
            });
        }
        infos
    }

    /// Registry with the providers this build ships.
    pub fn from_config(config: &Config) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(KeypairProvider::from_config(config)));
        registry.register(Arc::new(KeypairFileProvider::new(&config.wallet_file)));
        registry
    }
}
