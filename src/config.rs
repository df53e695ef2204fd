use anyhow::{ Context, Result };
use serde::{ Deserialize, Serialize };
use std::fs;
use std::path::Path;

use crate::global;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Wallet that receives everything a sweep moves.
    pub destination_wallet: String,
    /// Secret key for the local keypair provider (bs58 or JSON byte array).
    #[serde(default)]
    pub wallet_private: String,
    /// Keypair file watched by the keypair-file provider.
    #[serde(default = "default_wallet_file")]
    pub wallet_file: String,
    pub rpc_url: String,
    #[serde(default)]
    pub rpc_fallbacks: Vec<String>,
    #[serde(default)]
    pub sweep: SweepConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub verification: VerificationConfig,
    #[serde(default)]
    pub pricing: Option<PricingConfig>,
    #[serde(default)]
    pub notify: NotifyConfig,
    #[serde(default)]
    pub webserver: WebserverConfig,
}

/// Fee model and amount policy for assembled sweeps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepConfig {
    pub base_fee: u64,
    pub per_instruction_fee: u64,
    pub account_creation_fee: u64,
    pub transfer_fraction: f64,
    pub min_native_balance_lamports: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub retry_delay_secs: u64,
    pub confirm_timeout_secs: u64,
    pub confirm_poll_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    pub reset_delay_secs: u64,
    pub handoff_enabled: bool,
    pub handoff_poll_ms: u64,
    pub handoff_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationConfig {
    pub store_path: String,
    pub challenge_max_age_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingConfig {
    pub enabled: bool,
    pub cache_ttl_secs: u64,
    pub update_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct NotifyConfig {
    #[serde(default)]
    pub webhook_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebserverConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            base_fee: 5_000, // lamports
            per_instruction_fee: 5_000, // lamports
            account_creation_fee: 2_039_280, // rent for one new token account
            transfer_fraction: 0.98, // share of the free balance to move
            min_native_balance_lamports: 20_000_000, // 0.02 SOL
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 10, // extra signing attempts after the first
            retry_delay_secs: 2,
            confirm_timeout_secs: 60,
            confirm_poll_ms: 2000,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            reset_delay_secs: 3, // terminal state display time
            handoff_enabled: true,
            handoff_poll_ms: 1000,
            handoff_timeout_secs: 120,
        }
    }
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            store_path: global::VERIFIED_WALLETS_FILE.to_string(),
            challenge_max_age_secs: 600, // 10 minutes
        }
    }
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cache_ttl_secs: 1800, // 30 minutes
            update_interval_secs: 300, // 5 minutes
        }
    }
}

impl Default for WebserverConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            destination_wallet: String::new(),
            wallet_private: String::new(),
            wallet_file: default_wallet_file(),
            rpc_url: "https://api.mainnet-beta.solana.com".to_string(),
            rpc_fallbacks: vec![],
            sweep: SweepConfig::default(),
            retry: RetryConfig::default(),
            session: SessionConfig::default(),
            verification: VerificationConfig::default(),
            pricing: Some(PricingConfig::default()),
            notify: NotifyConfig::default(),
            webserver: WebserverConfig::default(),
        }
    }
}

fn default_wallet_file() -> String {
    global::WALLET_FILE.to_string()
}

impl Config {
    /// Load configuration from disk, writing the default template first when
    /// the file does not exist yet.
    pub fn load(path: &str) -> Result<Self> {
        if !Path::new(path).exists() {
            let default_config = Self::default();
            default_config.save(path)?;
            return Ok(default_config);
        }

        let content = fs
            ::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path))?;

        let config: Config = serde_json
            ::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path))?;

        config.validate()?;

        Ok(config)
    }

    pub fn save(&self, path: &str) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, json).with_context(|| format!("Failed to write config file: {}", path))?;
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.destination_wallet.trim().is_empty() {
            anyhow::bail!("destination_wallet must be set");
        }
        if self.rpc_url.trim().is_empty() {
            anyhow::bail!("rpc_url must be set");
        }
        if !(self.sweep.transfer_fraction > 0.0 && self.sweep.transfer_fraction <= 1.0) {
            anyhow::bail!(
                "sweep.transfer_fraction must be within (0, 1], got {}",
                self.sweep.transfer_fraction
            );
        }
        if self.retry.confirm_poll_ms == 0 {
            anyhow::bail!("retry.confirm_poll_ms must be positive");
        }
        Ok(())
    }
}
