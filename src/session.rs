//! Connection session state machine.
//!
//! One session lives from provider selection to a terminal state. The
//! connector drives it: resolve the provider, wait out a handoff if the
//! capability is not present yet, connect, then verify ownership.

use chrono::{ DateTime, Utc };
use solana_sdk::pubkey::Pubkey;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::config::SessionConfig;
use crate::errors::{ SweepError, SweepResult };
use crate::events::{ Notifications, SweepEvent };
use crate::global::SHUTDOWN;
use crate::logger::{ log, LogTag };
use crate::providers::{ ProviderRegistry, WalletProvider };
use crate::submit::SubmissionAttempt;
use crate::utils::delay_with_shutdown;
use crate::verify::{ build_challenge, classify_provider_error, is_user_rejection, verify_signature, VerificationStore };

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Idle,
    Connecting,
    Connected,
    Verifying,
    Verified,
    Failed,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SessionStatus::Idle => "idle",
            SessionStatus::Connecting => "connecting",
            SessionStatus::Connected => "connected",
            SessionStatus::Verifying => "verifying",
            SessionStatus::Verified => "verified",
            SessionStatus::Failed => "failed",
        };
        write!(f, "{}", label)
    }
}

/// One wallet-linkage attempt and everything recorded against it.
#[derive(Debug, Clone)]
pub struct ConnectionSession {
    pub id: Uuid,
    pub provider_id: String,
    pub public_key: Option<Pubkey>,
    pub status: SessionStatus,
    pub verified: bool,
    pub created_at: DateTime<Utc>,
    pub attempts: Vec<SubmissionAttempt>,
}

impl ConnectionSession {
    pub(crate) fn new(provider_id: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            provider_id: provider_id.to_string(),
            public_key: None,
            status: SessionStatus::Connecting,
            verified: false,
            created_at: Utc::now(),
            attempts: Vec::new(),
        }
    }
}

/// Drives connection sessions over the provider registry. At most one
/// session is active at a time.
pub struct Connector {
    registry: ProviderRegistry,
    store: Arc<VerificationStore>,
    notifications: Arc<Notifications>,
    config: SessionConfig,
    current: Option<ConnectionSession>,
}

impl Connector {
    pub fn new(
        registry: ProviderRegistry,
        store: Arc<VerificationStore>,
        notifications: Arc<Notifications>,
        config: SessionConfig
    ) -> Self {
        Self { registry, store, notifications, config, current: None }
    }

    pub fn session(&self) -> Option<&ConnectionSession> {
        self.current.as_ref()
    }

    pub fn session_mut(&mut self) -> Option<&mut ConnectionSession> {
        self.current.as_mut()
    }

    pub fn provider(&self, id: &str) -> Option<Arc<dyn WalletProvider>> {
        self.registry.get(id)
    }

    /// Connect a provider, replacing any previous session. Emits exactly one
    /// connect event whether the attempt succeeds or fails.
    pub async fn connect(&mut self, provider_id: &str) -> SweepResult<Pubkey> {
        self.current = None;
        let mut session = ConnectionSession::new(provider_id);
        log(
            LogTag::Session,
            "CONNECT",
            &format!("Session {} connecting via {}", session.id, provider_id)
        );

        let outcome = match self.registry.get(provider_id) {
            Some(provider) => self.establish(provider).await,
            None => Err(SweepError::ProviderUnavailable(format!("unknown provider '{}'", provider_id))),
        };

        match outcome {
            Ok(address) => {
                session.public_key = Some(address);
                session.status = SessionStatus::Connected;
                self.notifications.emit(SweepEvent::ConnectAttempt {
                    provider_id: provider_id.to_string(),
                    address: Some(address.to_string()),
                    success: true,
                    detail: None,
                }).await;
                self.current = Some(session);
                Ok(address)
            }
            Err(e) => {
                session.status = SessionStatus::Failed;
                self.notifications.emit(SweepEvent::ConnectAttempt {
                    provider_id: provider_id.to_string(),
                    address: None,
                    success: false,
                    detail: Some(e.to_string()),
                }).await;
                log(LogTag::Session, "FAILED", &format!("Connect via {} failed: {}", provider_id, e));
                self.current = Some(session);
                Err(e)
            }
        }
    }

    async fn establish(&self, provider: Arc<dyn WalletProvider>) -> SweepResult<Pubkey> {
        if !provider.is_available().await {
            let hint = provider.handoff_hint();
            if !self.config.handoff_enabled || hint.is_none() {
                return Err(
                    SweepError::ProviderUnavailable(
                        format!("{} is not available", provider.display_name())
                    )
                );
            }

            if let Some(hint) = hint {
                log(
                    LogTag::Session,
                    "HANDOFF",
                    &format!("{} unavailable; {}", provider.display_name(), hint)
                );
            }
            self.wait_for_availability(provider.as_ref()).await?;
        }

        provider.connect().await.map_err(|e| {
            if is_user_rejection(provider.id(), e.code, e.name.as_deref(), &e.message) {
                SweepError::UserRejected(e.message.clone())
            } else {
                SweepError::ProviderUnavailable(e.message.clone())
            }
        })
    }

    /// Poll until the capability appears, bounded by the configured ceiling.
    async fn wait_for_availability(&self, provider: &dyn WalletProvider) -> SweepResult<()> {
        let poll = Duration::from_millis(self.config.handoff_poll_ms);
        let deadline =
            tokio::time::Instant::now() + Duration::from_secs(self.config.handoff_timeout_secs);

        while tokio::time::Instant::now() < deadline {
            delay_with_shutdown(&SHUTDOWN, poll).await;
            if crate::global::is_shutting_down() {
                break;
            }
            if provider.is_available().await {
                log(
                    LogTag::Session,
                    "HANDOFF_DONE",
                    &format!("{} became available, resuming connect", provider.display_name())
                );
                return Ok(());
            }
        }

        Err(SweepError::Timeout {
            operation: format!("waiting for {}", provider.display_name()),
            seconds: self.config.handoff_timeout_secs,
        })
    }

    /// Verify ownership of the connected wallet. A store hit short-circuits
    /// without prompting for a signature.
    pub async fn verify(&mut self) -> SweepResult<bool> {
        let session = self.current
            .as_mut()
            .ok_or_else(|| SweepError::AccountInvalid("no active session".to_string()))?;
        let address = session.public_key.ok_or_else(||
            SweepError::AccountInvalid("session has no connected wallet".to_string())
        )?;

        if session.status != SessionStatus::Connected {
            return Err(
                SweepError::Verification(format!("cannot verify from state {}", session.status))
            );
        }
        session.status = SessionStatus::Verifying;

        if self.store.is_verified(&address) {
            session.verified = true;
            session.status = SessionStatus::Verified;
            log(
                LogTag::Verify,
                "CACHED",
                &format!("Wallet {} already verified, skipping prompt", address)
            );
            return Ok(true);
        }

        let provider = self.registry
            .get(&session.provider_id)
            .ok_or_else(|| {
                SweepError::ProviderUnavailable(
                    format!("provider '{}' disappeared", session.provider_id)
                )
            })?;

        let challenge = build_challenge(&address);
        match provider.sign_message(challenge.as_bytes()).await {
            Ok(signature) => {
                let encoded = bs58::encode(&signature).into_string();
                let valid = verify_signature(&address, &challenge, &encoded)?;
                if valid {
                    session.verified = true;
                    session.status = SessionStatus::Verified;
                    self.store.record(&address);
                    log(LogTag::Verify, "VERIFIED", &format!("Wallet {} proved ownership", address));
                } else {
                    session.status = SessionStatus::Failed;
                    log(
                        LogTag::Verify,
                        "INVALID",
                        &format!("Signature from {} did not verify", address)
                    );
                }
                Ok(valid)
            }
            Err(e) => {
                session.status = SessionStatus::Failed;
                Err(classify_provider_error(&session.provider_id, &e))
            }
        }
    }

    /// Return to idle. Terminal sessions stay visible for the configured
    /// display delay before they are dropped.
    pub async fn reset(&mut self) {
        if let Some(session) = &self.current {
            if matches!(session.status, SessionStatus::Verified | SessionStatus::Failed) {
                tokio::time::sleep(Duration::from_secs(self.config.reset_delay_secs)).await;
            }
        }
        self.current = None;
        log(LogTag::Session, "RESET", "Session returned to idle");
    }
}
