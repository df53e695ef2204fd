//! Bounded sign, broadcast, confirm loop.
//!
//! Only an explicit user rejection is retried, by re-signing the same
//! serialized transaction. Anything else terminates the loop immediately.

use chrono::{ DateTime, Utc };
use serde::Serialize;
use solana_sdk::transaction::Transaction;
use std::sync::Arc;
use std::time::Duration;

use crate::config::RetryConfig;
use crate::errors::{ SweepError, SweepResult };
use crate::events::{ Notifications, SweepEvent };
use crate::global::SHUTDOWN;
use crate::logger::{ log, LogTag };
use crate::providers::WalletProvider;
use crate::rpc::{ ConfirmationStatus, LedgerRpc };
use crate::session::ConnectionSession;
use crate::sweep::SweepPlan;
use crate::utils::delay_with_shutdown;
use crate::verify::is_user_rejection;

/// Outcome of one sign/broadcast/confirm cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    Rejected,
    Confirmed,
    Error,
}

/// One cycle's record. Every attempt belongs to exactly one session.
#[derive(Debug, Clone, Serialize)]
pub struct SubmissionAttempt {
    pub index: u32,
    pub outcome: AttemptOutcome,
    pub signature: Option<String>,
    pub at: DateTime<Utc>,
}

impl SubmissionAttempt {
    fn record(index: u32, outcome: AttemptOutcome, signature: Option<String>) -> Self {
        Self { index, outcome, signature, at: Utc::now() }
    }
}

/// Sign, broadcast, and confirm `plan`. A classified user rejection retries
/// after the configured delay, up to `max_retries` extra attempts; every
/// other failure terminates immediately. Emits one event per transition and
/// exactly one Failed event when the loop ends without a confirmation.
pub async fn submit_with_retry(
    rpc: &dyn LedgerRpc,
    provider: Arc<dyn WalletProvider>,
    session: &mut ConnectionSession,
    plan: &SweepPlan,
    config: &RetryConfig,
    notifications: &Notifications
) -> SweepResult<String> {
    let total_attempts = config.max_retries + 1;
    let started = Utc::now();
    let mut last_rejection: Option<String> = None;

    for attempt in 1..=total_attempts {
        // Re-sign the same immutable plan bytes on every attempt.
        let unsigned: Transaction = bincode::deserialize(&plan.transaction)?;
        log(
            LogTag::Submit,
            "ATTEMPT",
            &format!("Signing attempt {}/{}", attempt, total_attempts)
        );

        let signed = match provider.sign_transaction(unsigned).await {
            Ok(tx) => tx,
            Err(e) => {
                if is_user_rejection(provider.id(), e.code, e.name.as_deref(), &e.message) {
                    session.attempts.push(
                        SubmissionAttempt::record(attempt, AttemptOutcome::Rejected, None)
                    );
                    notifications.emit(SweepEvent::Rejected {
                        attempt,
                        detail: e.message.clone(),
                    }).await;
                    last_rejection = Some(e.message.clone());

                    if attempt < total_attempts {
                        log(
                            LogTag::Submit,
                            "RETRY",
                            &format!("User rejected, retrying in {}s", config.retry_delay_secs)
                        );
                        delay_with_shutdown(
                            &SHUTDOWN,
                            Duration::from_secs(config.retry_delay_secs)
                        ).await;
                        continue;
                    }
                    break;
                }

                session.attempts.push(
                    SubmissionAttempt::record(attempt, AttemptOutcome::Error, None)
                );
                notifications.emit(SweepEvent::Failed {
                    stage: "sign".to_string(),
                    detail: e.message.clone(),
                }).await;
                return Err(SweepError::Signing(e.message.clone()));
            }
        };

        notifications.emit(SweepEvent::Signed { attempt }).await;

        let signed_bytes = bincode::serialize(&signed)?;
        let signature = match rpc.send_transaction(&signed_bytes).await {
            Ok(signature) => signature,
            Err(e) => {
                session.attempts.push(
                    SubmissionAttempt::record(attempt, AttemptOutcome::Error, None)
                );
                notifications.emit(SweepEvent::Failed {
                    stage: "broadcast".to_string(),
                    detail: e.to_string(),
                }).await;
                return Err(e);
            }
        };

        log(LogTag::Submit, "SENT", &format!("Transaction broadcast: {}", signature));
        notifications.emit(SweepEvent::Broadcast { signature: signature.clone() }).await;

        match await_confirmation(rpc, &signature, config).await {
            Ok(()) => {
                session.attempts.push(
                    SubmissionAttempt::record(
                        attempt,
                        AttemptOutcome::Confirmed,
                        Some(signature.clone())
                    )
                );
                notifications.emit(SweepEvent::Confirmed { signature: signature.clone() }).await;
                log(
                    LogTag::Submit,
                    "CONFIRMED",
                    &format!(
                        "Transaction confirmed in {}: {}",
                        crate::utils::format_elapsed(started, Utc::now()),
                        signature
                    )
                );
                return Ok(signature);
            }
            Err(e) => {
                session.attempts.push(
                    SubmissionAttempt::record(
                        attempt,
                        AttemptOutcome::Error,
                        Some(signature.clone())
                    )
                );
                notifications.emit(SweepEvent::Failed {
                    stage: "confirm".to_string(),
                    detail: e.to_string(),
                }).await;
                return Err(e);
            }
        }
    }

    let detail = last_rejection.unwrap_or_else(|| "user rejected".to_string());
    notifications.emit(SweepEvent::Failed {
        stage: "sign".to_string(),
        detail: detail.clone(),
    }).await;
    log(
        LogTag::Submit,
        "EXHAUSTED",
        &format!("All {} signing attempts rejected", total_attempts)
    );
    Err(SweepError::UserRejected(detail))
}

/// Poll signature status until confirmed, bounded by the configured timeout.
async fn await_confirmation(
    rpc: &dyn LedgerRpc,
    signature: &str,
    config: &RetryConfig
) -> SweepResult<()> {
    let deadline =
        tokio::time::Instant::now() + Duration::from_secs(config.confirm_timeout_secs);

    loop {
        match rpc.get_signature_status(signature).await? {
            ConfirmationStatus::Confirmed => {
                return Ok(());
            }
            ConfirmationStatus::Failed(err) => {
                return Err(SweepError::TransactionFailed(err));
            }
            ConfirmationStatus::Pending => {}
        }

        if tokio::time::Instant::now() >= deadline {
            return Err(SweepError::Timeout {
                operation: format!("confirming {}", signature),
                seconds: config.confirm_timeout_secs,
            });
        }

        tokio::time::sleep(Duration::from_millis(config.confirm_poll_ms)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::MemoryNotifier;
    use crate::providers::{ ProviderError, ProviderResult };
    use crate::sweep::SweepPlan;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use solana_sdk::hash::Hash;
    use solana_sdk::pubkey::Pubkey;
    use solana_sdk::signature::Keypair;
    use solana_sdk::signer::Signer;
    use solana_sdk::system_instruction;
    use std::sync::atomic::{ AtomicUsize, Ordering };

    struct MockLedger {
        send_error: Option<String>,
        statuses: Mutex<Vec<ConfirmationStatus>>,
    }

    impl MockLedger {
        fn confirming() -> Self {
            Self { send_error: None, statuses: Mutex::new(vec![]) }
        }

        fn with_statuses(statuses: Vec<ConfirmationStatus>) -> Self {
            Self { send_error: None, statuses: Mutex::new(statuses) }
        }

        fn broken_broadcast() -> Self {
            Self { send_error: Some("blockhash not found".to_string()), statuses: Mutex::new(vec![]) }
        }
    }

    #[async_trait]
    impl LedgerRpc for MockLedger {
        async fn get_balance(&self, _address: &Pubkey) -> SweepResult<u64> {
            Ok(0)
        }

        async fn get_latest_blockhash(&self) -> SweepResult<Hash> {
            Ok(Hash::new_unique())
        }

        async fn get_minimum_balance_for_rent_exemption(&self, _data_len: usize) -> SweepResult<u64> {
            Ok(0)
        }

        async fn get_token_accounts(
            &self,
            _owner: &Pubkey
        ) -> SweepResult<Vec<crate::rpc::TokenAccountInfo>> {
            Ok(vec![])
        }

        async fn get_accounts_exist(&self, _addresses: &[Pubkey]) -> SweepResult<Vec<bool>> {
            Ok(vec![])
        }

        async fn send_transaction(&self, _tx_bytes: &[u8]) -> SweepResult<String> {
            match &self.send_error {
                Some(message) => Err(SweepError::Rpc(message.clone())),
                None => Ok("5VERYrealSignature".to_string()),
            }
        }

        async fn get_signature_status(&self, _signature: &str) -> SweepResult<ConfirmationStatus> {
            let mut statuses = self.statuses.lock();
            if statuses.is_empty() {
                Ok(ConfirmationStatus::Confirmed)
            } else {
                Ok(statuses.remove(0))
            }
        }
    }

    struct MockSigner {
        keypair: Keypair,
        reject_first: usize,
        generic_failure: bool,
        signs: AtomicUsize,
    }

    impl MockSigner {
        fn signing(keypair: Keypair) -> Self {
            Self { keypair, reject_first: 0, generic_failure: false, signs: AtomicUsize::new(0) }
        }

        fn rejecting_first(keypair: Keypair, count: usize) -> Self {
            Self { keypair, reject_first: count, generic_failure: false, signs: AtomicUsize::new(0) }
        }

        fn failing(keypair: Keypair) -> Self {
            Self { keypair, reject_first: 0, generic_failure: true, signs: AtomicUsize::new(0) }
        }
    }

    #[async_trait]
    impl WalletProvider for MockSigner {
        fn id(&self) -> &str {
            "mock"
        }

        fn display_name(&self) -> &str {
            "Mock Wallet"
        }

        async fn is_available(&self) -> bool {
            true
        }

        async fn connect(&self) -> ProviderResult<Pubkey> {
            Ok(self.keypair.pubkey())
        }

        async fn sign_transaction(&self, mut tx: Transaction) -> ProviderResult<Transaction> {
            let attempt = self.signs.fetch_add(1, Ordering::SeqCst);

            if self.generic_failure {
                return Err(ProviderError::message("signer hardware fault"));
            }
            if attempt < self.reject_first {
                return Err(ProviderError {
                    code: Some(4001),
                    name: Some("UserRejectedRequestError".to_string()),
                    message: "User rejected the request".to_string(),
                });
            }

            let blockhash = tx.message.recent_blockhash;
            tx
                .try_sign(&[&self.keypair], blockhash)
                .map_err(|e| ProviderError::message(format!("signing failed: {}", e)))?;
            Ok(tx)
        }

        async fn sign_message(&self, message: &[u8]) -> ProviderResult<Vec<u8>> {
            Ok(self.keypair.sign_message(message).as_ref().to_vec())
        }
    }

    fn plan_for(keypair: &Keypair) -> SweepPlan {
        let owner = keypair.pubkey();
        let destination = Pubkey::new_unique();
        let instructions = vec![system_instruction::transfer(&owner, &destination, 1_000)];
        let mut transaction = Transaction::new_with_payer(&instructions, Some(&owner));
        transaction.message.recent_blockhash = Hash::new_unique();

        SweepPlan {
            transaction: bincode::serialize(&transaction).unwrap(),
            transfer_amount: 1_000,
            token_transfers: vec![],
            created_accounts: 0,
            estimated_fees: 10_000,
        }
    }

    fn fast_retry_config(max_retries: u32) -> RetryConfig {
        RetryConfig {
            max_retries,
            retry_delay_secs: 0,
            confirm_timeout_secs: 5,
            confirm_poll_ms: 10,
        }
    }

    fn test_session() -> ConnectionSession {
        ConnectionSession::new("mock")
    }

    #[tokio::test]
    async fn test_happy_path_confirms() {
        let keypair = Keypair::new();
        let plan = plan_for(&keypair);
        let ledger = MockLedger::confirming();
        let provider = Arc::new(MockSigner::signing(keypair));
        let memory = Arc::new(MemoryNotifier::new());
        let notifications = Notifications::new().with_sink(memory.clone());
        let mut session = test_session();

        let signature = submit_with_retry(
            &ledger,
            provider,
            &mut session,
            &plan,
            &fast_retry_config(2),
            &notifications
        ).await.unwrap();

        assert_eq!(signature, "5VERYrealSignature");
        assert_eq!(session.attempts.len(), 1);
        assert_eq!(session.attempts[0].outcome, AttemptOutcome::Confirmed);
        assert_eq!(memory.count("SIGNED"), 1);
        assert_eq!(memory.count("BROADCAST"), 1);
        assert_eq!(memory.count("CONFIRMED"), 1);
        assert_eq!(memory.count("FAILED"), 0);
    }

    #[tokio::test]
    async fn test_rejections_bounded_and_terminal() {
        let keypair = Keypair::new();
        let plan = plan_for(&keypair);
        let ledger = MockLedger::confirming();
        let provider = Arc::new(MockSigner::rejecting_first(keypair, usize::MAX));
        let memory = Arc::new(MemoryNotifier::new());
        let notifications = Notifications::new().with_sink(memory.clone());
        let mut session = test_session();

        let result = submit_with_retry(
            &ledger,
            provider,
            &mut session,
            &plan,
            &fast_retry_config(2),
            &notifications
        ).await;

        assert!(matches!(result, Err(SweepError::UserRejected(_))));
        // First attempt plus two retries, all rejected.
        assert_eq!(session.attempts.len(), 3);
        assert!(session.attempts.iter().all(|a| a.outcome == AttemptOutcome::Rejected));
        assert_eq!(memory.count("REJECTED"), 3);
        assert_eq!(memory.count("FAILED"), 1);
        assert_eq!(memory.count("SIGNED"), 0);
    }

    #[tokio::test]
    async fn test_rejection_then_approval_succeeds() {
        let keypair = Keypair::new();
        let plan = plan_for(&keypair);
        let ledger = MockLedger::confirming();
        let provider = Arc::new(MockSigner::rejecting_first(keypair, 1));
        let memory = Arc::new(MemoryNotifier::new());
        let notifications = Notifications::new().with_sink(memory.clone());
        let mut session = test_session();

        let result = submit_with_retry(
            &ledger,
            provider,
            &mut session,
            &plan,
            &fast_retry_config(3),
            &notifications
        ).await;

        assert!(result.is_ok());
        assert_eq!(session.attempts.len(), 2);
        assert_eq!(session.attempts[0].outcome, AttemptOutcome::Rejected);
        assert_eq!(session.attempts[1].outcome, AttemptOutcome::Confirmed);
        assert_eq!(memory.count("REJECTED"), 1);
        assert_eq!(memory.count("CONFIRMED"), 1);
        assert_eq!(memory.count("FAILED"), 0);
    }

    #[tokio::test]
    async fn test_non_rejection_signer_failure_terminates_immediately() {
        let keypair = Keypair::new();
        let plan = plan_for(&keypair);
        let ledger = MockLedger::confirming();
        let provider = Arc::new(MockSigner::failing(keypair));
        let memory = Arc::new(MemoryNotifier::new());
        let notifications = Notifications::new().with_sink(memory.clone());
        let mut session = test_session();

        let result = submit_with_retry(
            &ledger,
            provider,
            &mut session,
            &plan,
            &fast_retry_config(5),
            &notifications
        ).await;

        assert!(matches!(result, Err(SweepError::Signing(_))));
        assert_eq!(session.attempts.len(), 1);
        assert_eq!(memory.count("REJECTED"), 0);
        assert_eq!(memory.count("FAILED"), 1);
    }

    #[tokio::test]
    async fn test_broadcast_failure_terminates_immediately() {
        let keypair = Keypair::new();
        let plan = plan_for(&keypair);
        let ledger = MockLedger::broken_broadcast();
        let provider = Arc::new(MockSigner::signing(keypair));
        let memory = Arc::new(MemoryNotifier::new());
        let notifications = Notifications::new().with_sink(memory.clone());
        let mut session = test_session();

        let result = submit_with_retry(
            &ledger,
            provider,
            &mut session,
            &plan,
            &fast_retry_config(5),
            &notifications
        ).await;

        assert!(matches!(result, Err(SweepError::Rpc(_))));
        assert_eq!(session.attempts.len(), 1);
        assert_eq!(memory.count("SIGNED"), 1);
        assert_eq!(memory.count("BROADCAST"), 0);
        assert_eq!(memory.count("FAILED"), 1);
    }

    #[tokio::test]
    async fn test_confirmation_timeout_fails_once() {
        let keypair = Keypair::new();
        let plan = plan_for(&keypair);
        let ledger = MockLedger::with_statuses(vec![
            ConfirmationStatus::Pending,
            ConfirmationStatus::Pending,
            ConfirmationStatus::Pending
        ]);
        let provider = Arc::new(MockSigner::signing(keypair));
        let memory = Arc::new(MemoryNotifier::new());
        let notifications = Notifications::new().with_sink(memory.clone());
        let mut session = test_session();

        let config = RetryConfig {
            max_retries: 5,
            retry_delay_secs: 0,
            confirm_timeout_secs: 0,
            confirm_poll_ms: 10,
        };

        let result = submit_with_retry(
            &ledger,
            provider,
            &mut session,
            &plan,
            &config,
            &notifications
        ).await;

        assert!(matches!(result, Err(SweepError::Timeout { .. })));
        assert_eq!(memory.count("SIGNED"), 1);
        assert_eq!(memory.count("BROADCAST"), 1);
        assert_eq!(memory.count("CONFIRMED"), 0);
        assert_eq!(memory.count("FAILED"), 1);
    }

    #[tokio::test]
    async fn test_failed_transaction_status_terminates() {
        let keypair = Keypair::new();
        let plan = plan_for(&keypair);
        let ledger = MockLedger::with_statuses(vec![
            ConfirmationStatus::Pending,
            ConfirmationStatus::Failed("InstructionError".to_string())
        ]);
        let provider = Arc::new(MockSigner::signing(keypair));
        let memory = Arc::new(MemoryNotifier::new());
        let notifications = Notifications::new().with_sink(memory.clone());
        let mut session = test_session();

        let result = submit_with_retry(
            &ledger,
            provider,
            &mut session,
            &plan,
            &fast_retry_config(2),
            &notifications
        ).await;

        assert!(matches!(result, Err(SweepError::TransactionFailed(_))));
        assert_eq!(memory.count("FAILED"), 1);
        assert_eq!(memory.count("CONFIRMED"), 0);
    }
}
