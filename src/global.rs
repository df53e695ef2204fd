use once_cell::sync::Lazy;
use std::sync::atomic::{ AtomicBool, Ordering };
use std::sync::Arc;
use tokio::sync::Notify;

/// Default configuration file, relative to the working directory.
pub const CONFIGS_FILE: &str = "configs.json";

/// Persisted set of ownership-verified wallet addresses.
pub const VERIFIED_WALLETS_FILE: &str = "verified_wallets.json";

/// Default keypair file watched by the keypair-file provider.
pub const WALLET_FILE: &str = "wallet.json";

/// Global shutdown notifier, triggered by Ctrl-C or a fatal service error.
pub static SHUTDOWN: Lazy<Arc<Notify>> = Lazy::new(|| Arc::new(Notify::new()));

static SHUTTING_DOWN: AtomicBool = AtomicBool::new(false);

/// Flag shutdown and wake every waiter. Loops that may be mid-cycle when the
/// signal fires check `is_shutting_down` before waiting again.
pub fn trigger_shutdown() {
    SHUTTING_DOWN.store(true, Ordering::SeqCst);
    SHUTDOWN.notify_waiters();
}

pub fn is_shutting_down() -> bool {
    SHUTTING_DOWN.load(Ordering::SeqCst)
}
