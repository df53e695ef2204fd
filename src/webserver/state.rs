/// Shared application state for the webserver
///
/// Holds the handles route handlers need: configuration, ledger access,
/// the quote cache, the verification store, and the notification fan-out.
use chrono::{ DateTime, Utc };
use std::sync::Arc;

use crate::config::Config;
use crate::events::Notifications;
use crate::price::PriceCache;
use crate::rpc::LedgerRpc;
use crate::verify::VerificationStore;

/// Shared application state passed to all route handlers
pub struct AppState {
    pub config: Arc<Config>,
    pub rpc: Arc<dyn LedgerRpc>,
    pub price: Arc<PriceCache>,
    pub store: Arc<VerificationStore>,
    pub notifications: Arc<Notifications>,

    /// Server startup time
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(
        config: Arc<Config>,
        rpc: Arc<dyn LedgerRpc>,
        price: Arc<PriceCache>,
        store: Arc<VerificationStore>,
        notifications: Arc<Notifications>
    ) -> Self {
        Self {
            config,
            rpc,
            price,
            store,
            notifications,
            startup_time: Utc::now(),
        }
    }

    /// Get server uptime in seconds
    pub fn uptime_seconds(&self) -> u64 {
        (Utc::now() - self.startup_time).num_seconds().max(0) as u64
    }
}
