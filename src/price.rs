//! SOL price quoting behind an explicit TTL cache.
//!
//! The cache stores one quote with its fetch time. Reads inside the TTL are
//! served from memory; reads past it trigger exactly one refresh attempt and
//! fall back to the stale value when the source is unreachable.

use async_trait::async_trait;
use chrono::{ DateTime, Utc };
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

use crate::errors::{ SweepError, SweepResult };
use crate::logger::{ debug, log, LogTag };
use crate::utils::check_shutdown_or_delay;

/// Canonical symbols for well-known mints whose metadata is often missing.
pub static SYMBOL_OVERRIDES: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("So11111111111111111111111111111111111111112", "SOL"),
        ("EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v", "USDC"),
        ("Es9vMFrzaCERmJfrF4H2FYD4KCoNkY11McCe8BenwNYB", "USDT"),
        ("DezXAZ8z7PnrnRJjz3wXBoRgixCa6xjnB7YaB1pPB263", "BONK"),
        ("JUPyiwrYJFskUPiHa7hkeR8VUtAeFoSYbKedZNsDvCN", "JUP"),
        ("EKpQGSJtjMFqKZ9KQanSqYXRcF8fBopzLHYxdM65zcjm", "WIF"),
    ])
});

/// Static USD quotes for stable assets, used when no live source is reachable.
pub static FALLBACK_QUOTES: Lazy<HashMap<&'static str, f64>> = Lazy::new(|| {
    HashMap::from([
        ("USDC", 1.0),
        ("USDT", 1.0),
    ])
});

/// Where SOL/USD quotes come from.
#[async_trait]
pub trait QuoteSource: Send + Sync {
    async fn fetch_quote(&self) -> SweepResult<f64>;
}

/// CoinGecko-style simple price endpoint.
pub struct HttpQuoteSource {
    client: reqwest::Client,
    url: String,
}

impl HttpQuoteSource {
    pub fn new() -> Self {
        Self::with_url("https://api.coingecko.com/api/v3/simple/price?ids=solana&vs_currencies=usd")
    }

    pub fn with_url(url: &str) -> Self {
        let client = reqwest::Client
            ::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self { client, url: url.to_string() }
    }
}

#[async_trait]
impl QuoteSource for HttpQuoteSource {
    async fn fetch_quote(&self) -> SweepResult<f64> {
        let body: serde_json::Value = self.client
            .get(&self.url)
            .send().await?
            .json().await?;

        body
            .pointer("/solana/usd")
            .and_then(|v| v.as_f64())
            .ok_or_else(|| SweepError::Rpc("price source returned no quote".to_string()))
    }
}

#[derive(Debug, Clone, Copy)]
struct CachedQuote {
    price: f64,
    fetched_at: DateTime<Utc>,
}

/// One cached SOL/USD quote with its fetch timestamp.
pub struct PriceCache {
    source: Arc<dyn QuoteSource>,
    ttl_secs: i64,
    cached: Mutex<Option<CachedQuote>>,
}

impl PriceCache {
    pub fn new(source: Arc<dyn QuoteSource>, ttl_secs: u64) -> Self {
        Self {
            source,
            ttl_secs: ttl_secs as i64,
            cached: Mutex::new(None),
        }
    }

    /// Current quote. Serves the cached value within the TTL, refreshes past
    /// it, and degrades to the stale value (then 0.0) if the source fails.
    pub async fn get(&self) -> f64 {
        if let Some(price) = self.fresh() {
            return price;
        }

        match self.refresh().await {
            Ok(price) => price,
            Err(e) => {
                let stale = *self.cached.lock();
                match stale {
                    Some(cached) => {
                        log(
                            LogTag::Price,
                            "STALE",
                            &format!("Quote refresh failed ({}), serving stale ${:.2}", e, cached.price)
                        );
                        cached.price
                    }
                    None => {
                        log(LogTag::Price, "WARN", &format!("No quote available: {}", e));
                        0.0
                    }
                }
            }
        }
    }

    fn fresh(&self) -> Option<f64> {
        let cached = *self.cached.lock();
        cached.and_then(|c| {
            if Utc::now() - c.fetched_at < chrono::Duration::seconds(self.ttl_secs) {
                Some(c.price)
            } else {
                None
            }
        })
    }

    /// Force a fetch from the source, updating the cache on success.
    pub async fn refresh(&self) -> SweepResult<f64> {
        let price = self.source.fetch_quote().await?;
        *self.cached.lock() = Some(CachedQuote { price, fetched_at: Utc::now() });
        debug(LogTag::Price, "REFRESH", &format!("SOL quote updated: ${:.2}", price));
        Ok(price)
    }
}

/// Rough USD valuation for a token amount using the static tables. Returns
/// None for mints without a known stable quote.
pub fn fallback_token_value(mint: &str, ui_amount: f64) -> Option<f64> {
    let symbol = SYMBOL_OVERRIDES.get(mint)?;
    let quote = FALLBACK_QUOTES.get(symbol)?;
    Some(ui_amount * quote)
}

/// Periodic refresh loop, decoupled from any session.
pub async fn run_price_updater(cache: Arc<PriceCache>, interval_secs: u64, shutdown: Arc<Notify>) {
    log(LogTag::Price, "START", &format!("Price updater running every {}s", interval_secs));

    loop {
        if crate::global::is_shutting_down() {
            break;
        }

        if let Err(e) = cache.refresh().await {
            log(LogTag::Price, "WARN", &format!("Quote refresh failed: {}", e));
        }

        if check_shutdown_or_delay(&shutdown, Duration::from_secs(interval_secs)).await {
            break;
        }
    }

    log(LogTag::Price, "STOP", "Price updater stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{ AtomicUsize, Ordering };

    struct MockSource {
        quotes: Mutex<Vec<Result<f64, String>>>,
        fetches: AtomicUsize,
    }

    impl MockSource {
        fn new(quotes: Vec<Result<f64, String>>) -> Self {
            Self { quotes: Mutex::new(quotes), fetches: AtomicUsize::new(0) }
        }

        fn fetch_count(&self) -> usize {
            self.fetches.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl QuoteSource for MockSource {
        async fn fetch_quote(&self) -> SweepResult<f64> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            let mut quotes = self.quotes.lock();
            if quotes.is_empty() {
                return Err(SweepError::Rpc("mock source exhausted".to_string()));
            }
            quotes.remove(0).map_err(SweepError::Rpc)
        }
    }

    #[tokio::test]
    async fn test_cached_quote_served_within_ttl() {
        let source = Arc::new(MockSource::new(vec![Ok(150.0), Ok(999.0)]));
        let cache = PriceCache::new(source.clone(), 3600);

        assert_eq!(cache.get().await, 150.0);
        assert_eq!(cache.get().await, 150.0);
        assert_eq!(source.fetch_count(), 1);
    }

    #[tokio::test]
    async fn test_expired_quote_triggers_one_refresh() {
        let source = Arc::new(MockSource::new(vec![Ok(150.0), Ok(160.0)]));
        let cache = PriceCache::new(source.clone(), 0);

        assert_eq!(cache.get().await, 150.0);
        assert_eq!(source.fetch_count(), 1);
        assert_eq!(cache.get().await, 160.0);
        assert_eq!(source.fetch_count(), 2);
    }

    #[tokio::test]
    async fn test_stale_value_served_when_source_fails() {
        let source = Arc::new(
            MockSource::new(vec![Ok(150.0), Err("down".to_string()), Err("down".to_string())])
        );
        let cache = PriceCache::new(source.clone(), 0);

        assert_eq!(cache.get().await, 150.0);
        assert_eq!(cache.get().await, 150.0);
        assert_eq!(source.fetch_count(), 2);
    }

    #[tokio::test]
    async fn test_zero_when_never_fetched() {
        let source = Arc::new(MockSource::new(vec![Err("down".to_string())]));
        let cache = PriceCache::new(source, 0);

        assert_eq!(cache.get().await, 0.0);
    }

    #[test]
    fn test_fallback_token_value_for_stables() {
        let usdc = "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v";
        assert_eq!(fallback_token_value(usdc, 25.0), Some(25.0));
        assert_eq!(fallback_token_value("So11111111111111111111111111111111111111112", 1.0), None);
        assert_eq!(fallback_token_value("unknown-mint", 1.0), None);
    }
}
