use chrono::{ DateTime, Utc };
use std::time::Duration;
use tokio::sync::Notify;

/// Waits for either shutdown signal or delay. Returns true if shutdown was triggered.
pub async fn check_shutdown_or_delay(shutdown: &Notify, duration: Duration) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(duration) => false,
        _ = shutdown.notified() => true,
    }
}

/// Waits for a delay or shutdown signal, whichever comes first.
pub async fn delay_with_shutdown(shutdown: &Notify, duration: Duration) {
    tokio::select! {
        _ = tokio::time::sleep(duration) => {},
        _ = shutdown.notified() => {},
    }
}

/// Shorten a base58 address for display: first 8 and last 8 characters.
pub fn truncate_address(address: &str) -> String {
    if address.len() <= 16 {
        return address.to_string();
    }
    format!("{}...{}", &address[..8], &address[address.len() - 8..])
}

/// Elapsed time between two instants as a compact "3m 12s" style string.
pub fn format_elapsed(start: DateTime<Utc>, end: DateTime<Utc>) -> String {
    let mut seconds = if end > start { (end - start).num_seconds() } else { 0 };
    let minutes = seconds / 60;
    seconds %= 60;
    if minutes > 0 {
        format!("{}m {}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_address_shortens_long_keys() {
        let address = "So11111111111111111111111111111111111111112";
        let truncated = truncate_address(address);
        assert_eq!(truncated, "So111111...11111112");
        assert!(truncated.len() < address.len());
    }

    #[test]
    fn test_truncate_address_keeps_short_strings() {
        assert_eq!(truncate_address("short"), "short");
    }

    #[test]
    fn test_format_elapsed() {
        let start = Utc::now();
        let end = start + chrono::Duration::seconds(125);
        assert_eq!(format_elapsed(start, end), "2m 5s");
        assert_eq!(format_elapsed(end, start), "0s");
    }
}
