use chrono::Utc;
use colored::*;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use std::io::{ self, Write };

/// Log categories, one per subsystem. Debug output is gated per tag via
/// `--debug-<tag>` command line switches (`--verbose` enables all).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogTag {
    System,
    Config,
    Rpc,
    Wallet,
    Session,
    Verify,
    Sweep,
    Submit,
    Price,
    Webserver,
    Notify,
}

impl LogTag {
    pub fn label(&self) -> &'static str {
        match self {
            LogTag::System => "SYSTEM",
            LogTag::Config => "CONFIG",
            LogTag::Rpc => "RPC",
            LogTag::Wallet => "WALLET",
            LogTag::Session => "SESSION",
            LogTag::Verify => "VERIFY",
            LogTag::Sweep => "SWEEP",
            LogTag::Submit => "SUBMIT",
            LogTag::Price => "PRICE",
            LogTag::Webserver => "WEB",
            LogTag::Notify => "NOTIFY",
        }
    }

    fn colored_label(&self) -> ColoredString {
        match self {
            LogTag::System => self.label().green().bold(),
            LogTag::Config => self.label().white().bold(),
            LogTag::Rpc => self.label().bright_green().bold(),
            LogTag::Wallet => self.label().blue().bold(),
            LogTag::Session => self.label().magenta().bold(),
            LogTag::Verify => self.label().cyan().bold(),
            LogTag::Sweep => self.label().yellow().bold(),
            LogTag::Submit => self.label().bright_yellow().bold(),
            LogTag::Price => self.label().bright_cyan().bold(),
            LogTag::Webserver => self.label().bright_blue().bold(),
            LogTag::Notify => self.label().bright_magenta().bold(),
        }
    }
}

static DEBUG_TAGS: Lazy<HashSet<String>> = Lazy::new(|| {
    let mut tags = HashSet::new();
    for arg in std::env::args() {
        if let Some(tag) = arg.strip_prefix("--debug-") {
            tags.insert(tag.to_lowercase());
        }
        if arg == "--verbose" {
            tags.insert("all".to_string());
        }
    }
    tags
});

static ADDRESS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"([1-9A-HJ-NP-Za-km-z]{32,44})").unwrap()
});

static SIGNATURE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"([1-9A-HJ-NP-Za-km-z]{80,90})").unwrap()
});

/// Capture command line debug switches before anything logs.
pub fn init() {
    Lazy::force(&DEBUG_TAGS);
    Lazy::force(&ADDRESS_RE);
    Lazy::force(&SIGNATURE_RE);
}

/// Print a log line: dimmed UTC timestamp, colored tag, event code, message.
pub fn log(tag: LogTag, event: &str, message: &str) {
    let timestamp = Utc::now().format("%H:%M:%S");
    println!(
        "{} {} {} {}",
        format!("[{}]", timestamp).dimmed(),
        tag.colored_label(),
        format!("[{}]", event).bold(),
        format_message(message)
    );
    io::stdout().flush().unwrap();
}

/// Log only when debugging is enabled for the tag.
pub fn debug(tag: LogTag, event: &str, message: &str) {
    if is_debug_enabled(tag) {
        log(tag, event, message);
    }
}

pub fn is_debug_enabled(tag: LogTag) -> bool {
    DEBUG_TAGS.contains("all") || DEBUG_TAGS.contains(&tag.label().to_lowercase())
}

// Shorten and highlight base58 material so lines stay scannable.
fn format_message(message: &str) -> String {
    let formatted = SIGNATURE_RE.replace_all(message, |caps: &regex::Captures| {
        let sig = &caps[1];
        format!(
            "{}...{}",
            sig[..12].bright_yellow().bold(),
            sig[sig.len() - 8..].bright_yellow().bold()
        )
    }).to_string();

    ADDRESS_RE.replace_all(&formatted, |caps: &regex::Captures| {
        let addr = &caps[1];
        format!(
            "{}...{}",
            addr[..8].bright_cyan().bold(),
            addr[addr.len() - 4..].bright_cyan().bold()
        )
    }).to_string()
}
