use once_cell::sync::Lazy;

/// Seconds between cleanup sweeps over empty chats. Defaults to 60.
pub static CLEANUP_INTERVAL_SECS: Lazy<u64> = Lazy::new(|| {
    std::env::var("CHAT_CLEANUP_INTERVAL_SECS")
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(60)
});

/// Age in minutes after which an empty chat is considered abandoned. Defaults to 20.
pub static CLEANUP_MAX_AGE_MINUTES: Lazy<i64> = Lazy::new(|| {
    std::env::var("CHAT_CLEANUP_MAX_AGE_MINUTES")
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(20)
});

/// Smallest accepted balance top-up, in sats. Defaults to 1.
pub static MIN_TOPUP_SAT: Lazy<i64> = Lazy::new(|| {
    std::env::var("CHAT_MIN_TOPUP_SAT")
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(1)
});

/// Largest accepted balance top-up, in sats. Defaults to 1_000_000.
pub static MAX_TOPUP_SAT: Lazy<i64> = Lazy::new(|| {
    std::env::var("CHAT_MAX_TOPUP_SAT")
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(1_000_000)
});

/// Base URL of the exchange-rate service used to price fiat-denominated chats.
pub static RATE_API_URL: Lazy<Option<String>> = Lazy::new(|| {
    std::env::var("CHAT_RATE_API_URL")
        .ok()
        .map(|value| value.trim().trim_end_matches('/').to_string())
        .filter(|value| !value.is_empty())
});
