use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch.
///
/// Every timestamp in the store (`created_at`, `locked_at`,
/// `lease_expires_at`) comes from this single helper so that lease-expiry
/// comparisons between producer and consumer hosts use one UTC-normalized
/// clock.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
