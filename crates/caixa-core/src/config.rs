use std::time::Duration;

use serde::Deserialize;

/// What happens to a message once every subscription on it is Processed.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RetentionPolicy {
    /// Delete the message, its index entry, and its subscription rows.
    #[default]
    Remove,
    /// Keep the Processed message for auditing; an operator cleans up later.
    Retain,
}

/// What happens to quarantined (Error) messages.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ErrorPolicy {
    /// Error messages stay quarantined until an operator re-queues them.
    #[default]
    Quarantine,
    /// Sink runners flip Error messages back to Pending at the start of
    /// each poll cycle.
    Requeue,
}

/// Message box configuration, deserializable from TOML.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct MessageBoxConfig {
    /// How long an acquired lease is valid, in milliseconds.
    pub lease_duration_ms: u64,
    /// Maximum messages returned per poll. 0 means unbounded.
    pub page_limit: usize,
    pub retention: RetentionPolicy,
    pub error_policy: ErrorPolicy,
}

impl MessageBoxConfig {
    /// Default lease duration: 5 minutes.
    pub const DEFAULT_LEASE_DURATION_MS: u64 = 300_000;
    /// Default poll page limit.
    pub const DEFAULT_PAGE_LIMIT: usize = 1_000;

    pub fn lease_duration(&self) -> Duration {
        Duration::from_millis(self.lease_duration_ms)
    }

    /// The page limit as an `Option`, 0 mapping to "no limit".
    pub fn page(&self) -> Option<usize> {
        match self.page_limit {
            0 => None,
            n => Some(n),
        }
    }
}

impl Default for MessageBoxConfig {
    fn default() -> Self {
        Self {
            lease_duration_ms: Self::DEFAULT_LEASE_DURATION_MS,
            page_limit: Self::DEFAULT_PAGE_LIMIT,
            retention: RetentionPolicy::default(),
            error_policy: ErrorPolicy::default(),
        }
    }
}
