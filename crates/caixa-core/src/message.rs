use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ExtractError;

/// A single debatched row: column name → string value.
pub type Record = HashMap<String, String>;

/// Role of the adapter that produced a message.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum AdapterRole {
    Source,
    Destination,
}

/// Lifecycle status of a message.
///
/// `Error` is a quarantine state: such messages are never returned by
/// Pending reads and therefore never retried automatically.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum MessageStatus {
    Pending,
    InProgress,
    Processed,
    Error,
}

/// One debatched unit of work. This is the row persisted in the `messages`
/// column family. The payload carries exactly one record, serialized, and
/// `headers` is the column list shared by every message of its batch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub id: Uuid,
    pub interface_name: String,
    pub producing_adapter_name: String,
    pub producing_role: AdapterRole,
    pub adapter_instance_id: Uuid,
    pub headers: Vec<String>,
    pub payload: Vec<u8>,
    pub status: MessageStatus,
    /// Present iff `status == InProgress`.
    pub lease_expires_at: Option<u64>,
    pub created_at: u64,
    pub locked_at: Option<u64>,
    pub processed_at: Option<u64>,
    pub error_message: Option<String>,
}

impl Message {
    /// Generate a new UUIDv7 message ID.
    pub fn new_id() -> Uuid {
        Uuid::now_v7()
    }

    /// Parse the payload back into `(headers, record)`.
    ///
    /// Pure accessor with no store access and no side effects. Fails when the
    /// payload does not deserialize or when its keys disagree with the
    /// message's own headers.
    pub fn extract(&self) -> Result<(Vec<String>, Record), ExtractError> {
        let record: Record = serde_json::from_slice(&self.payload)?;

        if record.len() != self.headers.len()
            || !self.headers.iter().all(|h| record.contains_key(h))
        {
            let missing: Vec<String> = self
                .headers
                .iter()
                .filter(|h| !record.contains_key(*h))
                .cloned()
                .collect();
            let unexpected: Vec<String> = record
                .keys()
                .filter(|k| !self.headers.contains(k))
                .cloned()
                .collect();
            return Err(ExtractError::HeaderMismatch { missing, unexpected });
        }

        Ok((self.headers.clone(), record))
    }

    /// True when the lease has expired as of `now_ms` (or was never set).
    /// An `InProgress` message with an expired lease is re-acquirable as if
    /// it were Pending.
    pub fn lease_expired(&self, now_ms: u64) -> bool {
        match self.lease_expires_at {
            Some(expires) => expires <= now_ms,
            None => true,
        }
    }
}

/// Status of one subscriber's claim on one message.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SubscriptionStatus {
    Pending,
    Processed,
    Error,
}

/// One destination's tracked claim on one message, enabling fan-out to N
/// independent consumers. Keyed `(message_id, subscriber)`, at most one row
/// per key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Subscription {
    pub message_id: Uuid,
    pub interface_name: String,
    pub subscriber: String,
    pub status: SubscriptionStatus,
    pub error_detail: Option<String>,
    pub created_at: u64,
    pub resolved_at: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message_with_payload(headers: Vec<&str>, payload: Vec<u8>) -> Message {
        Message {
            id: Message::new_id(),
            interface_name: "orders".to_string(),
            producing_adapter_name: "csv-in".to_string(),
            producing_role: AdapterRole::Source,
            adapter_instance_id: Uuid::new_v4(),
            headers: headers.into_iter().map(String::from).collect(),
            payload,
            status: MessageStatus::Pending,
            lease_expires_at: None,
            created_at: 1_000,
            locked_at: None,
            processed_at: None,
            error_message: None,
        }
    }

    #[test]
    fn extract_round_trips_record() {
        let record: Record = [("id".to_string(), "1".to_string())].into_iter().collect();
        let payload = serde_json::to_vec(&record).unwrap();
        let msg = message_with_payload(vec!["id"], payload);

        let (headers, extracted) = msg.extract().unwrap();
        assert_eq!(headers, vec!["id".to_string()]);
        assert_eq!(extracted, record);
    }

    #[test]
    fn extract_rejects_unparseable_payload() {
        let msg = message_with_payload(vec!["id"], b"not json".to_vec());
        assert!(matches!(msg.extract(), Err(ExtractError::Payload(_))));
    }

    #[test]
    fn extract_rejects_header_mismatch() {
        let record: Record = [("other".to_string(), "1".to_string())]
            .into_iter()
            .collect();
        let payload = serde_json::to_vec(&record).unwrap();
        let msg = message_with_payload(vec!["id"], payload);

        match msg.extract() {
            Err(ExtractError::HeaderMismatch { missing, unexpected }) => {
                assert_eq!(missing, vec!["id".to_string()]);
                assert_eq!(unexpected, vec!["other".to_string()]);
            }
            other => panic!("expected HeaderMismatch, got {other:?}"),
        }
    }

    #[test]
    fn lease_expiry_comparison() {
        let mut msg = message_with_payload(vec![], b"{}".to_vec());
        msg.lease_expires_at = Some(5_000);
        assert!(!msg.lease_expired(4_999));
        assert!(msg.lease_expired(5_000));
        assert!(msg.lease_expired(5_001));

        msg.lease_expires_at = None;
        assert!(msg.lease_expired(0));
    }
}
