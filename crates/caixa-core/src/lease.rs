use std::sync::Arc;
use std::time::Duration;

use tracing::debug;
use uuid::Uuid;

use crate::clock;
use crate::error::{LeaseError, StorageResult};
use crate::message::{Message, MessageStatus};
use crate::storage::{keys, Storage};

/// Terminal state of a released lease. `Pending` abandons the lease early so
/// the message is immediately retriable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaseOutcome {
    Pending,
    Processed,
    Error,
}

/// Atomic lease acquisition, renewal-by-reacquire, and release.
///
/// `acquire` is the single correctness-critical operation of the whole
/// system: it is one conditional compare-and-update at the storage layer, so
/// no two callers can simultaneously hold a valid lease on a message.
pub struct LeaseManager {
    storage: Arc<dyn Storage>,
}

impl LeaseManager {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// Try to take an exclusive, time-bounded claim on a message.
    ///
    /// Succeeds only when the message is `Pending`, or `InProgress` with an
    /// already-expired lease (the owner crashed or stalled past its
    /// deadline). Returns `Ok(false)` when another consumer holds a valid
    /// lease; that is the normal skip case, not an error.
    pub fn acquire(&self, message_id: &Uuid, lease: Duration) -> Result<bool, LeaseError> {
        let key = self.message_key(message_id)?;
        let now = clock::now_ms();
        let expires = now + lease.as_millis() as u64;

        let updated = self.storage.update_message(&key, &|m| {
            let acquirable = match m.status {
                MessageStatus::Pending => true,
                MessageStatus::InProgress => m.lease_expired(now),
                MessageStatus::Processed | MessageStatus::Error => false,
            };
            if !acquirable {
                return None;
            }
            let mut next = m.clone();
            next.status = MessageStatus::InProgress;
            next.locked_at = Some(now);
            next.lease_expires_at = Some(expires);
            Some(next)
        })?;

        let won = updated.is_some();
        if won {
            debug!(%message_id, expires, "lease acquired");
        }
        Ok(won)
    }

    /// Clear the lease and set the message's status.
    pub fn release(&self, message_id: &Uuid, outcome: LeaseOutcome) -> Result<(), LeaseError> {
        let status = match outcome {
            LeaseOutcome::Pending => MessageStatus::Pending,
            LeaseOutcome::Processed => MessageStatus::Processed,
            LeaseOutcome::Error => MessageStatus::Error,
        };
        self.transition(message_id, &|m| {
            let mut next = m.clone();
            next.status = status;
            next.lease_expires_at = None;
            Some(next)
        })
    }

    /// Terminal success: `Processed`, `processed_at` stamped, lease cleared.
    /// There is no field for a success note, so `note` is only logged.
    pub fn mark_processed(&self, message_id: &Uuid, note: Option<&str>) -> Result<(), LeaseError> {
        let now = clock::now_ms();
        self.transition(message_id, &|m| {
            let mut next = m.clone();
            next.status = MessageStatus::Processed;
            next.processed_at = Some(now);
            next.lease_expires_at = None;
            Some(next)
        })?;
        debug!(%message_id, note = note.unwrap_or(""), "message processed");
        Ok(())
    }

    /// Terminal failure: quarantine with the failure text recorded. Error
    /// messages are excluded from Pending reads, so nothing retries them
    /// automatically.
    pub fn mark_error(&self, message_id: &Uuid, error_message: &str) -> Result<(), LeaseError> {
        let recorded = error_message.to_string();
        self.transition(message_id, &|m| {
            let mut next = m.clone();
            next.status = MessageStatus::Error;
            next.error_message = Some(recorded.clone());
            next.lease_expires_at = None;
            Some(next)
        })?;
        debug!(%message_id, error = error_message, "message quarantined");
        Ok(())
    }

    /// Flip every Error message on an interface back to Pending, clearing
    /// the recorded failure. Returns how many were re-queued. This is the
    /// explicit re-queue path, invoked by sink runners when the error
    /// policy allows it, and by operators.
    pub fn requeue_errors(&self, interface_name: &str) -> StorageResult<u64> {
        let prefix = keys::message_prefix(interface_name);
        let mut error_keys: Vec<Vec<u8>> = Vec::new();
        self.storage.scan_messages(&prefix, &mut |key, msg| {
            if msg.status == MessageStatus::Error {
                error_keys.push(key.to_vec());
            }
            true
        })?;

        let mut requeued = 0u64;
        for key in error_keys {
            let updated = self.storage.update_message(&key, &|m| {
                if m.status != MessageStatus::Error {
                    return None;
                }
                let mut next = m.clone();
                next.status = MessageStatus::Pending;
                next.error_message = None;
                next.lease_expires_at = None;
                next.locked_at = None;
                Some(next)
            })?;
            if updated.is_some() {
                requeued += 1;
            }
        }

        if requeued > 0 {
            debug!(interface = interface_name, requeued, "error messages re-queued");
        }
        Ok(requeued)
    }

    fn transition(
        &self,
        message_id: &Uuid,
        f: &dyn Fn(&Message) -> Option<Message>,
    ) -> Result<(), LeaseError> {
        let key = self.message_key(message_id)?;
        self.storage
            .update_message(&key, f)?
            .ok_or(LeaseError::MessageNotFound(*message_id))?;
        Ok(())
    }

    fn message_key(&self, message_id: &Uuid) -> Result<Vec<u8>, LeaseError> {
        self.storage
            .get_index(&keys::index_key(message_id))?
            .ok_or(LeaseError::MessageNotFound(*message_id))
    }
}
