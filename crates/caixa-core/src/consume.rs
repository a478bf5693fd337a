use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::RetentionPolicy;
use crate::error::ConsumeError;
use crate::lease::LeaseOutcome;
use crate::message::{MessageStatus, Record, SubscriptionStatus};
use crate::messagebox::MessageBox;

/// The single varying step of the consumption protocol: hand one extracted
/// record to whatever the destination actually writes to. Everything else
/// (polling, leasing, extraction, completion, quarantine) is the loop's job
/// and is identical for every destination.
pub trait RecordSink {
    fn write_record(
        &mut self,
        headers: &[String],
        record: &Record,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// Outcome counts of one consumption cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsumeReport {
    /// Messages this cycle wrote to the destination.
    pub processed: u64,
    /// Messages quarantined by a sink or extraction failure.
    pub failed: u64,
    /// Messages skipped: another consumer holds the lease, or this
    /// subscriber already consumed them and they are waiting on the rest of
    /// the fan-out.
    pub skipped: u64,
    /// Messages garbage-collected after full fan-out completion.
    pub removed: u64,
}

impl ConsumeReport {
    /// True when the cycle wrote nothing and quarantined nothing.
    pub fn is_idle(&self) -> bool {
        self.processed == 0 && self.failed == 0
    }

    pub fn merge(&mut self, other: &ConsumeReport) {
        self.processed += other.processed;
        self.failed += other.failed;
        self.skipped += other.skipped;
        self.removed += other.removed;
    }
}

/// Run one poll cycle of the canonical consumption protocol for `subscriber`
/// against `interface_name`:
///
/// 1. Read a page of Pending messages (oldest first).
/// 2. Per message, try to acquire the lease; losing the race is a silent
///    skip, not an error.
/// 3. On acquisition: record the subscription (when `track_subscription`),
///    extract the record, hand it to the sink.
/// 4. Sink success: resolve this subscriber's subscription. If every
///    subscription is now Processed, the message reaches its terminal
///    Processed state and the retention policy applies; otherwise the lease
///    is released back to Pending so the remaining subscribers can take it.
/// 5. Sink failure or an unparseable payload: quarantine the message and its
///    subscription with the failure text, then continue with the next
///    message.
///
/// A message this subscriber already consumed (its own subscription is
/// Processed) is handed straight back: fan-out means the same Pending
/// message is visited by several subscribers, each exactly once.
///
/// Only storage-level failures abort the cycle; they propagate so the caller
/// can log and rely on the next scheduled poll.
pub fn consume_cycle(
    mbox: &MessageBox,
    interface_name: &str,
    subscriber: &str,
    track_subscription: bool,
    sink: &mut dyn RecordSink,
) -> Result<ConsumeReport, ConsumeError> {
    let config = mbox.config();
    let lease_duration = config.lease_duration();
    let page = mbox
        .store()
        .read_limit(interface_name, MessageStatus::Pending, config.page())?;

    let mut report = ConsumeReport::default();

    for message in page {
        // The page is a snapshot: a sibling subscriber may have completed
        // the fan-out and garbage-collected a message since the read.
        let acquired = match mbox.leases().acquire(&message.id, lease_duration) {
            Ok(won) => won,
            Err(crate::error::LeaseError::MessageNotFound(_)) => false,
            Err(e) => return Err(e.into()),
        };
        if !acquired {
            report.skipped += 1;
            continue;
        }

        if track_subscription {
            mbox.subscriptions()
                .subscribe(&message.id, interface_name, subscriber)?;

            if own_subscription_processed(mbox, &message.id, subscriber)? {
                // Already consumed here; only the rest of the fan-out is
                // outstanding. Complete the message if this was the last
                // straggler, otherwise hand it back.
                if finish_if_fanout_complete(mbox, &message.id, config.retention)? {
                    report.removed += 1;
                } else {
                    mbox.leases().release(&message.id, LeaseOutcome::Pending)?;
                }
                report.skipped += 1;
                continue;
            }
        }

        let record = match mbox.store().extract(&message) {
            Ok((_, record)) => record,
            Err(e) => {
                // Corrupt payloads are quarantined, never retried.
                quarantine(mbox, subscriber, track_subscription, &message.id, &e.to_string())?;
                report.failed += 1;
                continue;
            }
        };

        match sink.write_record(&message.headers, &record) {
            Ok(()) => {
                if track_subscription {
                    mbox.subscriptions()
                        .resolve_processed(&message.id, subscriber, None)?;
                    if finish_if_fanout_complete(mbox, &message.id, config.retention)? {
                        report.removed += 1;
                    } else if !mbox.subscriptions().all_processed(&message.id)? {
                        mbox.leases().release(&message.id, LeaseOutcome::Pending)?;
                    }
                } else {
                    mbox.leases().mark_processed(&message.id, None)?;
                }
                report.processed += 1;
            }
            Err(e) => {
                warn!(
                    interface = interface_name,
                    subscriber,
                    message_id = %message.id,
                    error = %e,
                    "destination write failed, quarantining message"
                );
                quarantine(mbox, subscriber, track_subscription, &message.id, &e.to_string())?;
                report.failed += 1;
            }
        }
    }

    if report.processed > 0 || report.failed > 0 || report.skipped > 0 {
        debug!(
            interface = interface_name,
            subscriber,
            processed = report.processed,
            failed = report.failed,
            skipped = report.skipped,
            removed = report.removed,
            "consumption cycle complete"
        );
    }
    Ok(report)
}

fn own_subscription_processed(
    mbox: &MessageBox,
    message_id: &Uuid,
    subscriber: &str,
) -> Result<bool, ConsumeError> {
    let own = mbox.subscriptions().subscription(message_id, subscriber)?;
    Ok(own.is_some_and(|s| s.status == SubscriptionStatus::Processed))
}

/// When every subscription is Processed, move the message to its terminal
/// Processed state and apply retention. Returns true when the message was
/// removed.
fn finish_if_fanout_complete(
    mbox: &MessageBox,
    message_id: &Uuid,
    retention: RetentionPolicy,
) -> Result<bool, ConsumeError> {
    if !mbox.subscriptions().all_processed(message_id)? {
        return Ok(false);
    }
    mbox.leases().mark_processed(message_id, None)?;
    if retention == RetentionPolicy::Remove {
        return Ok(mbox.store().remove(message_id)?);
    }
    Ok(false)
}

fn quarantine(
    mbox: &MessageBox,
    subscriber: &str,
    track_subscription: bool,
    message_id: &Uuid,
    detail: &str,
) -> Result<(), ConsumeError> {
    mbox.leases().mark_error(message_id, detail)?;
    if track_subscription {
        mbox.subscriptions()
            .resolve_error(message_id, subscriber, Some(detail))?;
    }
    Ok(())
}
