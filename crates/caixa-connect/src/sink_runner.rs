use std::thread;
use std::time::Duration;

use tracing::{info, warn};

use caixa_core::{
    consume_cycle, ConsumeError, ConsumeReport, ErrorPolicy, MessageBox, MessageStatus, Record,
    RecordSink, SubscriptionStatus,
};

use crate::connector::Connector;

/// Adapts a destination connector to the consumption loop's per-record sink.
struct ConnectorSink<'a>(&'a mut dyn Connector);

impl RecordSink for ConnectorSink<'_> {
    fn write_record(
        &mut self,
        headers: &[String],
        record: &Record,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.0.write(headers, std::slice::from_ref(record))?;
        Ok(())
    }
}

/// Drives one destination connector against an interface: poll, lease,
/// write, complete: the canonical protocol, never re-derived here. One
/// runner per destination; independent destinations run in their own
/// threads with no coordination beyond the store itself.
pub struct SinkRunner {
    subscriber: String,
    interface: String,
    connector: Box<dyn Connector>,
}

impl SinkRunner {
    pub fn new(
        subscriber: impl Into<String>,
        interface: impl Into<String>,
        connector: Box<dyn Connector>,
    ) -> Self {
        Self {
            subscriber: subscriber.into(),
            interface: interface.into(),
            connector,
        }
    }

    pub fn subscriber(&self) -> &str {
        &self.subscriber
    }

    /// One poll cycle. When `requeue` is set, quarantined messages are
    /// flipped back to Pending first (idempotent across concurrent sinks).
    fn cycle(&mut self, mbox: &MessageBox, requeue: bool) -> Result<ConsumeReport, ConsumeError> {
        if requeue {
            mbox.leases().requeue_errors(&self.interface)?;
        }
        let mut sink = ConnectorSink(self.connector.as_mut());
        consume_cycle(mbox, &self.interface, &self.subscriber, true, &mut sink)
    }

    /// Poll until this subscriber has nothing left to consume, then return
    /// the accumulated totals. Under the requeue policy, quarantined
    /// messages are re-queued once up front rather than every cycle, or a
    /// permanently failing record would ping-pong forever.
    pub fn drain(
        &mut self,
        mbox: &MessageBox,
        poll_interval: Duration,
    ) -> Result<ConsumeReport, ConsumeError> {
        let requeue = mbox.config().error_policy == ErrorPolicy::Requeue;
        let mut total = ConsumeReport::default();
        let mut first = true;

        loop {
            let report = self.cycle(mbox, first && requeue)?;
            total.merge(&report);
            first = false;

            if self.outstanding(mbox)? == 0 {
                break;
            }
            if report.is_idle() {
                // Waiting on messages currently held by other consumers.
                thread::sleep(poll_interval);
            }
        }

        info!(
            interface = %self.interface,
            subscriber = %self.subscriber,
            processed = total.processed,
            failed = total.failed,
            "sink drained"
        );
        Ok(total)
    }

    /// Run as a long-lived service: poll every `poll_interval` until the
    /// stop channel fires or disconnects. Storage failures abort only the
    /// current cycle; the next scheduled poll retries untouched messages.
    pub fn spawn(
        mut self,
        mbox: std::sync::Arc<MessageBox>,
        poll_interval: Duration,
    ) -> std::io::Result<SinkHandle> {
        let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(1);
        let requeue = mbox.config().error_policy == ErrorPolicy::Requeue;
        let subscriber = self.subscriber.clone();

        let thread = thread::Builder::new()
            .name(format!("caixa-sink-{subscriber}"))
            .spawn(move || {
                let mut total = ConsumeReport::default();
                loop {
                    match stop_rx.recv_timeout(poll_interval) {
                        Ok(()) | Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
                        Err(crossbeam_channel::RecvTimeoutError::Timeout) => {
                            match self.cycle(&mbox, requeue) {
                                Ok(report) => total.merge(&report),
                                Err(e) => {
                                    warn!(
                                        subscriber = %self.subscriber,
                                        error = %e,
                                        "poll cycle aborted, retrying next interval"
                                    );
                                }
                            }
                        }
                    }
                }
                total
            })?;

        Ok(SinkHandle {
            subscriber,
            stop_tx,
            thread,
        })
    }

    /// Count messages this subscriber still has to consume: anything
    /// Pending or InProgress whose subscription for us is absent or still
    /// Pending. Messages our subscription already resolved (Processed or
    /// quarantined Error) are no longer ours to wait for.
    fn outstanding(&self, mbox: &MessageBox) -> Result<u64, ConsumeError> {
        let mut count = 0u64;
        for status in [MessageStatus::Pending, MessageStatus::InProgress] {
            for message in mbox.store().read(&self.interface, status)? {
                let resolved = mbox
                    .subscriptions()
                    .subscription(&message.id, &self.subscriber)?
                    .is_some_and(|s| s.status != SubscriptionStatus::Pending);
                if !resolved {
                    count += 1;
                }
            }
        }
        Ok(count)
    }
}

/// Handle to a spawned sink service thread.
pub struct SinkHandle {
    subscriber: String,
    stop_tx: crossbeam_channel::Sender<()>,
    thread: thread::JoinHandle<ConsumeReport>,
}

impl SinkHandle {
    pub fn subscriber(&self) -> &str {
        &self.subscriber
    }

    /// Signal the service to stop and wait for it, returning its totals.
    pub fn stop(self) -> ConsumeReport {
        let _ = self.stop_tx.send(());
        self.thread.join().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use caixa_core::{AdapterRole, MessageBoxConfig, RocksDbStorage};
    use uuid::Uuid;

    use crate::connectors::memory::MemoryConnector;

    fn test_mbox() -> (Arc<MessageBox>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(RocksDbStorage::open(dir.path()).unwrap());
        (
            Arc::new(MessageBox::with_storage(storage, MessageBoxConfig::default())),
            dir,
        )
    }

    fn write_rows(mbox: &MessageBox, interface: &str, n: usize) -> Vec<Uuid> {
        let records: Vec<Record> = (0..n)
            .map(|i| [("id".to_string(), i.to_string())].into_iter().collect())
            .collect();
        mbox.store()
            .write(
                interface,
                "mem-in",
                AdapterRole::Source,
                Uuid::new_v4(),
                &["id".to_string()],
                &records,
            )
            .unwrap()
    }

    #[test]
    fn drain_consumes_everything_and_stops() {
        let (mbox, _dir) = test_mbox();
        write_rows(&mbox, "orders", 5);

        let destination = MemoryConnector::new();
        let mut runner = SinkRunner::new(
            "mem-out",
            "orders",
            Box::new(destination.clone()),
        );
        let report = runner
            .drain(&mbox, Duration::from_millis(10))
            .unwrap();

        assert_eq!(report.processed, 5);
        assert_eq!(destination.rows().len(), 5);
        assert!(mbox
            .store()
            .read("orders", MessageStatus::Pending)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn drain_does_not_wait_for_other_subscribers() {
        let (mbox, _dir) = test_mbox();
        let ids = write_rows(&mbox, "orders", 2);

        // A second destination is registered but never runs.
        for id in &ids {
            mbox.subscriptions().subscribe(id, "orders", "mem-out").unwrap();
            mbox.subscriptions().subscribe(id, "orders", "laggard").unwrap();
        }

        let destination = MemoryConnector::new();
        let mut runner = SinkRunner::new("mem-out", "orders", Box::new(destination.clone()));
        let report = runner.drain(&mbox, Duration::from_millis(10)).unwrap();

        assert_eq!(report.processed, 2);
        // Messages stay Pending for the laggard; our drain must still return.
        assert_eq!(
            mbox.store().read("orders", MessageStatus::Pending).unwrap().len(),
            2
        );
    }

    #[test]
    fn spawned_service_consumes_then_stops_on_signal() {
        let (mbox, _dir) = test_mbox();
        write_rows(&mbox, "orders", 3);

        let destination = MemoryConnector::new();
        let runner = SinkRunner::new("mem-out", "orders", Box::new(destination.clone()));
        let handle = runner
            .spawn(Arc::clone(&mbox), Duration::from_millis(5))
            .unwrap();

        // Wait for the service to pick the batch up
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while destination.rows().len() < 3 && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }

        let total = handle.stop();
        assert_eq!(total.processed, 3);
        assert_eq!(destination.rows().len(), 3);
    }
}
