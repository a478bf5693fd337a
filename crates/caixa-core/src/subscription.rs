use std::sync::Arc;

use tracing::debug;
use uuid::Uuid;

use crate::clock;
use crate::error::{StorageResult, SubscriptionError};
use crate::message::{Subscription, SubscriptionStatus};
use crate::storage::{keys, Storage};

/// Per-(message, subscriber) completion bookkeeping.
///
/// N independent destination adapters each track their own completion of the
/// same produced message; a message becomes eligible for garbage collection
/// only once every subscriber has processed it.
pub struct SubscriptionTracker {
    storage: Arc<dyn Storage>,
}

impl SubscriptionTracker {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// Register a subscriber's claim on a message. Idempotent: subscribing
    /// twice with the same key is a no-op, not an error.
    pub fn subscribe(
        &self,
        message_id: &Uuid,
        interface_name: &str,
        subscriber: &str,
    ) -> StorageResult<()> {
        let subscription = Subscription {
            message_id: *message_id,
            interface_name: interface_name.to_string(),
            subscriber: subscriber.to_string(),
            status: SubscriptionStatus::Pending,
            error_detail: None,
            created_at: clock::now_ms(),
            resolved_at: None,
        };
        let created = self.storage.put_subscription_if_absent(
            &keys::subscription_key(message_id, subscriber),
            &subscription,
        )?;
        if created {
            debug!(%message_id, subscriber, "subscription created");
        }
        Ok(())
    }

    /// Mark this subscriber's copy of the message as successfully consumed.
    /// `detail` has no persisted field on success and is only logged.
    pub fn resolve_processed(
        &self,
        message_id: &Uuid,
        subscriber: &str,
        detail: Option<&str>,
    ) -> Result<(), SubscriptionError> {
        self.resolve(message_id, subscriber, SubscriptionStatus::Processed, None)?;
        debug!(%message_id, subscriber, detail = detail.unwrap_or(""), "subscription processed");
        Ok(())
    }

    /// Mark this subscriber's copy as failed, recording the failure text.
    /// An Error subscription keeps `all_processed` false indefinitely; the
    /// only way out is re-resolving it (an operator action).
    pub fn resolve_error(
        &self,
        message_id: &Uuid,
        subscriber: &str,
        detail: Option<&str>,
    ) -> Result<(), SubscriptionError> {
        self.resolve(
            message_id,
            subscriber,
            SubscriptionStatus::Error,
            detail.map(str::to_string),
        )?;
        debug!(%message_id, subscriber, detail = detail.unwrap_or(""), "subscription errored");
        Ok(())
    }

    fn resolve(
        &self,
        message_id: &Uuid,
        subscriber: &str,
        status: SubscriptionStatus,
        error_detail: Option<String>,
    ) -> Result<(), SubscriptionError> {
        let now = clock::now_ms();
        let updated = self.storage.update_subscription(
            &keys::subscription_key(message_id, subscriber),
            &|s| {
                let mut next = s.clone();
                next.status = status;
                next.error_detail = error_detail.clone();
                next.resolved_at = Some(now);
                next
            },
        )?;
        match updated {
            Some(_) => Ok(()),
            None => Err(SubscriptionError::SubscriptionNotFound {
                message_id: *message_id,
                subscriber: subscriber.to_string(),
            }),
        }
    }

    /// One subscriber's subscription on a message, if any.
    pub fn subscription(
        &self,
        message_id: &Uuid,
        subscriber: &str,
    ) -> StorageResult<Option<Subscription>> {
        self.storage
            .get_subscription(&keys::subscription_key(message_id, subscriber))
    }

    /// All subscriptions of a message, in subscriber order.
    pub fn subscriptions(&self, message_id: &Uuid) -> StorageResult<Vec<Subscription>> {
        self.storage
            .list_subscriptions(&keys::subscription_prefix(message_id))
    }

    /// True iff at least one subscription exists and every one is Processed.
    /// Computed on demand, never stored.
    pub fn all_processed(&self, message_id: &Uuid) -> StorageResult<bool> {
        let subs = self.subscriptions(message_id)?;
        Ok(!subs.is_empty() && subs.iter().all(|s| s.status == SubscriptionStatus::Processed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::RocksDbStorage;

    fn test_tracker() -> (SubscriptionTracker, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(RocksDbStorage::open(dir.path()).unwrap());
        (SubscriptionTracker::new(storage), dir)
    }

    #[test]
    fn subscribe_is_idempotent() {
        let (tracker, _dir) = test_tracker();
        let id = Uuid::now_v7();

        tracker.subscribe(&id, "orders", "sql-out").unwrap();
        tracker.subscribe(&id, "orders", "sql-out").unwrap();

        let subs = tracker.subscriptions(&id).unwrap();
        assert_eq!(subs.len(), 1);
        assert_eq!(subs[0].status, SubscriptionStatus::Pending);
    }

    #[test]
    fn all_processed_requires_at_least_one_subscription() {
        let (tracker, _dir) = test_tracker();
        let id = Uuid::now_v7();
        assert!(!tracker.all_processed(&id).unwrap());
    }

    #[test]
    fn two_subscribers_complete_independently() {
        let (tracker, _dir) = test_tracker();
        let id = Uuid::now_v7();

        tracker.subscribe(&id, "orders", "x").unwrap();
        tracker.subscribe(&id, "orders", "y").unwrap();

        tracker.resolve_processed(&id, "x", None).unwrap();
        assert!(
            !tracker.all_processed(&id).unwrap(),
            "one of two subscribers done is not all"
        );

        tracker.resolve_processed(&id, "y", None).unwrap();
        assert!(tracker.all_processed(&id).unwrap());
    }

    #[test]
    fn error_subscription_pins_all_processed_false() {
        let (tracker, _dir) = test_tracker();
        let id = Uuid::now_v7();

        tracker.subscribe(&id, "orders", "x").unwrap();
        tracker.subscribe(&id, "orders", "y").unwrap();

        tracker.resolve_processed(&id, "x", None).unwrap();
        tracker
            .resolve_error(&id, "y", Some("constraint violation"))
            .unwrap();
        assert!(!tracker.all_processed(&id).unwrap());

        let subs = tracker.subscriptions(&id).unwrap();
        let errored = subs.iter().find(|s| s.subscriber == "y").unwrap();
        assert_eq!(errored.status, SubscriptionStatus::Error);
        assert_eq!(errored.error_detail.as_deref(), Some("constraint violation"));
        assert!(errored.resolved_at.is_some());

        // Operator re-resolves the stuck subscription
        tracker.resolve_processed(&id, "y", None).unwrap();
        assert!(tracker.all_processed(&id).unwrap());
        let subs = tracker.subscriptions(&id).unwrap();
        let recovered = subs.iter().find(|s| s.subscriber == "y").unwrap();
        assert!(recovered.error_detail.is_none());
    }

    #[test]
    fn resolving_unknown_subscription_is_not_found() {
        let (tracker, _dir) = test_tracker();
        let id = Uuid::now_v7();

        assert!(matches!(
            tracker.resolve_processed(&id, "ghost", None),
            Err(SubscriptionError::SubscriptionNotFound { .. })
        ));
    }
}
