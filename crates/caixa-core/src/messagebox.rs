use std::path::Path;
use std::sync::Arc;

use crate::config::MessageBoxConfig;
use crate::error::StorageResult;
use crate::lease::LeaseManager;
use crate::storage::{RocksDbStorage, Storage};
use crate::store::MessageStore;
use crate::subscription::SubscriptionTracker;

/// The shared message box: store, lease machinery, and fan-out bookkeeping
/// over one storage engine. Source connectors write into it; destination
/// connectors poll, lease, and consume from it. Connectors in the same
/// deployment hold clones of the inner `Arc`.
pub struct MessageBox {
    store: MessageStore,
    leases: LeaseManager,
    subscriptions: SubscriptionTracker,
    config: MessageBoxConfig,
}

impl MessageBox {
    /// Open (or create) a RocksDB-backed message box at the given path.
    pub fn open(path: impl AsRef<Path>, config: MessageBoxConfig) -> StorageResult<Self> {
        let storage: Arc<dyn Storage> = Arc::new(RocksDbStorage::open(path)?);
        Ok(Self::with_storage(storage, config))
    }

    /// Build a message box over an existing storage handle.
    pub fn with_storage(storage: Arc<dyn Storage>, config: MessageBoxConfig) -> Self {
        Self {
            store: MessageStore::new(Arc::clone(&storage)),
            leases: LeaseManager::new(Arc::clone(&storage)),
            subscriptions: SubscriptionTracker::new(storage),
            config,
        }
    }

    pub fn store(&self) -> &MessageStore {
        &self.store
    }

    pub fn leases(&self) -> &LeaseManager {
        &self.leases
    }

    pub fn subscriptions(&self) -> &SubscriptionTracker {
        &self.subscriptions
    }

    pub fn config(&self) -> &MessageBoxConfig {
        &self.config
    }
}
