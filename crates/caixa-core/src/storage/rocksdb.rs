use std::path::Path;
use std::sync::Mutex;

use rocksdb::{
    ColumnFamilyDescriptor, DBWithThreadMode, Direction, IteratorMode, MultiThreaded, Options,
    WriteBatch,
};

use crate::error::{StorageError, StorageResult};
use crate::message::{Message, Subscription};
use crate::storage::traits::{Storage, WriteBatchOp};

const CF_MESSAGES: &str = "messages";
const CF_MESSAGE_INDEX: &str = "message_index";
const CF_SUBSCRIPTIONS: &str = "subscriptions";

/// All column family names (excluding `default` which RocksDB creates automatically).
const COLUMN_FAMILIES: &[&str] = &[CF_MESSAGES, CF_MESSAGE_INDEX, CF_SUBSCRIPTIONS];

type DB = DBWithThreadMode<MultiThreaded>;

/// RocksDB-backed storage implementation.
///
/// Plain puts and gets go straight to the engine (RocksDB is internally
/// thread-safe). The conditional operations serialize behind `update_lock`
/// so that the check and the write form one atomic step — this is what makes
/// lease acquisition safe under concurrent callers.
pub struct RocksDbStorage {
    db: DB,
    update_lock: Mutex<()>,
}

impl RocksDbStorage {
    /// Open or create a RocksDB database at the given path with all column families.
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);

        let cf_descriptors: Vec<ColumnFamilyDescriptor> = COLUMN_FAMILIES
            .iter()
            .map(|name| {
                let cf_opts = Options::default();
                ColumnFamilyDescriptor::new(*name, cf_opts)
            })
            .collect();

        let db = DB::open_cf_descriptors(&db_opts, path, cf_descriptors)?;
        Ok(Self {
            db,
            update_lock: Mutex::new(()),
        })
    }

    fn cf(&self, name: &str) -> StorageResult<std::sync::Arc<rocksdb::BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StorageError::RocksDb(format!("column family not found: {name}")))
    }
}

impl Storage for RocksDbStorage {
    fn put_message(&self, key: &[u8], message: &Message) -> StorageResult<()> {
        let cf = self.cf(CF_MESSAGES)?;
        let value = serde_json::to_vec(message)?;
        self.db.put_cf(&cf, key, &value)?;
        Ok(())
    }

    fn get_message(&self, key: &[u8]) -> StorageResult<Option<Message>> {
        let cf = self.cf(CF_MESSAGES)?;
        match self.db.get_cf(&cf, key)? {
            Some(value) => Ok(Some(serde_json::from_slice(&value)?)),
            None => Ok(None),
        }
    }

    fn scan_messages(
        &self,
        prefix: &[u8],
        visit: &mut dyn FnMut(&[u8], Message) -> bool,
    ) -> StorageResult<()> {
        let cf = self.cf(CF_MESSAGES)?;
        let iter = self
            .db
            .iterator_cf(&cf, IteratorMode::From(prefix, Direction::Forward));
        for item in iter {
            let (key, value) = item?;
            if !key.starts_with(prefix) {
                break;
            }
            let msg: Message = serde_json::from_slice(&value)?;
            if !visit(&key, msg) {
                break;
            }
        }
        Ok(())
    }

    fn update_message(
        &self,
        key: &[u8],
        f: &dyn Fn(&Message) -> Option<Message>,
    ) -> StorageResult<Option<Message>> {
        let _guard = self
            .update_lock
            .lock()
            .map_err(|_| StorageError::RocksDb("update lock poisoned".to_string()))?;

        let cf = self.cf(CF_MESSAGES)?;
        let Some(value) = self.db.get_cf(&cf, key)? else {
            return Ok(None);
        };
        let current: Message = serde_json::from_slice(&value)?;

        match f(&current) {
            Some(updated) => {
                let new_value = serde_json::to_vec(&updated)?;
                self.db.put_cf(&cf, key, &new_value)?;
                Ok(Some(updated))
            }
            None => Ok(None),
        }
    }

    fn get_index(&self, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        let cf = self.cf(CF_MESSAGE_INDEX)?;
        Ok(self.db.get_cf(&cf, key)?.map(|v| v.to_vec()))
    }

    fn put_subscription_if_absent(
        &self,
        key: &[u8],
        subscription: &Subscription,
    ) -> StorageResult<bool> {
        let _guard = self
            .update_lock
            .lock()
            .map_err(|_| StorageError::RocksDb("update lock poisoned".to_string()))?;

        let cf = self.cf(CF_SUBSCRIPTIONS)?;
        if self.db.get_cf(&cf, key)?.is_some() {
            return Ok(false);
        }
        let value = serde_json::to_vec(subscription)?;
        self.db.put_cf(&cf, key, &value)?;
        Ok(true)
    }

    fn get_subscription(&self, key: &[u8]) -> StorageResult<Option<Subscription>> {
        let cf = self.cf(CF_SUBSCRIPTIONS)?;
        match self.db.get_cf(&cf, key)? {
            Some(value) => Ok(Some(serde_json::from_slice(&value)?)),
            None => Ok(None),
        }
    }

    fn update_subscription(
        &self,
        key: &[u8],
        f: &dyn Fn(&Subscription) -> Subscription,
    ) -> StorageResult<Option<Subscription>> {
        let _guard = self
            .update_lock
            .lock()
            .map_err(|_| StorageError::RocksDb("update lock poisoned".to_string()))?;

        let cf = self.cf(CF_SUBSCRIPTIONS)?;
        let Some(value) = self.db.get_cf(&cf, key)? else {
            return Ok(None);
        };
        let current: Subscription = serde_json::from_slice(&value)?;
        let updated = f(&current);
        let new_value = serde_json::to_vec(&updated)?;
        self.db.put_cf(&cf, key, &new_value)?;
        Ok(Some(updated))
    }

    fn list_subscriptions(&self, prefix: &[u8]) -> StorageResult<Vec<Subscription>> {
        let cf = self.cf(CF_SUBSCRIPTIONS)?;
        let iter = self
            .db
            .iterator_cf(&cf, IteratorMode::From(prefix, Direction::Forward));
        let mut results = Vec::new();
        for item in iter {
            let (key, value) = item?;
            if !key.starts_with(prefix) {
                break;
            }
            results.push(serde_json::from_slice(&value)?);
        }
        Ok(results)
    }

    fn write_batch(&self, ops: Vec<WriteBatchOp>) -> StorageResult<()> {
        let mut batch = WriteBatch::default();

        for op in ops {
            match op {
                WriteBatchOp::PutMessage { key, value } => {
                    batch.put_cf(&self.cf(CF_MESSAGES)?, &key, &value);
                }
                WriteBatchOp::DeleteMessage { key } => {
                    batch.delete_cf(&self.cf(CF_MESSAGES)?, &key);
                }
                WriteBatchOp::PutIndex { key, value } => {
                    batch.put_cf(&self.cf(CF_MESSAGE_INDEX)?, &key, &value);
                }
                WriteBatchOp::DeleteIndex { key } => {
                    batch.delete_cf(&self.cf(CF_MESSAGE_INDEX)?, &key);
                }
                WriteBatchOp::DeleteSubscription { key } => {
                    batch.delete_cf(&self.cf(CF_SUBSCRIPTIONS)?, &key);
                }
            }
        }

        self.db.write(batch)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock;
    use crate::message::{AdapterRole, MessageStatus, SubscriptionStatus};
    use crate::storage::keys;
    use uuid::Uuid;

    fn test_storage() -> (RocksDbStorage, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let storage = RocksDbStorage::open(dir.path()).unwrap();
        (storage, dir)
    }

    fn test_message(interface: &str) -> Message {
        Message {
            id: Uuid::now_v7(),
            interface_name: interface.to_string(),
            producing_adapter_name: "csv-in".to_string(),
            producing_role: AdapterRole::Source,
            adapter_instance_id: Uuid::new_v4(),
            headers: vec!["id".to_string()],
            payload: br#"{"id":"1"}"#.to_vec(),
            status: MessageStatus::Pending,
            lease_expires_at: None,
            created_at: 1_000,
            locked_at: None,
            processed_at: None,
            error_message: None,
        }
    }

    fn test_subscription(msg_id: Uuid, subscriber: &str) -> Subscription {
        Subscription {
            message_id: msg_id,
            interface_name: "orders".to_string(),
            subscriber: subscriber.to_string(),
            status: SubscriptionStatus::Pending,
            error_detail: None,
            created_at: clock::now_ms(),
            resolved_at: None,
        }
    }

    #[test]
    fn open_creates_all_column_families() {
        let (storage, _dir) = test_storage();
        for cf_name in COLUMN_FAMILIES {
            assert!(
                storage.db.cf_handle(cf_name).is_some(),
                "column family '{cf_name}' should exist"
            );
        }
    }

    #[test]
    fn message_put_get() {
        let (storage, _dir) = test_storage();
        let msg = test_message("orders");
        let key = keys::message_key(&msg.interface_name, msg.created_at, 0, &msg.id);

        storage.put_message(&key, &msg).unwrap();
        let retrieved = storage.get_message(&key).unwrap().unwrap();
        assert_eq!(retrieved, msg);
    }

    #[test]
    fn scan_respects_prefix_and_stop() {
        let (storage, _dir) = test_storage();

        for (i, interface) in ["orders", "orders", "inventory"].iter().enumerate() {
            let mut msg = test_message(interface);
            msg.created_at = 1_000 + i as u64;
            let key = keys::message_key(interface, msg.created_at, 0, &msg.id);
            storage.put_message(&key, &msg).unwrap();
        }

        let mut seen = 0;
        storage
            .scan_messages(&keys::message_prefix("orders"), &mut |_, _| {
                seen += 1;
                true
            })
            .unwrap();
        assert_eq!(seen, 2, "should visit only the 2 'orders' messages");

        let mut limited = 0;
        storage
            .scan_messages(&keys::message_prefix("orders"), &mut |_, _| {
                limited += 1;
                false
            })
            .unwrap();
        assert_eq!(limited, 1, "visitor returning false should stop the scan");
    }

    #[test]
    fn update_message_applies_or_declines() {
        let (storage, _dir) = test_storage();
        let msg = test_message("orders");
        let key = keys::message_key(&msg.interface_name, msg.created_at, 0, &msg.id);
        storage.put_message(&key, &msg).unwrap();

        // Condition met: Pending → InProgress
        let updated = storage
            .update_message(&key, &|m| {
                if m.status == MessageStatus::Pending {
                    let mut next = m.clone();
                    next.status = MessageStatus::InProgress;
                    next.lease_expires_at = Some(9_999);
                    Some(next)
                } else {
                    None
                }
            })
            .unwrap();
        assert_eq!(updated.unwrap().status, MessageStatus::InProgress);

        // Condition no longer met: closure declines, row untouched
        let declined = storage
            .update_message(&key, &|m| {
                if m.status == MessageStatus::Pending {
                    Some(m.clone())
                } else {
                    None
                }
            })
            .unwrap();
        assert!(declined.is_none());
        assert_eq!(
            storage.get_message(&key).unwrap().unwrap().status,
            MessageStatus::InProgress
        );
    }

    #[test]
    fn update_message_missing_row_is_none() {
        let (storage, _dir) = test_storage();
        let result = storage
            .update_message(b"no-such-key", &|m| Some(m.clone()))
            .unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn subscription_if_absent_is_idempotent() {
        let (storage, _dir) = test_storage();
        let msg_id = Uuid::now_v7();
        let key = keys::subscription_key(&msg_id, "sql-out");
        let sub = test_subscription(msg_id, "sql-out");

        assert!(storage.put_subscription_if_absent(&key, &sub).unwrap());
        assert!(!storage.put_subscription_if_absent(&key, &sub).unwrap());

        let listed = storage
            .list_subscriptions(&keys::subscription_prefix(&msg_id))
            .unwrap();
        assert_eq!(listed.len(), 1);
    }

    #[test]
    fn write_batch_atomicity() {
        let (storage, _dir) = test_storage();
        let msg = test_message("orders");
        let msg_key = keys::message_key(&msg.interface_name, msg.created_at, 0, &msg.id);
        let idx_key = keys::index_key(&msg.id);
        let msg_value = serde_json::to_vec(&msg).unwrap();

        storage
            .write_batch(vec![
                WriteBatchOp::PutMessage {
                    key: msg_key.clone(),
                    value: msg_value,
                },
                WriteBatchOp::PutIndex {
                    key: idx_key.clone(),
                    value: msg_key.clone(),
                },
            ])
            .unwrap();

        assert!(storage.get_message(&msg_key).unwrap().is_some());
        assert_eq!(storage.get_index(&idx_key).unwrap().unwrap(), msg_key);

        storage
            .write_batch(vec![
                WriteBatchOp::DeleteMessage {
                    key: msg_key.clone(),
                },
                WriteBatchOp::DeleteIndex {
                    key: idx_key.clone(),
                },
            ])
            .unwrap();

        assert!(storage.get_message(&msg_key).unwrap().is_none());
        assert!(storage.get_index(&idx_key).unwrap().is_none());
    }

    #[test]
    fn reopen_preserves_data() {
        let dir = tempfile::tempdir().unwrap();
        let msg = test_message("orders");
        let key = keys::message_key(&msg.interface_name, msg.created_at, 0, &msg.id);

        {
            let storage = RocksDbStorage::open(dir.path()).unwrap();
            storage.put_message(&key, &msg).unwrap();
        }

        {
            let storage = RocksDbStorage::open(dir.path()).unwrap();
            let retrieved = storage.get_message(&key).unwrap().unwrap();
            assert_eq!(retrieved.id, msg.id);
        }
    }

    #[test]
    fn concurrent_conditional_updates_apply_once() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;

        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(RocksDbStorage::open(dir.path()).unwrap());
        let msg = test_message("orders");
        let key = keys::message_key(&msg.interface_name, msg.created_at, 0, &msg.id);
        storage.put_message(&key, &msg).unwrap();

        let wins = Arc::new(AtomicUsize::new(0));
        std::thread::scope(|s| {
            for _ in 0..8 {
                let storage = Arc::clone(&storage);
                let wins = Arc::clone(&wins);
                let key = key.clone();
                s.spawn(move || {
                    let result = storage
                        .update_message(&key, &|m| {
                            if m.status == MessageStatus::Pending {
                                let mut next = m.clone();
                                next.status = MessageStatus::InProgress;
                                Some(next)
                            } else {
                                None
                            }
                        })
                        .unwrap();
                    if result.is_some() {
                        wins.fetch_add(1, Ordering::SeqCst);
                    }
                });
            }
        });

        assert_eq!(
            wins.load(Ordering::SeqCst),
            1,
            "exactly one thread should win the conditional update"
        );
    }
}
