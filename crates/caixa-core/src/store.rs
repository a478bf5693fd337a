use std::sync::Arc;

use tracing::debug;
use uuid::Uuid;

use crate::clock;
use crate::error::{ExtractError, StorageResult, WriteError, WriteErrorKind};
use crate::message::{AdapterRole, Message, MessageStatus, Record};
use crate::storage::{keys, Storage, WriteBatchOp};

/// Durable persistence for debatched messages.
///
/// The write path is the debatcher: a batch of R uniform-schema records
/// becomes R independently addressable Pending messages, each with its own
/// lifecycle. There is no whole-batch atomicity: a failure on record k
/// leaves records 0..k persisted and reports exactly that.
pub struct MessageStore {
    storage: Arc<dyn Storage>,
}

impl MessageStore {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// Persist one Pending message per record, returning ids in input order.
    ///
    /// Each record is validated against `headers` before anything is
    /// persisted, so a malformed batch fails fast with nothing written.
    /// A storage failure partway through surfaces the ids persisted so far
    /// and the index of the record that failed.
    pub fn write(
        &self,
        interface_name: &str,
        adapter_name: &str,
        role: AdapterRole,
        adapter_instance_id: Uuid,
        headers: &[String],
        records: &[Record],
    ) -> Result<Vec<Uuid>, WriteError> {
        for (i, record) in records.iter().enumerate() {
            if let Err(detail) = check_record(headers, record) {
                return Err(WriteError {
                    failed_index: i,
                    persisted: Vec::new(),
                    kind: WriteErrorKind::HeaderMismatch(detail),
                });
            }
        }

        let created_at = clock::now_ms();
        let mut ids = Vec::with_capacity(records.len());

        for (i, record) in records.iter().enumerate() {
            match self.persist_one(
                interface_name,
                adapter_name,
                role,
                adapter_instance_id,
                headers,
                record,
                created_at,
                i as u32,
            ) {
                Ok(id) => ids.push(id),
                Err(e) => {
                    return Err(WriteError {
                        failed_index: i,
                        persisted: ids,
                        kind: WriteErrorKind::Storage(e),
                    })
                }
            }
        }

        debug!(
            interface = interface_name,
            adapter = adapter_name,
            count = ids.len(),
            "batch debatched into messages"
        );
        Ok(ids)
    }

    #[allow(clippy::too_many_arguments)]
    fn persist_one(
        &self,
        interface_name: &str,
        adapter_name: &str,
        role: AdapterRole,
        adapter_instance_id: Uuid,
        headers: &[String],
        record: &Record,
        created_at: u64,
        batch_seq: u32,
    ) -> StorageResult<Uuid> {
        let message = Message {
            id: Message::new_id(),
            interface_name: interface_name.to_string(),
            producing_adapter_name: adapter_name.to_string(),
            producing_role: role,
            adapter_instance_id,
            headers: headers.to_vec(),
            payload: serde_json::to_vec(record)?,
            status: MessageStatus::Pending,
            lease_expires_at: None,
            created_at,
            locked_at: None,
            processed_at: None,
            error_message: None,
        };

        let key = keys::message_key(interface_name, created_at, batch_seq, &message.id);
        let value = serde_json::to_vec(&message)?;

        // Message row and its id index land together or not at all.
        self.storage.write_batch(vec![
            WriteBatchOp::PutMessage {
                key: key.clone(),
                value,
            },
            WriteBatchOp::PutIndex {
                key: keys::index_key(&message.id),
                value: key,
            },
        ])?;

        Ok(message.id)
    }

    /// All messages on an interface with the given status, oldest first.
    /// No side effects, no locking.
    pub fn read(&self, interface_name: &str, status: MessageStatus) -> StorageResult<Vec<Message>> {
        self.read_limit(interface_name, status, None)
    }

    /// Bounded variant of `read`: stops once `limit` matching messages have
    /// been collected, so a large Pending backlog cannot blow up memory.
    pub fn read_limit(
        &self,
        interface_name: &str,
        status: MessageStatus,
        limit: Option<usize>,
    ) -> StorageResult<Vec<Message>> {
        let prefix = keys::message_prefix(interface_name);
        let mut results = Vec::new();
        self.storage.scan_messages(&prefix, &mut |_, msg| {
            if msg.status == status {
                results.push(msg);
            }
            match limit {
                Some(n) => results.len() < n,
                None => true,
            }
        })?;
        Ok(results)
    }

    /// Point lookup by message id via the index column family.
    pub fn get(&self, message_id: &Uuid) -> StorageResult<Option<Message>> {
        match self.storage.get_index(&keys::index_key(message_id))? {
            Some(key) => self.storage.get_message(&key),
            None => Ok(None),
        }
    }

    /// Parse a message's payload back into `(headers, record)`.
    pub fn extract(&self, message: &Message) -> Result<(Vec<String>, Record), ExtractError> {
        message.extract()
    }

    /// Delete a message, its index entry, and its subscription rows in one
    /// atomic batch. Returns `false` when the message was already gone:
    /// two consumers of the same message can race to remove it after fan-out
    /// completes, and the loser must not error.
    ///
    /// The store does not check subscription state here; the caller gates on
    /// `all_processed` first.
    pub fn remove(&self, message_id: &Uuid) -> StorageResult<bool> {
        let idx_key = keys::index_key(message_id);
        let Some(msg_key) = self.storage.get_index(&idx_key)? else {
            return Ok(false);
        };

        let mut ops = vec![
            WriteBatchOp::DeleteMessage { key: msg_key },
            WriteBatchOp::DeleteIndex { key: idx_key },
        ];
        for sub in self
            .storage
            .list_subscriptions(&keys::subscription_prefix(message_id))?
        {
            ops.push(WriteBatchOp::DeleteSubscription {
                key: keys::subscription_key(message_id, &sub.subscriber),
            });
        }

        self.storage.write_batch(ops)?;
        debug!(%message_id, "message removed");
        Ok(true)
    }
}

fn check_record(headers: &[String], record: &Record) -> Result<(), String> {
    let missing: Vec<&String> = headers.iter().filter(|h| !record.contains_key(*h)).collect();
    let unexpected: Vec<&String> = record.keys().filter(|k| !headers.contains(k)).collect();
    if missing.is_empty() && unexpected.is_empty() {
        Ok(())
    } else {
        Err(format!("missing {missing:?}, unexpected {unexpected:?}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::RocksDbStorage;

    fn test_store() -> (MessageStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(RocksDbStorage::open(dir.path()).unwrap());
        (MessageStore::new(storage), dir)
    }

    fn record(pairs: &[(&str, &str)]) -> Record {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn id_headers() -> Vec<String> {
        vec!["id".to_string()]
    }

    fn write_ids(store: &MessageStore, interface: &str, records: &[Record]) -> Vec<Uuid> {
        store
            .write(
                interface,
                "csv-in",
                AdapterRole::Source,
                Uuid::new_v4(),
                &id_headers(),
                records,
            )
            .unwrap()
    }

    #[test]
    fn write_returns_one_id_per_record_in_order() {
        let (store, _dir) = test_store();
        let records = vec![
            record(&[("id", "1")]),
            record(&[("id", "2")]),
            record(&[("id", "3")]),
        ];

        let ids = write_ids(&store, "orders", &records);
        assert_eq!(ids.len(), 3);

        for (id, rec) in ids.iter().zip(&records) {
            let msg = store.get(id).unwrap().unwrap();
            assert_eq!(msg.status, MessageStatus::Pending);
            let (headers, extracted) = store.extract(&msg).unwrap();
            assert_eq!(headers, id_headers());
            assert_eq!(&extracted, rec);
        }
    }

    #[test]
    fn read_returns_pending_in_creation_order() {
        let (store, _dir) = test_store();
        let records = vec![
            record(&[("id", "1")]),
            record(&[("id", "2")]),
            record(&[("id", "3")]),
        ];
        let ids = write_ids(&store, "orders", &records);

        let pending = store.read("orders", MessageStatus::Pending).unwrap();
        assert_eq!(
            pending.iter().map(|m| m.id).collect::<Vec<_>>(),
            ids,
            "read should preserve write order"
        );

        // Other statuses and other interfaces are excluded
        assert!(store.read("orders", MessageStatus::Error).unwrap().is_empty());
        assert!(store
            .read("inventory", MessageStatus::Pending)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn read_limit_bounds_result() {
        let (store, _dir) = test_store();
        let records: Vec<Record> = (0..10).map(|i| record(&[("id", &i.to_string())])).collect();
        write_ids(&store, "orders", &records);

        let page = store
            .read_limit("orders", MessageStatus::Pending, Some(4))
            .unwrap();
        assert_eq!(page.len(), 4);

        let all = store
            .read_limit("orders", MessageStatus::Pending, None)
            .unwrap();
        assert_eq!(all.len(), 10);
    }

    #[test]
    fn write_rejects_record_not_matching_headers() {
        let (store, _dir) = test_store();
        let records = vec![record(&[("id", "1")]), record(&[("name", "x")])];

        let err = store
            .write(
                "orders",
                "csv-in",
                AdapterRole::Source,
                Uuid::new_v4(),
                &id_headers(),
                &records,
            )
            .unwrap_err();

        assert_eq!(err.failed_index, 1);
        assert!(err.persisted.is_empty(), "validation precedes persistence");
        assert!(matches!(err.kind, WriteErrorKind::HeaderMismatch(_)));
        assert!(store.read("orders", MessageStatus::Pending).unwrap().is_empty());
    }

    #[test]
    fn remove_deletes_message_and_is_idempotent() {
        let (store, _dir) = test_store();
        let ids = write_ids(&store, "orders", &[record(&[("id", "1")])]);

        assert!(store.remove(&ids[0]).unwrap());
        assert!(store.get(&ids[0]).unwrap().is_none());
        assert!(store.read("orders", MessageStatus::Pending).unwrap().is_empty());

        assert!(!store.remove(&ids[0]).unwrap(), "second remove is a no-op");
    }
}
