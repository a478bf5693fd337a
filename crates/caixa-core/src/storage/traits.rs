use crate::error::StorageResult;
use crate::message::{Message, Subscription};

/// Represents a single operation in an atomic write batch.
#[derive(Debug)]
pub enum WriteBatchOp {
    PutMessage { key: Vec<u8>, value: Vec<u8> },
    DeleteMessage { key: Vec<u8> },
    PutIndex { key: Vec<u8>, value: Vec<u8> },
    DeleteIndex { key: Vec<u8> },
    DeleteSubscription { key: Vec<u8> },
}

/// Storage trait for all persistence operations. Implementations must be
/// thread-safe: callers are independent connector instances with no
/// coordination between themselves.
///
/// The conditional operations (`update_message`, `put_subscription_if_absent`,
/// `update_subscription`) carry the system's only safety property. Each must
/// execute its load-check-write as one atomic step — the embedded-engine
/// equivalent of a single conditional UPDATE. Two concurrent callers must
/// never both observe the precondition as true.
pub trait Storage: Send + Sync {
    // --- Message operations ---

    /// Store a message in the messages CF.
    fn put_message(&self, key: &[u8], message: &Message) -> StorageResult<()>;

    /// Retrieve a message by its full key.
    fn get_message(&self, key: &[u8]) -> StorageResult<Option<Message>>;

    /// Visit messages whose keys start with the given prefix, in
    /// lexicographic (creation) order. The visitor returns `false` to stop
    /// early, which is what bounds memory for paged reads.
    fn scan_messages(
        &self,
        prefix: &[u8],
        visit: &mut dyn FnMut(&[u8], Message) -> bool,
    ) -> StorageResult<()>;

    /// Atomic conditional update of a single message row.
    ///
    /// Loads the message at `key` and applies `f`; when `f` returns
    /// `Some(updated)` the row is replaced and the updated message returned.
    /// When `f` declines (`None`) or the row does not exist, nothing is
    /// written and `Ok(None)` is returned.
    fn update_message(
        &self,
        key: &[u8],
        f: &dyn Fn(&Message) -> Option<Message>,
    ) -> StorageResult<Option<Message>>;

    // --- Index operations (message id → full message key) ---

    /// Look up the full message key for an id.
    fn get_index(&self, key: &[u8]) -> StorageResult<Option<Vec<u8>>>;

    // --- Subscription operations ---

    /// Store a subscription only if no row exists for the key. Returns `true`
    /// when the row was created, `false` when it already existed.
    fn put_subscription_if_absent(
        &self,
        key: &[u8],
        subscription: &Subscription,
    ) -> StorageResult<bool>;

    /// Retrieve a subscription by key.
    fn get_subscription(&self, key: &[u8]) -> StorageResult<Option<Subscription>>;

    /// Atomic conditional update of a single subscription row. Same contract
    /// as `update_message`.
    fn update_subscription(
        &self,
        key: &[u8],
        f: &dyn Fn(&Subscription) -> Subscription,
    ) -> StorageResult<Option<Subscription>>;

    /// List subscriptions whose keys start with the given prefix.
    fn list_subscriptions(&self, prefix: &[u8]) -> StorageResult<Vec<Subscription>>;

    // --- Batch operations ---

    /// Atomically apply a batch of write operations across column families.
    fn write_batch(&self, ops: Vec<WriteBatchOp>) -> StorageResult<()>;
}
