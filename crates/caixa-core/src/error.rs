use uuid::Uuid;

/// Low-level storage errors (RocksDB, serialization).
/// This is the error type for the `Storage` trait — storage operations can
/// only fail with infrastructure errors, never domain errors.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("rocksdb error: {0}")]
    RocksDb(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("corrupt data: {0}")]
    CorruptData(String),
}

impl From<rocksdb::Error> for StorageError {
    fn from(err: rocksdb::Error) -> Self {
        StorageError::RocksDb(err.into_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

pub type StorageResult<T> = std::result::Result<T, StorageError>;

// --- Per-operation error types ---

/// How a batch write stopped partway. Records already persisted stay
/// persisted — their ids are retained here so the caller can observe exactly
/// which records made it.
#[derive(Debug, thiserror::Error)]
#[error("batch write failed at record {failed_index} ({} records already persisted): {kind}", .persisted.len())]
pub struct WriteError {
    /// Index into the input batch of the record that failed.
    pub failed_index: usize,
    /// Ids of the records persisted before the failure, in input order.
    pub persisted: Vec<Uuid>,
    #[source]
    pub kind: WriteErrorKind,
}

#[derive(Debug, thiserror::Error)]
pub enum WriteErrorKind {
    #[error("record keys do not match batch headers: {0}")]
    HeaderMismatch(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// A persisted payload that cannot be parsed against its own headers.
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("payload does not deserialize: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("payload keys do not match headers (missing {missing:?}, unexpected {unexpected:?})")]
    HeaderMismatch {
        missing: Vec<String>,
        unexpected: Vec<String>,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum LeaseError {
    #[error("message not found: {0}")]
    MessageNotFound(Uuid),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

#[derive(Debug, thiserror::Error)]
pub enum SubscriptionError {
    #[error("no subscription for message {message_id} and subscriber {subscriber}")]
    SubscriptionNotFound { message_id: Uuid, subscriber: String },

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Fatal errors of a consumption cycle. Per-message failures (a sink write
/// that throws, a payload that does not parse) are not errors of the cycle —
/// they quarantine the message and the loop continues.
#[derive(Debug, thiserror::Error)]
pub enum ConsumeError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Lease(#[from] LeaseError),

    #[error(transparent)]
    Subscription(#[from] SubscriptionError),
}
