//! Key encoding for RocksDB column families.
//!
//! All numeric values use big-endian encoding for correct lexicographic
//! ordering. Composite keys use `:` (0x3A) as separator. Variable-length
//! strings are length-prefixed with a big-endian u16.

const SEPARATOR: u8 = b':';

/// Encode a u64 as 8 big-endian bytes.
fn encode_u64(val: u64) -> [u8; 8] {
    val.to_be_bytes()
}

/// Encode a variable-length string with a 2-byte big-endian length prefix.
fn encode_string(s: &str) -> Vec<u8> {
    let len = u16::try_from(s.len()).expect("key string exceeds 64 KiB");
    let mut buf = Vec::with_capacity(2 + s.len());
    buf.extend_from_slice(&len.to_be_bytes());
    buf.extend_from_slice(s.as_bytes());
    buf
}

/// Build a message key: `{interface}:{created_at_ms}:{batch_seq}:{msg_id}`
///
/// Key layout (binary):
/// - length-prefixed interface name
/// - separator
/// - 8-byte big-endian creation timestamp (ms)
/// - separator
/// - 4-byte big-endian position within the write batch
/// - separator
/// - 16-byte UUID (raw bytes, lexicographically sortable for UUIDv7)
///
/// A prefix scan over an interface therefore yields messages in creation
/// order, and input order within a batch even when the whole batch shares
/// one millisecond.
pub fn message_key(
    interface_name: &str,
    created_at_ms: u64,
    batch_seq: u32,
    msg_id: &uuid::Uuid,
) -> Vec<u8> {
    let mut key = Vec::with_capacity(64);
    key.extend_from_slice(&encode_string(interface_name));
    key.push(SEPARATOR);
    key.extend_from_slice(&encode_u64(created_at_ms));
    key.push(SEPARATOR);
    key.extend_from_slice(&batch_seq.to_be_bytes());
    key.push(SEPARATOR);
    key.extend_from_slice(msg_id.as_bytes());
    key
}

/// Build a prefix for iterating all messages on an interface.
pub fn message_prefix(interface_name: &str) -> Vec<u8> {
    let mut prefix = Vec::with_capacity(32);
    prefix.extend_from_slice(&encode_string(interface_name));
    prefix.push(SEPARATOR);
    prefix
}

/// Index key: the raw 16 UUID bytes. The index value is the full message key.
pub fn index_key(msg_id: &uuid::Uuid) -> Vec<u8> {
    msg_id.as_bytes().to_vec()
}

/// Build a subscription key: `{msg_id}:{subscriber}`.
/// The UUID is fixed-width, so no length prefix is needed before it.
pub fn subscription_key(msg_id: &uuid::Uuid, subscriber: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(17 + subscriber.len());
    key.extend_from_slice(msg_id.as_bytes());
    key.push(SEPARATOR);
    key.extend_from_slice(subscriber.as_bytes());
    key
}

/// Build a prefix for iterating all subscriptions of a message.
pub fn subscription_prefix(msg_id: &uuid::Uuid) -> Vec<u8> {
    let mut prefix = Vec::with_capacity(17);
    prefix.extend_from_slice(msg_id.as_bytes());
    prefix.push(SEPARATOR);
    prefix
}
