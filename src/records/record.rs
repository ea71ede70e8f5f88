//! Immutable snapshot of one received message.

use crate::connection::Connection;
use crate::error::Result;
use crate::message::{FieldMessage, FieldValue, MessageError, MessageHandle, TRACKING_FIELD, TRACKING_ID_FIELD};
use crate::types::{Sequence, Subject, Timestamp};
use parking_lot::RwLock;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, Weak};
use tracing::debug;

/// Next sequence number to hand out.
static NEXT_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Held shared while a record takes a sequence number, exclusively by reset.
static SEQUENCE_GUARD: RwLock<()> = parking_lot::const_rwlock(());

fn next_sequence() -> Sequence {
    let _guard = SEQUENCE_GUARD.read();
    Sequence(NEXT_SEQUENCE.fetch_add(1, Ordering::SeqCst))
}

/// Reset the global sequence counter to zero.
///
/// Test-only. Waits for in-flight record construction to finish, but
/// records built before the reset keep their numbers, so calling this
/// while live traffic is flowing breaks sequence uniqueness.
pub fn reset_sequence_counter() {
    let _guard = SEQUENCE_GUARD.write();
    NEXT_SEQUENCE.store(0, Ordering::SeqCst);
}

struct RecordInner {
    sequence: Sequence,
    timestamp: Timestamp,
    connection: Option<Weak<Connection>>,
    /// Captured on arrival; outlives the connection itself.
    connection_name: Option<Arc<str>>,
    subject: Subject,
    size: usize,
    message: Arc<dyn MessageHandle>,
    tracking_id: OnceLock<String>,
}

/// One captured message plus its arrival metadata.
///
/// Cloning is cheap and yields the same record. Two records are equal
/// iff their sequence numbers are equal.
#[derive(Clone)]
pub struct Record {
    inner: Arc<RecordInner>,
}

impl Record {
    /// Build a record for a message that just arrived.
    ///
    /// Never fails: a message whose size cannot be computed is recorded
    /// as zero bytes, and a missing subject becomes [`Subject::none`].
    pub fn new(
        connection: Option<&Arc<Connection>>,
        message: Arc<dyn MessageHandle>,
        timestamp: Option<Timestamp>,
    ) -> Self {
        let sequence = next_sequence();
        let timestamp = timestamp.unwrap_or_else(Timestamp::now);
        let subject = message.subject().map(Subject::new).unwrap_or_default();
        let size = match message.encoded_size() {
            Ok(size) => size,
            Err(e) => {
                debug!(sequence = sequence.0, error = %e, "could not size message");
                0
            }
        };

        Self {
            inner: Arc::new(RecordInner {
                sequence,
                timestamp,
                connection: connection.map(Arc::downgrade),
                connection_name: connection.map(|c| Arc::from(c.name())),
                subject,
                size,
                message,
                tracking_id: OnceLock::new(),
            }),
        }
    }

    /// Convenience for records with no connection.
    pub fn from_message(message: impl MessageHandle + 'static) -> Self {
        Self::new(None, Arc::new(message), None)
    }

    /// Rebuild a record from encoded message bytes (paste/import).
    pub fn from_bytes(bytes: &[u8], timestamp: Option<Timestamp>) -> Result<Self> {
        let message = FieldMessage::decode(bytes)
            .map_err(|e| crate::error::LedgerError::Deserialization(e.to_string()))?;
        Ok(Self::new(None, Arc::new(message), timestamp))
    }

    pub fn sequence(&self) -> Sequence {
        self.inner.sequence
    }

    pub fn timestamp(&self) -> Timestamp {
        self.inner.timestamp
    }

    /// The originating connection, if it is still alive.
    pub fn connection(&self) -> Option<Arc<Connection>> {
        self.inner.connection.as_ref().and_then(Weak::upgrade)
    }

    /// Name of the connection the record arrived on, even if that
    /// connection has since been dropped.
    pub fn connection_name(&self) -> Option<&str> {
        self.inner.connection_name.as_deref()
    }

    pub fn subject(&self) -> &Subject {
        &self.inner.subject
    }

    pub fn reply_subject(&self) -> Option<&str> {
        self.inner.message.reply_subject()
    }

    /// Size in bytes of the serialized message.
    pub fn size(&self) -> usize {
        self.inner.size
    }

    pub fn message(&self) -> &Arc<dyn MessageHandle> {
        &self.inner.message
    }

    /// Tracking id, extracted on first use. Empty when absent or malformed.
    pub fn tracking_id(&self) -> &str {
        self.inner.tracking_id.get_or_init(|| {
            extract_tracking_id(self.inner.message.as_ref()).unwrap_or_else(|e| {
                debug!(sequence = self.inner.sequence.0, error = %e, "bad tracking id");
                String::new()
            })
        })
    }

    /// Text rendering of the message, for searching.
    pub fn text(&self) -> String {
        self.inner.message.to_text()
    }
}

fn extract_tracking_id(message: &dyn MessageHandle) -> std::result::Result<String, MessageError> {
    let fields = match message.field(TRACKING_FIELD)? {
        None => return Ok(String::new()),
        Some(FieldValue::Message(fields)) => fields,
        Some(_) => return Err(MessageError::FieldType(TRACKING_FIELD.to_string())),
    };
    match fields.into_iter().find(|f| f.name == TRACKING_ID_FIELD) {
        None => Ok(String::new()),
        Some(field) => match field.value {
            FieldValue::String(id) => Ok(id),
            _ => Err(MessageError::FieldType(TRACKING_ID_FIELD.to_string())),
        },
    }
}

impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        self.inner.sequence == other.inner.sequence
    }
}

impl Eq for Record {}

impl Hash for Record {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inner.sequence.hash(state);
    }
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Record")
            .field("sequence", &self.inner.sequence)
            .field("timestamp", &self.inner.timestamp)
            .field("subject", &self.inner.subject)
            .field("size", &self.inner.size)
            .finish()
    }
}
