//! Boundary with the message layer.
//!
//! The transport hands the ledger an opaque [`MessageHandle`]. The ledger
//! only ever asks it for a subject, a reply subject, individual fields,
//! its encoded bytes and a text rendering. [`FieldMessage`] is the one
//! concrete handle this crate ships; it is what records are rebuilt into
//! when they are loaded from a capture file.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Name of the nested field carrying tracking metadata.
pub const TRACKING_FIELD: &str = "^tracking^";

/// Name of the tracking id inside [`TRACKING_FIELD`].
pub const TRACKING_ID_FIELD: &str = "^id^";

/// Errors raised by message accessors.
#[derive(Debug, Error)]
pub enum MessageError {
    #[error("Field {0} has an unexpected type")]
    FieldType(String),

    #[error("Message encoding failed: {0}")]
    Encode(String),

    #[error("Message decoding failed: {0}")]
    Decode(String),
}

/// Opaque handle to a received message.
pub trait MessageHandle: Send + Sync + fmt::Debug {
    /// Subject the message was published on, if any.
    fn subject(&self) -> Option<&str>;

    /// Reply subject, if the sender asked for one.
    fn reply_subject(&self) -> Option<&str> {
        None
    }

    /// Look up a top level field by name.
    fn field(&self, name: &str) -> Result<Option<FieldValue>, MessageError>;

    /// Serialized form of the message.
    fn encode(&self) -> Result<Vec<u8>, MessageError>;

    /// Size of the serialized form in bytes.
    fn encoded_size(&self) -> Result<usize, MessageError> {
        self.encode().map(|bytes| bytes.len())
    }

    /// Human readable rendering used for text search.
    fn to_text(&self) -> String;
}

/// A typed field value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum FieldValue {
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Bytes(Vec<u8>),
    Message(Vec<Field>),
}

impl FieldValue {
    fn to_json(&self) -> serde_json::Value {
        match self {
            FieldValue::String(s) => serde_json::Value::from(s.as_str()),
            FieldValue::Int(i) => serde_json::Value::from(*i),
            FieldValue::Float(f) => serde_json::Value::from(*f),
            FieldValue::Bool(b) => serde_json::Value::from(*b),
            FieldValue::Bytes(bytes) => serde_json::Value::from(hex::encode(bytes)),
            FieldValue::Message(fields) => fields_to_json(fields),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::String(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::String(s)
    }
}

impl From<i64> for FieldValue {
    fn from(i: i64) -> Self {
        FieldValue::Int(i)
    }
}

impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        FieldValue::Bool(b)
    }
}

/// A named field.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub value: FieldValue,
}

impl Field {
    pub fn new(name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

fn fields_to_json(fields: &[Field]) -> serde_json::Value {
    let map = fields
        .iter()
        .map(|f| (f.name.clone(), f.value.to_json()))
        .collect::<serde_json::Map<_, _>>();
    serde_json::Value::Object(map)
}

/// Self-describing message made of named fields.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldMessage {
    pub subject: Option<String>,
    pub reply_subject: Option<String>,
    pub fields: Vec<Field>,
}

impl FieldMessage {
    pub fn new(subject: impl Into<String>) -> Self {
        Self {
            subject: Some(subject.into()),
            ..Default::default()
        }
    }

    /// A message with no subject at all.
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn with_reply_subject(mut self, reply: impl Into<String>) -> Self {
        self.reply_subject = Some(reply.into());
        self
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.push(Field::new(name, value));
        self
    }

    /// Attach tracking metadata carrying `id`.
    pub fn with_tracking_id(self, id: impl Into<String>) -> Self {
        let tracking = FieldValue::Message(vec![Field::new(TRACKING_ID_FIELD, id.into())]);
        self.with_field(TRACKING_FIELD, tracking)
    }

    /// Decode a message previously produced by [`MessageHandle::encode`].
    pub fn decode(bytes: &[u8]) -> Result<Self, MessageError> {
        rmp_serde::from_slice(bytes).map_err(|e| MessageError::Decode(e.to_string()))
    }
}

impl MessageHandle for FieldMessage {
    fn subject(&self) -> Option<&str> {
        self.subject.as_deref()
    }

    fn reply_subject(&self) -> Option<&str> {
        self.reply_subject.as_deref()
    }

    fn field(&self, name: &str) -> Result<Option<FieldValue>, MessageError> {
        Ok(self
            .fields
            .iter()
            .find(|f| f.name == name)
            .map(|f| f.value.clone()))
    }

    fn encode(&self) -> Result<Vec<u8>, MessageError> {
        rmp_serde::to_vec_named(self).map_err(|e| MessageError::Encode(e.to_string()))
    }

    fn to_text(&self) -> String {
        fields_to_json(&self.fields).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_decode() {
        let msg = FieldMessage::new("ORDERS.NEW")
            .with_reply_subject("_INBOX.1")
            .with_field("qty", 10i64)
            .with_tracking_id("abc-1");

        let bytes = msg.encode().unwrap();
        assert_eq!(msg.encoded_size().unwrap(), bytes.len());

        let decoded = FieldMessage::decode(&bytes).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn test_decode_garbage() {
        let result = FieldMessage::decode(&[0xc1, 0xff, 0x00]);
        assert!(matches!(result, Err(MessageError::Decode(_))));
    }

    #[test]
    fn test_text_rendering() {
        let msg = FieldMessage::new("A")
            .with_field("name", "widget")
            .with_field("blob", FieldValue::Bytes(vec![0xde, 0xad]));
        let text = msg.to_text();
        assert!(text.contains("\"name\":\"widget\""));
        assert!(text.contains("dead"));
    }

    #[test]
    fn test_field_lookup() {
        let msg = FieldMessage::new("A").with_field("flag", true);
        assert_eq!(msg.field("flag").unwrap(), Some(FieldValue::Bool(true)));
        assert_eq!(msg.field("missing").unwrap(), None);
    }
}
