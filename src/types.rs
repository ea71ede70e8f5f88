//! Core value types shared by records, record types and views.

use crate::error::{LedgerError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

/// Global arrival order of a record. Unique per process.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct Sequence(pub u64);

impl fmt::Debug for Sequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Seq({})", self.0)
    }
}

impl fmt::Display for Sequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Microseconds since Unix epoch.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// Current wall-clock time.
    pub fn now() -> Self {
        let micros = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_micros() as i64)
            .unwrap_or_default();
        Timestamp(micros)
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({})", self.0)
    }
}

/// Text shown for records whose message carried no subject.
pub const NO_SUBJECT: &str = "[No Subject]";

/// Hierarchical subject a message was published on.
///
/// `Subject::none()` is the sentinel used when the message metadata has
/// no subject; it sorts before every named subject.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct Subject(Option<String>);

impl Subject {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        if name.is_empty() {
            Subject(None)
        } else {
            Subject(Some(name))
        }
    }

    pub fn none() -> Self {
        Subject(None)
    }

    pub fn is_none(&self) -> bool {
        self.0.is_none()
    }

    /// The raw subject text, empty for the sentinel.
    pub fn as_str(&self) -> &str {
        self.0.as_deref().unwrap_or("")
    }

    /// Dot separated elements, e.g. `A.B.C` yields `A`, `B`, `C`.
    pub fn elements(&self) -> impl Iterator<Item = &str> {
        self.0.as_deref().into_iter().flat_map(|s| s.split('.'))
    }
}

impl fmt::Debug for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Subject({})", self)
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Some(name) => f.write_str(name),
            None => f.write_str(NO_SUBJECT),
        }
    }
}

/// RGB display colour of a record type, persisted as `#RRGGBB`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Colour {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Colour {
    pub const BLACK: Colour = Colour::rgb(0, 0, 0);
    pub const RED: Colour = Colour::rgb(0xCC, 0x00, 0x00);
    pub const ORANGE: Colour = Colour::rgb(0xFF, 0x99, 0x00);
    pub const BLUE: Colour = Colour::rgb(0x00, 0x33, 0xCC);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Parse `#RRGGBB` (the leading `#` is optional).
    pub fn from_hex(s: &str) -> Result<Self> {
        let digits = s.trim().trim_start_matches('#');
        let bytes = hex::decode(digits).map_err(|e| LedgerError::InvalidColour(format!("{s}: {e}")))?;
        match bytes.as_slice() {
            [r, g, b] => Ok(Colour::rgb(*r, *g, *b)),
            _ => Err(LedgerError::InvalidColour(format!(
                "{s}: expected 3 bytes, got {}",
                bytes.len()
            ))),
        }
    }

    pub fn to_hex(&self) -> String {
        format!("#{}", hex::encode_upper([self.r, self.g, self.b]))
    }
}

impl Default for Colour {
    fn default() -> Self {
        Colour::BLACK
    }
}

impl fmt::Debug for Colour {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Colour({})", self.to_hex())
    }
}

impl fmt::Display for Colour {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for Colour {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self> {
        Colour::from_hex(s)
    }
}

impl TryFrom<String> for Colour {
    type Error = LedgerError;

    fn try_from(s: String) -> Result<Self> {
        Colour::from_hex(&s)
    }
}

impl From<Colour> for String {
    fn from(c: Colour) -> Self {
        c.to_hex()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_colour_hex_roundtrip() {
        let colour = Colour::from_hex("#ff9900").unwrap();
        assert_eq!(colour, Colour::ORANGE);
        assert_eq!(colour.to_hex(), "#FF9900");
        assert_eq!("0033CC".parse::<Colour>().unwrap(), Colour::BLUE);
    }

    #[test]
    fn test_colour_rejects_garbage() {
        assert!(matches!(Colour::from_hex("#12"), Err(LedgerError::InvalidColour(_))));
        assert!(matches!(Colour::from_hex("zzzzzz"), Err(LedgerError::InvalidColour(_))));
        assert!(matches!(Colour::from_hex("#11223344"), Err(LedgerError::InvalidColour(_))));
    }

    #[test]
    fn test_subject_sentinel() {
        let none = Subject::new("");
        assert!(none.is_none());
        assert_eq!(none.to_string(), NO_SUBJECT);
        assert_eq!(none.as_str(), "");
        assert!(none < Subject::new("A"));
    }

    #[test]
    fn test_subject_elements() {
        let subject = Subject::new("ORDERS.EU.NEW");
        let elements: Vec<_> = subject.elements().collect();
        assert_eq!(elements, vec!["ORDERS", "EU", "NEW"]);
        assert_eq!(Subject::none().elements().count(), 0);
    }
}
