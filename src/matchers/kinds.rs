//! Persistable matcher kinds and their lookup table.

use std::fmt;

/// A matcher kind that can be stored in a project and rebuilt from its
/// `(type key, value)` pair.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MatcherKind {
    Always,
    SubjectContains,
    SubjectStartsWith,
    SubjectEndsWith,
    SubjectRegex,
    ReplySubjectContains,
    TrackingId,
    MessageContains,
    MessageRegex,
    ConnectionName,
}

struct KindEntry {
    kind: MatcherKind,
    type_key: &'static str,
    name: &'static str,
    takes_value: bool,
}

/// Registered kinds. Type keys are what projects store; names are what
/// users see. Either one resolves a kind.
static KINDS: &[KindEntry] = &[
    KindEntry {
        kind: MatcherKind::Always,
        type_key: "always",
        name: "Always Matches",
        takes_value: false,
    },
    KindEntry {
        kind: MatcherKind::SubjectContains,
        type_key: "subject_contains",
        name: "Subject Contains",
        takes_value: true,
    },
    KindEntry {
        kind: MatcherKind::SubjectStartsWith,
        type_key: "subject_starts",
        name: "Subject Starts With",
        takes_value: true,
    },
    KindEntry {
        kind: MatcherKind::SubjectEndsWith,
        type_key: "subject_ends",
        name: "Subject Ends With",
        takes_value: true,
    },
    KindEntry {
        kind: MatcherKind::SubjectRegex,
        type_key: "subject_regex",
        name: "Subject Matches Regex",
        takes_value: true,
    },
    KindEntry {
        kind: MatcherKind::ReplySubjectContains,
        type_key: "reply_contains",
        name: "Reply Subject Contains",
        takes_value: true,
    },
    KindEntry {
        kind: MatcherKind::TrackingId,
        type_key: "tracking_id",
        name: "Tracking ID Equals",
        takes_value: true,
    },
    KindEntry {
        kind: MatcherKind::MessageContains,
        type_key: "message_contains",
        name: "Message Contains",
        takes_value: true,
    },
    KindEntry {
        kind: MatcherKind::MessageRegex,
        type_key: "message_regex",
        name: "Message Matches Regex",
        takes_value: true,
    },
    KindEntry {
        kind: MatcherKind::ConnectionName,
        type_key: "connection_name",
        name: "Connection Name Equals",
        takes_value: true,
    },
];

impl MatcherKind {
    fn entry(self) -> &'static KindEntry {
        KINDS
            .iter()
            .find(|e| e.kind == self)
            .unwrap_or(&KINDS[0])
    }

    /// All registered kinds, in menu order.
    pub fn all() -> impl Iterator<Item = MatcherKind> {
        KINDS.iter().map(|e| e.kind)
    }

    /// Stable key used for persistence.
    pub fn type_key(self) -> &'static str {
        self.entry().type_key
    }

    /// Name shown to users.
    pub fn display_name(self) -> &'static str {
        self.entry().name
    }

    /// Whether the kind uses its string argument.
    pub fn takes_value(self) -> bool {
        self.entry().takes_value
    }

    /// Resolve a kind from either its type key or its display name.
    pub fn lookup(type_or_name: &str) -> Option<Self> {
        let key = type_or_name.trim();
        KINDS
            .iter()
            .find(|e| e.type_key == key || e.name == key)
            .map(|e| e.kind)
    }
}

impl fmt::Display for MatcherKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_kind_registered_once() {
        let kinds: Vec<_> = MatcherKind::all().collect();
        assert_eq!(kinds.len(), KINDS.len());
        for kind in kinds {
            assert_eq!(KINDS.iter().filter(|e| e.kind == kind).count(), 1);
        }
    }

    #[test]
    fn test_lookup_by_key_or_name() {
        assert_eq!(MatcherKind::lookup("subject_starts"), Some(MatcherKind::SubjectStartsWith));
        assert_eq!(MatcherKind::lookup("Subject Starts With"), Some(MatcherKind::SubjectStartsWith));
        assert_eq!(MatcherKind::lookup("subject starts with"), None);
        assert_eq!(MatcherKind::lookup("bogus"), None);
    }

    #[test]
    fn test_keys_roundtrip() {
        for kind in MatcherKind::all() {
            assert_eq!(MatcherKind::lookup(kind.type_key()), Some(kind));
            assert_eq!(MatcherKind::lookup(kind.display_name()), Some(kind));
        }
    }
}
