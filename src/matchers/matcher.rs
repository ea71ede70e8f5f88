//! Record predicates.

use super::kinds::MatcherKind;
use crate::error::{LedgerError, Result};
use crate::records::Record;
use regex::Regex;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::error;

/// A compiled regular expression that remembers its source text.
#[derive(Clone)]
pub struct Pattern {
    source: String,
    regex: Regex,
}

impl Pattern {
    pub fn new(source: &str) -> Result<Self> {
        let regex = Regex::new(source).map_err(|e| LedgerError::InvalidPattern {
            pattern: source.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            source: source.to_string(),
            regex,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }
}

impl fmt::Debug for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pattern({:?})", self.source)
    }
}

type CustomFn = dyn Fn(&Record) -> bool + Send + Sync;

/// A predicate over a [`Record`].
///
/// The kinds listed in [`MatcherKind`] can be persisted. The remaining
/// variants are built at runtime: boolean combinators, the visibility
/// predicate produced by the type registry, and arbitrary closures.
///
/// Literal arguments are case sensitive. An empty literal argument
/// never matches, so a freshly created record type claims nothing
/// until it is edited.
#[derive(Clone)]
pub enum Matcher {
    Always,
    Never,
    SubjectContains(String),
    SubjectStartsWith(String),
    SubjectEndsWith(String),
    SubjectRegex(Pattern),
    ReplySubjectContains(String),
    TrackingId(String),
    MessageContains(String),
    MessageRegex(Pattern),
    ConnectionName(String),
    And(Vec<Matcher>),
    Or(Vec<Matcher>),
    Not(Box<Matcher>),
    /// Ordered classification rules: the first rule whose matcher
    /// matches decides visibility; `fallback` applies when none does.
    SelectedTypes {
        rules: Arc<[(Matcher, bool)]>,
        fallback: bool,
    },
    Custom(Arc<CustomFn>),
}

impl Matcher {
    /// Build a persistable matcher from a type key or display name.
    pub fn create(type_or_name: &str, value: &str) -> Result<Self> {
        let kind = MatcherKind::lookup(type_or_name)
            .ok_or_else(|| LedgerError::UnknownMatcherKind(type_or_name.to_string()))?;
        Self::from_kind(kind, value)
    }

    pub fn from_kind(kind: MatcherKind, value: &str) -> Result<Self> {
        let value = value.to_string();
        Ok(match kind {
            MatcherKind::Always => Matcher::Always,
            MatcherKind::SubjectContains => Matcher::SubjectContains(value),
            MatcherKind::SubjectStartsWith => Matcher::SubjectStartsWith(value),
            MatcherKind::SubjectEndsWith => Matcher::SubjectEndsWith(value),
            MatcherKind::SubjectRegex => Matcher::SubjectRegex(Pattern::new(&value)?),
            MatcherKind::ReplySubjectContains => Matcher::ReplySubjectContains(value),
            MatcherKind::TrackingId => Matcher::TrackingId(value),
            MatcherKind::MessageContains => Matcher::MessageContains(value),
            MatcherKind::MessageRegex => Matcher::MessageRegex(Pattern::new(&value)?),
            MatcherKind::ConnectionName => Matcher::ConnectionName(value),
        })
    }

    /// Wrap a closure. Used by ad-hoc search editors.
    pub fn custom(f: impl Fn(&Record) -> bool + Send + Sync + 'static) -> Self {
        Matcher::Custom(Arc::new(f))
    }

    /// The persistable kind, or `None` for runtime-only matchers.
    pub fn kind(&self) -> Option<MatcherKind> {
        match self {
            Matcher::Always => Some(MatcherKind::Always),
            Matcher::SubjectContains(_) => Some(MatcherKind::SubjectContains),
            Matcher::SubjectStartsWith(_) => Some(MatcherKind::SubjectStartsWith),
            Matcher::SubjectEndsWith(_) => Some(MatcherKind::SubjectEndsWith),
            Matcher::SubjectRegex(_) => Some(MatcherKind::SubjectRegex),
            Matcher::ReplySubjectContains(_) => Some(MatcherKind::ReplySubjectContains),
            Matcher::TrackingId(_) => Some(MatcherKind::TrackingId),
            Matcher::MessageContains(_) => Some(MatcherKind::MessageContains),
            Matcher::MessageRegex(_) => Some(MatcherKind::MessageRegex),
            Matcher::ConnectionName(_) => Some(MatcherKind::ConnectionName),
            _ => None,
        }
    }

    /// The string argument; empty for matchers without one.
    pub fn value(&self) -> &str {
        match self {
            Matcher::SubjectContains(v)
            | Matcher::SubjectStartsWith(v)
            | Matcher::SubjectEndsWith(v)
            | Matcher::ReplySubjectContains(v)
            | Matcher::TrackingId(v)
            | Matcher::MessageContains(v)
            | Matcher::ConnectionName(v) => v,
            Matcher::SubjectRegex(p) | Matcher::MessageRegex(p) => p.as_str(),
            _ => "",
        }
    }

    /// Evaluate the predicate. See [`matches_guarded`] for the variant
    /// used on shared pipelines.
    pub fn matches(&self, record: &Record) -> bool {
        match self {
            Matcher::Always => true,
            Matcher::Never => false,
            Matcher::SubjectContains(v) => !v.is_empty() && record.subject().as_str().contains(v.as_str()),
            Matcher::SubjectStartsWith(v) => {
                !v.is_empty() && record.subject().as_str().starts_with(v.as_str())
            }
            Matcher::SubjectEndsWith(v) => !v.is_empty() && record.subject().as_str().ends_with(v.as_str()),
            Matcher::SubjectRegex(p) => p.is_match(record.subject().as_str()),
            Matcher::ReplySubjectContains(v) => {
                !v.is_empty() && record.reply_subject().is_some_and(|r| r.contains(v.as_str()))
            }
            Matcher::TrackingId(v) => !v.is_empty() && record.tracking_id() == v,
            Matcher::MessageContains(v) => !v.is_empty() && record.text().contains(v.as_str()),
            Matcher::MessageRegex(p) => p.is_match(&record.text()),
            Matcher::ConnectionName(v) => {
                !v.is_empty() && record.connection_name() == Some(v.as_str())
            }
            Matcher::And(all) => all.iter().all(|m| m.matches(record)),
            Matcher::Or(any) => any.iter().any(|m| m.matches(record)),
            Matcher::Not(inner) => !inner.matches(record),
            Matcher::SelectedTypes { rules, fallback } => rules
                .iter()
                .find(|(m, _)| matches_guarded(m, record))
                .map_or(*fallback, |(_, selected)| *selected),
            Matcher::Custom(f) => f(record),
        }
    }
}

/// Evaluate `matcher`, treating a panic as "does not match".
///
/// A panicking matcher is a bug in that matcher; it is logged and
/// neutralised here so one bad record cannot take down a view.
pub fn matches_guarded(matcher: &Matcher, record: &Record) -> bool {
    match catch_unwind(AssertUnwindSafe(|| matcher.matches(record))) {
        Ok(matched) => matched,
        Err(panic) => {
            let reason = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            error!(
                sequence = record.sequence().0,
                matcher = ?matcher,
                %reason,
                "matcher panicked, treating as no match"
            );
            false
        }
    }
}

impl fmt::Debug for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Matcher::Never => f.write_str("Never"),
            Matcher::And(all) => f.debug_tuple("And").field(all).finish(),
            Matcher::Or(any) => f.debug_tuple("Or").field(any).finish(),
            Matcher::Not(inner) => f.debug_tuple("Not").field(inner).finish(),
            Matcher::SelectedTypes { rules, fallback } => f
                .debug_struct("SelectedTypes")
                .field("rules", &rules.len())
                .field("fallback", fallback)
                .finish(),
            Matcher::Custom(_) => f.write_str("Custom(..)"),
            persistable => match persistable.kind() {
                Some(kind) => write!(f, "{}({:?})", kind.type_key(), persistable.value()),
                None => f.write_str("Matcher"),
            },
        }
    }
}
