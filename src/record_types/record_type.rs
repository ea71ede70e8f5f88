//! A named, coloured classification rule.

use super::registry::{RecordTypeDescriptor, RecordTypeRegistry};
use crate::error::{LedgerError, Result};
use crate::matchers::{matches_guarded, Matcher, MatcherKind};
use crate::records::Record;
use crate::subscriptions::{ListenerId, ListenerSet};
use crate::types::Colour;
use parking_lot::RwLock;
use std::fmt;
use std::sync::{Arc, Weak};

/// Name of the catch-all type every registry owns.
pub const DEFAULT_TYPE_NAME: &str = "Default";

/// One property change on a record type: `(field, old, new)`.
#[derive(Clone, Debug, PartialEq)]
pub enum TypeChange {
    Name { old: String, new: String },
    Colour { old: Colour, new: Colour },
    MatcherKind { old: MatcherKind, new: MatcherKind },
    MatcherValue { old: String, new: String },
    Selected { old: bool, new: bool },
}

impl TypeChange {
    /// Whether the change can alter which records a selection filter shows.
    pub fn affects_visibility(&self) -> bool {
        !matches!(self, TypeChange::Name { .. } | TypeChange::Colour { .. })
    }
}

/// Observer of a single record type.
pub trait TypeListener: Send + Sync {
    fn on_type_change(&self, record_type: &RecordType, change: &TypeChange);
}

impl<F> TypeListener for F
where
    F: Fn(&RecordType, &TypeChange) + Send + Sync,
{
    fn on_type_change(&self, record_type: &RecordType, change: &TypeChange) {
        self(record_type, change)
    }
}

pub(crate) struct TypeState {
    pub(crate) name: String,
    pub(crate) colour: Colour,
    pub(crate) selected: bool,
    pub(crate) matcher: Matcher,
}

/// A classification rule: records its matcher accepts are shown in its
/// colour, and hidden when it is deselected.
///
/// Identity is by reference. Name uniqueness is enforced through the
/// owning registry, which the type only refers back to.
pub struct RecordType {
    pub(crate) state: RwLock<TypeState>,
    registry: RwLock<Weak<RecordTypeRegistry>>,
    listeners: ListenerSet<dyn TypeListener>,
    is_default: bool,
}

impl RecordType {
    pub(crate) fn new(
        name: String,
        colour: Colour,
        matcher: Matcher,
        registry: Weak<RecordTypeRegistry>,
        is_default: bool,
    ) -> Arc<Self> {
        Arc::new(Self {
            state: RwLock::new(TypeState {
                name,
                colour,
                selected: true,
                matcher,
            }),
            registry: RwLock::new(registry),
            listeners: ListenerSet::new(),
            is_default,
        })
    }

    pub fn name(&self) -> String {
        self.state.read().name.clone()
    }

    pub(crate) fn has_name(&self, name: &str) -> bool {
        self.state.read().name == name
    }

    pub fn colour(&self) -> Colour {
        self.state.read().colour
    }

    pub fn is_selected(&self) -> bool {
        self.state.read().selected
    }

    pub fn matcher(&self) -> Matcher {
        self.state.read().matcher.clone()
    }

    pub fn matcher_kind(&self) -> MatcherKind {
        self.state.read().matcher.kind().unwrap_or(MatcherKind::Always)
    }

    pub fn matcher_value(&self) -> String {
        self.state.read().matcher.value().to_string()
    }

    /// True for the registry's catch-all type.
    pub fn is_default(&self) -> bool {
        self.is_default
    }

    pub fn matches(&self, record: &Record) -> bool {
        matches_guarded(&self.state.read().matcher, record)
    }

    /// Rename. Fails with `DuplicateName` if another type in the owning
    /// registry already has `name`; the type is left unchanged.
    pub fn set_name(&self, name: &str) -> Result<()> {
        let registry = self.registry.read().upgrade();
        let change = match registry {
            Some(registry) => registry.rename_type(self, name)?,
            None => self.rename_detached(name)?,
        };
        if let Some(change) = change {
            self.publish(change);
        }
        Ok(())
    }

    fn rename_detached(&self, name: &str) -> Result<Option<TypeChange>> {
        let name = validate_name(name)?;
        let mut state = self.state.write();
        if state.name == name {
            return Ok(None);
        }
        let old = std::mem::replace(&mut state.name, name.to_string());
        Ok(Some(TypeChange::Name {
            old,
            new: name.to_string(),
        }))
    }

    pub fn set_colour(&self, colour: Colour) {
        let old = std::mem::replace(&mut self.state.write().colour, colour);
        if old != colour {
            self.publish(TypeChange::Colour { old, new: colour });
        }
    }

    pub fn set_selected(&self, selected: bool) {
        let old = std::mem::replace(&mut self.state.write().selected, selected);
        if old != selected {
            self.publish(TypeChange::Selected { old, new: selected });
        }
    }

    /// Switch matcher kind, keeping the current argument.
    pub fn set_matcher_kind(&self, kind: MatcherKind) -> Result<()> {
        let value = self.matcher_value();
        self.set_matcher(Matcher::from_kind(kind, &value)?)
    }

    /// Change the matcher argument, keeping the current kind.
    pub fn set_matcher_value(&self, value: &str) -> Result<()> {
        let kind = self.matcher_kind();
        self.set_matcher(Matcher::from_kind(kind, value)?)
    }

    /// Replace the matcher. Only persistable matchers are accepted, and
    /// the default type's matcher cannot be changed.
    pub fn set_matcher(&self, matcher: Matcher) -> Result<()> {
        if self.is_default {
            return Err(LedgerError::InvalidOperation(
                "the default record type always matches".into(),
            ));
        }
        let new_kind = matcher.kind().ok_or_else(|| {
            LedgerError::InvalidOperation(format!("{matcher:?} cannot be stored in a record type"))
        })?;
        let new_value = matcher.value().to_string();

        let old = std::mem::replace(&mut self.state.write().matcher, matcher);
        let old_kind = old.kind().unwrap_or(MatcherKind::Always);

        if old_kind != new_kind {
            self.publish(TypeChange::MatcherKind {
                old: old_kind,
                new: new_kind,
            });
        }
        if old.value() != new_value {
            self.publish(TypeChange::MatcherValue {
                old: old.value().to_string(),
                new: new_value,
            });
        }
        Ok(())
    }

    pub fn subscribe(&self, listener: Arc<dyn TypeListener>) -> ListenerId {
        self.listeners.add(listener)
    }

    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        self.listeners.remove(id)
    }

    /// Persistence form of this type.
    pub fn descriptor(&self) -> RecordTypeDescriptor {
        let state = self.state.read();
        RecordTypeDescriptor {
            name: state.name.clone(),
            colour: state.colour.to_hex(),
            matcher_type: state
                .matcher
                .kind()
                .unwrap_or(MatcherKind::Always)
                .type_key()
                .to_string(),
            matcher_value: state.matcher.value().to_string(),
            selected: state.selected,
        }
    }

    pub(crate) fn detach(&self) {
        *self.registry.write() = Weak::new();
    }

    /// Put the catch-all type back to its initial look.
    pub(crate) fn restore_default(&self) {
        let mut state = self.state.write();
        state.name = DEFAULT_TYPE_NAME.to_string();
        state.colour = Colour::BLACK;
        state.selected = true;
        state.matcher = Matcher::Always;
    }

    fn publish(&self, change: TypeChange) {
        self.listeners.notify(|listener| {
            listener.on_type_change(self, &change);
            true
        });
        let registry = self.registry.read().upgrade();
        if let Some(registry) = registry {
            registry.type_changed(self, change);
        }
    }
}

pub(crate) fn validate_name(name: &str) -> Result<&str> {
    let name = name.trim();
    if name.is_empty() {
        return Err(LedgerError::InvalidOperation(
            "record type name must not be empty".into(),
        ));
    }
    Ok(name)
}

impl fmt::Debug for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.read();
        f.debug_struct("RecordType")
            .field("name", &state.name)
            .field("colour", &state.colour)
            .field("selected", &state.selected)
            .field("matcher", &state.matcher)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    fn detached(name: &str) -> Arc<RecordType> {
        RecordType::new(
            name.to_string(),
            Colour::BLACK,
            Matcher::SubjectContains("X".into()),
            Weak::new(),
            false,
        )
    }

    #[test]
    fn test_mutators_publish_changes() {
        let ty = detached("Orders");
        let changes = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&changes);
        ty.subscribe(Arc::new(move |_: &RecordType, c: &TypeChange| {
            sink.lock().push(c.clone());
        }));

        ty.set_name("Trades").unwrap();
        ty.set_colour(Colour::RED);
        ty.set_selected(false);
        ty.set_matcher_kind(MatcherKind::SubjectStartsWith).unwrap();
        ty.set_matcher_value("T.").unwrap();

        assert_eq!(
            *changes.lock(),
            vec![
                TypeChange::Name {
                    old: "Orders".into(),
                    new: "Trades".into()
                },
                TypeChange::Colour {
                    old: Colour::BLACK,
                    new: Colour::RED
                },
                TypeChange::Selected {
                    old: true,
                    new: false
                },
                TypeChange::MatcherKind {
                    old: MatcherKind::SubjectContains,
                    new: MatcherKind::SubjectStartsWith
                },
                TypeChange::MatcherValue {
                    old: "X".into(),
                    new: "T.".into()
                },
            ]
        );
    }

    #[test]
    fn test_unchanged_values_are_silent() {
        let ty = detached("Orders");
        let count = Arc::new(Mutex::new(0));
        let sink = Arc::clone(&count);
        ty.subscribe(Arc::new(move |_: &RecordType, _: &TypeChange| {
            *sink.lock() += 1;
        }));

        ty.set_name("Orders").unwrap();
        ty.set_colour(Colour::BLACK);
        ty.set_selected(true);
        ty.set_matcher_value("X").unwrap();
        assert_eq!(*count.lock(), 0);
    }

    #[test]
    fn test_invalid_regex_leaves_matcher() {
        let ty = detached("Orders");
        ty.set_matcher_kind(MatcherKind::SubjectRegex).unwrap();
        let result = ty.set_matcher_value("([");
        assert!(matches!(result, Err(LedgerError::InvalidPattern { .. })));
        assert_eq!(ty.matcher_value(), "X");
        assert_eq!(ty.matcher_kind(), MatcherKind::SubjectRegex);
    }

    #[test]
    fn test_runtime_matchers_rejected() {
        let ty = detached("Orders");
        let result = ty.set_matcher(Matcher::Never);
        assert!(matches!(result, Err(LedgerError::InvalidOperation(_))));
    }

    #[test]
    fn test_empty_name_rejected() {
        let ty = detached("Orders");
        assert!(matches!(ty.set_name("   "), Err(LedgerError::InvalidOperation(_))));
        assert_eq!(ty.name(), "Orders");
    }

    #[test]
    fn test_descriptor() {
        let ty = detached("Orders");
        ty.set_colour(Colour::BLUE);
        ty.set_selected(false);
        let d = ty.descriptor();
        assert_eq!(d.name, "Orders");
        assert_eq!(d.colour, "#0033CC");
        assert_eq!(d.matcher_type, "subject_contains");
        assert_eq!(d.matcher_value, "X");
        assert!(!d.selected);
    }
}
