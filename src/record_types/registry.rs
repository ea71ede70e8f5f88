//! Ordered, mutable collection of record types.

use super::record_type::{validate_name, RecordType, TypeChange, DEFAULT_TYPE_NAME};
use crate::error::{LedgerError, Result};
use crate::matchers::Matcher;
use crate::records::Record;
use crate::subscriptions::{ListenerId, ListenerSet};
use crate::types::Colour;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::{Arc, Weak};
use tracing::{debug, warn};

/// Prefix of generated record type names.
pub const GENERATED_NAME_PREFIX: &str = "My Record Type #";

/// Persistence form of a record type: `(name, colour, matcher type,
/// matcher value, selected)`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordTypeDescriptor {
    pub name: String,
    /// `#RRGGBB`.
    pub colour: String,
    pub matcher_type: String,
    pub matcher_value: String,
    pub selected: bool,
}

impl RecordTypeDescriptor {
    pub fn new(
        name: impl Into<String>,
        colour: impl Into<String>,
        matcher_type: impl Into<String>,
        matcher_value: impl Into<String>,
        selected: bool,
    ) -> Self {
        Self {
            name: name.into(),
            colour: colour.into(),
            matcher_type: matcher_type.into(),
            matcher_value: matcher_value.into(),
            selected,
        }
    }
}

/// Outcome of [`RecordTypeRegistry::import`].
#[derive(Debug, Default)]
pub struct ImportReport {
    pub loaded: usize,
    /// Entries that could not be loaded, with the reason.
    pub skipped: Vec<(String, LedgerError)>,
}

/// Structural or property change in a registry.
#[derive(Clone, Debug, PartialEq)]
pub enum RegistryEvent {
    TypeAdded { index: usize, name: String },
    TypeRemoved { index: usize, name: String },
    TypeMoved { from: usize, to: usize, name: String },
    TypeChanged { name: String, change: TypeChange },
    /// The whole type list was replaced.
    Reset,
}

impl RegistryEvent {
    /// Whether the event can alter which records a selection filter shows.
    pub fn affects_visibility(&self) -> bool {
        match self {
            RegistryEvent::TypeChanged { change, .. } => change.affects_visibility(),
            _ => true,
        }
    }
}

/// Observer of a registry. Called after the registry lock is released.
pub trait RegistryListener: Send + Sync {
    fn on_registry_change(&self, event: &RegistryEvent);

    /// A closed listener is pruned after the publish that observed it.
    fn is_closed(&self) -> bool {
        false
    }
}

impl<F> RegistryListener for F
where
    F: Fn(&RegistryEvent) + Send + Sync,
{
    fn on_registry_change(&self, event: &RegistryEvent) {
        self(event)
    }
}

/// Ordered record types plus the catch-all default type.
///
/// Match order is list order, except that the default type is always
/// consulted last wherever it is displayed: [`first_matching_type`]
/// only falls back to it when no other type matches.
///
/// [`first_matching_type`]: RecordTypeRegistry::first_matching_type
pub struct RecordTypeRegistry {
    types: RwLock<Vec<Arc<RecordType>>>,
    default_type: Arc<RecordType>,
    listeners: ListenerSet<dyn RegistryListener>,
    self_ref: Weak<RecordTypeRegistry>,
}

impl RecordTypeRegistry {
    /// A registry holding only the default type.
    pub fn new() -> Arc<Self> {
        Arc::new_cyclic(|weak: &Weak<Self>| {
            let default_type = RecordType::new(
                DEFAULT_TYPE_NAME.to_string(),
                Colour::BLACK,
                Matcher::Always,
                weak.clone(),
                true,
            );
            Self {
                types: RwLock::new(vec![Arc::clone(&default_type)]),
                default_type,
                listeners: ListenerSet::new(),
                self_ref: weak.clone(),
            }
        })
    }

    /// A registry populated with the built-in starter set.
    pub fn with_starter_types() -> Arc<Self> {
        let registry = Self::new();
        registry.reset();
        registry
    }

    pub fn default_type(&self) -> Arc<RecordType> {
        Arc::clone(&self.default_type)
    }

    /// All types in display order, default included.
    pub fn types(&self) -> Vec<Arc<RecordType>> {
        self.types.read().clone()
    }

    pub fn len(&self) -> usize {
        self.types.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.read().is_empty()
    }

    pub fn index_of(&self, record_type: &RecordType) -> Option<usize> {
        self.types
            .read()
            .iter()
            .position(|t| std::ptr::eq(t.as_ref(), record_type))
    }

    pub fn get(&self, name: &str) -> Option<Arc<RecordType>> {
        self.types.read().iter().find(|t| t.has_name(name)).cloned()
    }

    pub fn is_name_in_use(&self, name: &str) -> bool {
        self.types.read().iter().any(|t| t.has_name(name))
    }

    /// Create a type. Without a name, the lowest unused
    /// `My Record Type #N` is chosen. Without a matcher, the type starts
    /// as an empty "subject contains", which matches nothing.
    ///
    /// New types go at the end of the list, or just above the default
    /// type when that is last.
    pub fn create_type(
        &self,
        name: Option<&str>,
        colour: Option<Colour>,
        matcher: Option<Matcher>,
    ) -> Result<Arc<RecordType>> {
        let matcher = matcher.unwrap_or_else(|| Matcher::SubjectContains(String::new()));
        if matcher.kind().is_none() {
            return Err(LedgerError::InvalidOperation(format!(
                "{matcher:?} cannot be stored in a record type"
            )));
        }

        let (record_type, index, name) = {
            let mut types = self.types.write();
            let name = match name {
                Some(name) => {
                    let name = validate_name(name)?;
                    if types.iter().any(|t| t.has_name(name)) {
                        return Err(LedgerError::DuplicateName(name.to_string()));
                    }
                    name.to_string()
                }
                None => generate_name(&types),
            };

            let record_type = RecordType::new(
                name.clone(),
                colour.unwrap_or_default(),
                matcher,
                self.self_ref.clone(),
                false,
            );
            let index = match types.last() {
                Some(last) if last.is_default() => types.len() - 1,
                _ => types.len(),
            };
            types.insert(index, Arc::clone(&record_type));
            (record_type, index, name)
        };

        debug!(%name, index, "created record type");
        self.publish(RegistryEvent::TypeAdded { index, name });
        Ok(record_type)
    }

    /// Remove a type. Removing the default type is a no-op.
    /// Returns whether anything was removed.
    pub fn remove_type(&self, record_type: &RecordType) -> bool {
        if record_type.is_default() {
            return false;
        }
        let index = {
            let mut types = self.types.write();
            let Some(index) = types.iter().position(|t| std::ptr::eq(t.as_ref(), record_type)) else {
                return false;
            };
            types.remove(index).detach();
            index
        };
        self.publish(RegistryEvent::TypeRemoved {
            index,
            name: record_type.name(),
        });
        true
    }

    /// Move a type so it ends up at `new_index`. Indices below zero
    /// clamp to the top, indices past the end move it to the bottom.
    /// Returns false (and publishes nothing) if the position is unchanged.
    pub fn reorder_type(&self, record_type: &RecordType, new_index: isize) -> bool {
        let (from, to) = {
            let mut types = self.types.write();
            let Some(from) = types.iter().position(|t| std::ptr::eq(t.as_ref(), record_type)) else {
                return false;
            };
            let last = types.len() as isize - 1;
            let to = new_index.clamp(0, last) as usize;
            if from == to {
                return false;
            }
            let moved = types.remove(from);
            types.insert(to, moved);
            (from, to)
        };
        self.publish(RegistryEvent::TypeMoved {
            from,
            to,
            name: record_type.name(),
        });
        true
    }

    /// The first type, in match order, whose matcher accepts `record`.
    /// Never fails: the default type is returned when nothing else matches.
    pub fn first_matching_type(&self, record: &Record) -> Arc<RecordType> {
        let types = self.types.read();
        types
            .iter()
            .filter(|t| !t.is_default())
            .find(|t| t.matches(record))
            .cloned()
            .unwrap_or_else(|| Arc::clone(&self.default_type))
    }

    /// Snapshot predicate accepting records whose classifying type is selected.
    pub fn selected_types_matcher(&self) -> Matcher {
        let types = self.types.read();
        let rules: Vec<(Matcher, bool)> = types
            .iter()
            .filter(|t| !t.is_default())
            .map(|t| {
                let state = t.state.read();
                (state.matcher.clone(), state.selected)
            })
            .collect();
        Matcher::SelectedTypes {
            rules: rules.into(),
            fallback: self.default_type.is_selected(),
        }
    }

    /// Replace every type with the built-in starter set.
    pub fn reset(&self) {
        {
            let mut types = self.types.write();
            for old in types.drain(..) {
                if !old.is_default() {
                    old.detach();
                }
            }
            self.default_type.restore_default();
            types.extend(starter_types(&self.self_ref));
            types.push(Arc::clone(&self.default_type));
        }
        debug!("reset record types to starter set");
        self.publish(RegistryEvent::Reset);
    }

    /// Remove every type except the default.
    pub fn clear(&self) {
        {
            let mut types = self.types.write();
            types.retain(|t| {
                if t.is_default() {
                    true
                } else {
                    t.detach();
                    false
                }
            });
        }
        self.publish(RegistryEvent::Reset);
    }

    /// Persistence tuples for every type except the default, in match order.
    pub fn export(&self) -> Vec<RecordTypeDescriptor> {
        self.types
            .read()
            .iter()
            .filter(|t| !t.is_default())
            .map(|t| t.descriptor())
            .collect()
    }

    /// Replace the current types with `descriptors`. Entries that cannot
    /// be loaded are skipped and reported; the rest still load.
    pub fn import(&self, descriptors: impl IntoIterator<Item = RecordTypeDescriptor>) -> ImportReport {
        self.clear();
        let mut report = ImportReport::default();
        for descriptor in descriptors {
            match self.import_one(&descriptor) {
                Ok(_) => report.loaded += 1,
                Err(e) => {
                    warn!(name = %descriptor.name, error = %e, "skipping record type");
                    report.skipped.push((descriptor.name, e));
                }
            }
        }
        report
    }

    fn import_one(&self, descriptor: &RecordTypeDescriptor) -> Result<Arc<RecordType>> {
        let colour = Colour::from_hex(&descriptor.colour)?;
        let matcher = Matcher::create(&descriptor.matcher_type, &descriptor.matcher_value)?;
        let record_type = self.create_type(Some(&descriptor.name), Some(colour), Some(matcher))?;
        record_type.set_selected(descriptor.selected);
        Ok(record_type)
    }

    pub fn subscribe(&self, listener: Arc<dyn RegistryListener>) -> ListenerId {
        self.listeners.add(listener)
    }

    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        self.listeners.remove(id)
    }

    pub(crate) fn rename_type(&self, record_type: &RecordType, name: &str) -> Result<Option<TypeChange>> {
        let name = validate_name(name)?;
        let types = self.types.write();
        if types
            .iter()
            .any(|t| !std::ptr::eq(t.as_ref(), record_type) && t.has_name(name))
        {
            return Err(LedgerError::DuplicateName(name.to_string()));
        }
        let mut state = record_type.state.write();
        if state.name == name {
            return Ok(None);
        }
        let old = std::mem::replace(&mut state.name, name.to_string());
        Ok(Some(TypeChange::Name {
            old,
            new: name.to_string(),
        }))
    }

    pub(crate) fn type_changed(&self, record_type: &RecordType, change: TypeChange) {
        self.publish(RegistryEvent::TypeChanged {
            name: record_type.name(),
            change,
        });
    }

    fn publish(&self, event: RegistryEvent) {
        self.listeners.notify(|listener| {
            listener.on_registry_change(&event);
            !listener.is_closed()
        });
    }
}

fn generate_name(types: &[Arc<RecordType>]) -> String {
    let names: HashSet<String> = types.iter().map(|t| t.name()).collect();
    (1..)
        .map(|n| format!("{GENERATED_NAME_PREFIX}{n}"))
        .find(|candidate| !names.contains(candidate))
        .unwrap_or_else(|| GENERATED_NAME_PREFIX.to_string())
}

fn starter_types(registry: &Weak<RecordTypeRegistry>) -> Vec<Arc<RecordType>> {
    [
        ("Error", Colour::RED, Matcher::SubjectContains("ERROR".into())),
        ("Warning", Colour::ORANGE, Matcher::SubjectContains("WARN".into())),
        ("System", Colour::BLUE, Matcher::SubjectStartsWith("_".into())),
    ]
    .into_iter()
    .map(|(name, colour, matcher)| {
        RecordType::new(name.to_string(), colour, matcher, registry.clone(), false)
    })
    .collect()
}
