//! Live filtered projection of a record source.

use crate::error::{LedgerError, Result};
use crate::matchers::{matches_guarded, Matcher};
use crate::record_types::{RecordTypeRegistry, RegistryEvent, RegistryListener};
use crate::records::{Record, Window};
use crate::source::RecordSource;
use crate::subscriptions::{ChangeEvent, ChangeListener, ListenerId, ListenerSet};
use parking_lot::{RwLock, RwLockWriteGuard};
use std::sync::{Arc, Weak};
use tracing::{debug, trace};

/// Above this many insertions a refilter publishes one `Reset` instead
/// of individual `Inserted` events.
pub const DIFF_RESET_THRESHOLD: usize = 1024;

#[derive(Default)]
struct Predicate {
    /// Registry visibility snapshot, present while filtering on selection.
    types: Option<Matcher>,
    adhoc: Option<Matcher>,
}

impl Predicate {
    fn accepts(&self, record: &Record) -> bool {
        self.types.as_ref().map_or(true, |m| matches_guarded(m, record))
            && self.adhoc.as_ref().map_or(true, |m| matches_guarded(m, record))
    }
}

#[derive(Default)]
struct ViewState {
    records: Window<Record>,
    /// Source index plus `base` of each entry in `records`. Strictly ascending.
    positions: Window<usize>,
    /// Rows evicted from the front of the source since the last rebuild.
    base: usize,
    predicate: Predicate,
}

impl ViewState {
    /// Drop the entries for source rows `indices` (ascending, pre-removal)
    /// and renumber the rest. Returns the view indices removed.
    fn remove_source_rows(&mut self, indices: &[usize]) -> Vec<usize> {
        let (Some(&first), Some(&last)) = (indices.first(), indices.last()) else {
            return Vec::new();
        };
        let base = self.base;

        if last + 1 == indices.len() {
            // Oldest rows evicted: only `base` moves.
            let gone = self.positions.partition_point(|&p| p < base + indices.len());
            self.records.drop_front(gone);
            self.positions.drop_front(gone);
            self.base += indices.len();
            return (0..gone).collect();
        }

        let from = self.positions.partition_point(|&p| p < base + first);
        let mut removed = Vec::new();
        let mut passed = 0;
        for view_index in from..self.positions.len() {
            let row = self.positions[view_index] - base;
            while passed < indices.len() && indices[passed] < row {
                passed += 1;
            }
            if indices.get(passed) == Some(&row) {
                removed.push(view_index);
            } else {
                self.positions[view_index] -= passed;
            }
        }
        self.records.remove_indices(&removed);
        self.positions.remove_indices(&removed);
        removed
    }

    /// Fold `base` back into the positions so they are plain source rows.
    fn normalize(&mut self) {
        if self.base > 0 {
            let base = std::mem::take(&mut self.base);
            for p in self.positions.iter_mut() {
                *p -= base;
            }
        }
    }
}

struct ViewInner {
    source: Arc<dyn RecordSource>,
    registry: Arc<RecordTypeRegistry>,
    state: RwLock<ViewState>,
    listeners: ListenerSet<dyn ChangeListener>,
}

/// The records of a source that pass the current predicate, in source order.
///
/// The predicate is the conjunction of an optional "selected types only"
/// filter, which follows the registry as types are edited, and an
/// optional ad-hoc matcher. Source changes are applied incrementally;
/// predicate changes re-evaluate the whole source and publish the
/// difference.
///
/// The view is kept current by callbacks from its source and registry,
/// and detaches from both when dropped.
pub struct FilteredLedgerView {
    inner: Arc<ViewInner>,
    source_listener: ListenerId,
    registry_listener: ListenerId,
}

impl FilteredLedgerView {
    /// Attach a new view to `source`. With `auto_selected_only`, records
    /// whose record type is deselected in `registry` are hidden.
    pub fn new(
        source: Arc<dyn RecordSource>,
        registry: Arc<RecordTypeRegistry>,
        auto_selected_only: bool,
    ) -> Arc<Self> {
        let inner = Arc::new(ViewInner {
            source: Arc::clone(&source),
            registry: Arc::clone(&registry),
            state: RwLock::new(ViewState::default()),
            listeners: ListenerSet::new(),
        });

        let registry_listener = registry.subscribe(Arc::new(RegistryHook {
            view: Arc::downgrade(&inner),
        }));
        let source_listener = source.attach(
            Arc::new(SourceHook {
                view: Arc::downgrade(&inner),
            }),
            &mut |contents| {
                let mut state = inner.state.write();
                if auto_selected_only {
                    state.predicate.types = Some(registry.selected_types_matcher());
                }
                rebuild(&mut state, contents);
            },
        );

        Arc::new(Self {
            inner,
            source_listener,
            registry_listener,
        })
    }

    pub fn source(&self) -> &Arc<dyn RecordSource> {
        &self.inner.source
    }

    /// The ad-hoc matcher, if any.
    pub fn predicate(&self) -> Option<Matcher> {
        self.inner.state.read().predicate.adhoc.clone()
    }

    /// Replace the ad-hoc matcher and re-evaluate the source.
    pub fn set_predicate(&self, matcher: Option<Matcher>) {
        self.inner.refilter(|predicate, _| predicate.adhoc = matcher);
    }

    pub fn is_selected_only(&self) -> bool {
        self.inner.state.read().predicate.types.is_some()
    }

    /// Toggle hiding of records whose record type is deselected.
    pub fn set_selected_only(&self, selected_only: bool) {
        self.inner.refilter(|predicate, registry| {
            predicate.types = selected_only.then(|| registry.selected_types_matcher());
        });
    }

    /// Indices, in this view, of every record `matcher` accepts.
    pub fn find_all_indices(&self, matcher: &Matcher) -> Vec<usize> {
        self.inner
            .state
            .read()
            .records
            .iter()
            .enumerate()
            .filter(|(_, r)| matches_guarded(matcher, r))
            .map(|(i, _)| i)
            .collect()
    }

    pub fn listener_count(&self) -> usize {
        self.inner.listeners.len()
    }
}

impl RecordSource for FilteredLedgerView {
    fn len(&self) -> usize {
        self.inner.state.read().records.len()
    }

    fn get(&self, index: usize) -> Result<Record> {
        let state = self.inner.state.read();
        state.records.get(index).cloned().ok_or(LedgerError::IndexOutOfRange {
            index,
            len: state.records.len(),
        })
    }

    fn snapshot(&self) -> Vec<Record> {
        self.inner.state.read().records.to_vec()
    }

    fn read(&self, f: &mut dyn FnMut(&[Record])) {
        f(&self.inner.state.read().records)
    }

    fn attach(
        &self,
        listener: Arc<dyn ChangeListener>,
        init: &mut dyn FnMut(&[Record]),
    ) -> ListenerId {
        let state = self.inner.state.read();
        let id = self.inner.listeners.add(listener);
        init(&state.records);
        id
    }

    fn unsubscribe(&self, id: ListenerId) -> bool {
        self.inner.listeners.remove(id)
    }
}

impl Drop for FilteredLedgerView {
    fn drop(&mut self) {
        self.inner.source.unsubscribe(self.source_listener);
        self.inner.registry.unsubscribe(self.registry_listener);
    }
}

impl ViewInner {
    fn on_source_change(&self, event: &ChangeEvent, contents: &[Record]) {
        let mut state = self.state.write();
        match event {
            ChangeEvent::Inserted { index } => {
                let Some(record) = contents.get(*index) else {
                    return;
                };
                let row = *index + state.base;
                let at = state.positions.partition_point(|&p| p < row);
                // Empty for appends
                for p in &mut state.positions[at..] {
                    *p += 1;
                }
                if !state.predicate.accepts(record) {
                    return;
                }
                state.positions.insert(at, row);
                state.records.insert(at, record.clone());
                trace!(source = index, view = at, "view insert");
                self.listeners
                    .publish(&ChangeEvent::Inserted { index: at }, &state.records);
            }
            ChangeEvent::Removed { indices } => {
                let removed = state.remove_source_rows(indices);
                if !removed.is_empty() {
                    trace!(removed = removed.len(), "view remove");
                    self.listeners
                        .publish(&ChangeEvent::Removed { indices: removed }, &state.records);
                }
            }
            ChangeEvent::Reset => {
                rebuild(&mut state, contents);
                self.listeners.publish(&ChangeEvent::Reset, &state.records);
            }
        }
    }

    /// Update the predicate and re-evaluate every source record,
    /// publishing the difference.
    fn refilter(&self, update: impl FnOnce(&mut Predicate, &RecordTypeRegistry)) {
        let mut update = Some(update);
        self.source.read(&mut |contents| {
            let mut state = self.state.write();
            if let Some(update) = update.take() {
                update(&mut state.predicate, &*self.registry);
            }
            state.normalize();
            let accepted: Vec<usize> = contents
                .iter()
                .enumerate()
                .filter(|(_, r)| state.predicate.accepts(r))
                .map(|(i, _)| i)
                .collect();
            self.apply_diff(state, contents, accepted);
        });
    }

    fn apply_diff(
        &self,
        mut state: RwLockWriteGuard<'_, ViewState>,
        contents: &[Record],
        accepted: Vec<usize>,
    ) {
        // Both lists are ascending source positions; merge them.
        let mut removed = Vec::new();
        let mut inserted = Vec::new();
        let (mut i, mut j) = (0, 0);
        loop {
            match (state.positions.get(i).copied(), accepted.get(j).copied()) {
                (Some(old), Some(new)) if old == new => {
                    i += 1;
                    j += 1;
                }
                (Some(old), Some(new)) if old < new => {
                    removed.push(i);
                    i += 1;
                }
                (Some(_), None) => {
                    removed.push(i);
                    i += 1;
                }
                (_, Some(_)) => {
                    inserted.push(j);
                    j += 1;
                }
                (None, None) => break,
            }
        }
        debug!(
            removed = removed.len(),
            inserted = inserted.len(),
            "refiltered view"
        );

        if inserted.len() > DIFF_RESET_THRESHOLD {
            state.records = accepted.iter().map(|&p| contents[p].clone()).collect();
            state.positions = accepted.into();
            self.listeners.publish(&ChangeEvent::Reset, &state.records);
            return;
        }

        if !removed.is_empty() {
            let ViewState {
                records, positions, ..
            } = &mut *state;
            let mut doomed = removed.iter().peekable();
            let mut index = 0;
            records.retain(|_| {
                let drop = doomed.next_if_eq(&&index).is_some();
                index += 1;
                !drop
            });
            positions.retain(|p| accepted.binary_search(p).is_ok());
            self.listeners
                .publish(&ChangeEvent::Removed { indices: removed }, records);
        }

        for at in inserted {
            let p = accepted[at];
            state.positions.insert(at, p);
            state.records.insert(at, contents[p].clone());
            self.listeners
                .publish(&ChangeEvent::Inserted { index: at }, &state.records);
        }
    }
}

fn rebuild(state: &mut ViewState, contents: &[Record]) {
    let ViewState {
        records,
        positions,
        base,
        predicate,
    } = state;
    records.clear();
    positions.clear();
    *base = 0;
    for (p, record) in contents.iter().enumerate() {
        if predicate.accepts(record) {
            positions.push(p);
            records.push(record.clone());
        }
    }
}

struct SourceHook {
    view: Weak<ViewInner>,
}

impl ChangeListener for SourceHook {
    fn on_change(&self, event: &ChangeEvent, contents: &[Record]) {
        if let Some(view) = self.view.upgrade() {
            view.on_source_change(event, contents);
        }
    }

    fn is_closed(&self) -> bool {
        self.view.strong_count() == 0
    }
}

struct RegistryHook {
    view: Weak<ViewInner>,
}

impl RegistryListener for RegistryHook {
    fn on_registry_change(&self, event: &RegistryEvent) {
        if !event.affects_visibility() {
            return;
        }
        let Some(view) = self.view.upgrade() else {
            return;
        };
        if view.state.read().predicate.types.is_none() {
            return;
        }
        view.refilter(|predicate, registry| {
            if predicate.types.is_some() {
                predicate.types = Some(registry.selected_types_matcher());
            }
        });
    }

    fn is_closed(&self) -> bool {
        self.view.strong_count() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::FieldMessage;
    use crate::records::RecordLedger;
    use parking_lot::Mutex;

    fn record(subject: &str) -> Record {
        Record::from_message(FieldMessage::new(subject))
    }

    fn setup() -> (Arc<RecordLedger>, Arc<RecordTypeRegistry>) {
        (Arc::new(RecordLedger::new()), RecordTypeRegistry::new())
    }

    fn recorder(view: &FilteredLedgerView) -> Arc<Mutex<Vec<ChangeEvent>>> {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        view.subscribe(Arc::new(move |e: &ChangeEvent, _: &[Record]| {
            sink.lock().push(e.clone());
        }));
        events
    }

    fn subjects(view: &FilteredLedgerView) -> Vec<String> {
        view.snapshot().iter().map(|r| r.subject().to_string()).collect()
    }

    #[test]
    fn test_initial_contents_and_incremental_insert() {
        let (ledger, registry) = setup();
        ledger.append(record("A.1"));
        ledger.append(record("B.1"));

        let view = FilteredLedgerView::new(ledger.clone(), registry, false);
        view.set_predicate(Some(Matcher::SubjectStartsWith("A".into())));
        assert_eq!(subjects(&view), vec!["A.1"]);

        let events = recorder(&view);
        ledger.append(record("B.2"));
        ledger.append(record("A.2"));
        assert_eq!(subjects(&view), vec!["A.1", "A.2"]);
        assert_eq!(*events.lock(), vec![ChangeEvent::Inserted { index: 1 }]);
    }

    #[test]
    fn test_source_removal_maps_to_view_indices() {
        let (ledger, registry) = setup();
        let records: Vec<_> = ["A.1", "B.1", "A.2", "B.2", "A.3"].iter().map(|s| record(s)).collect();
        ledger.append_all(records.clone());
        let view = FilteredLedgerView::new(ledger.clone(), registry, false);
        view.set_predicate(Some(Matcher::SubjectStartsWith("A".into())));
        let events = recorder(&view);

        // B.1 is not in the view; A.2 is view index 1
        ledger.remove_all([&records[1], &records[2]]);
        assert_eq!(subjects(&view), vec!["A.1", "A.3"]);
        assert_eq!(*events.lock(), vec![ChangeEvent::Removed { indices: vec![1] }]);

        // Positions were shifted correctly: removing A.3 hits view index 1
        ledger.remove(&records[4]);
        assert_eq!(subjects(&view), vec!["A.1"]);

        ledger.remove(&records[3]);
        assert_eq!(events.lock().len(), 2);
    }

    #[test]
    fn test_eviction_then_middle_removal() {
        let ledger = Arc::new(RecordLedger::with_config(crate::records::LedgerConfig {
            record_limit: Some(4),
        }));
        let registry = RecordTypeRegistry::new();
        let view = FilteredLedgerView::new(ledger.clone(), registry, false);
        view.set_predicate(Some(Matcher::SubjectStartsWith("A".into())));
        let events = recorder(&view);

        let records: Vec<_> = ["A.1", "B.1", "A.2", "A.3", "B.2", "A.4"]
            .iter()
            .map(|s| record(s))
            .collect();
        ledger.append_all(records.clone());
        // A.1 and B.1 were evicted; A.1 left the view from the front
        assert_eq!(subjects(&view), vec!["A.2", "A.3", "A.4"]);
        assert!(events.lock().contains(&ChangeEvent::Removed { indices: vec![0] }));

        events.lock().clear();
        ledger.remove(&records[3]);
        assert_eq!(*events.lock(), vec![ChangeEvent::Removed { indices: vec![1] }]);

        ledger.append(record("A.5"));
        assert_eq!(subjects(&view), vec!["A.2", "A.4", "A.5"]);

        // A refilter after evictions still lines up with the source
        view.set_predicate(Some(Matcher::SubjectContains(".".into())));
        assert_eq!(view.snapshot(), ledger.snapshot());
    }

    #[test]
    fn test_set_predicate_publishes_diff() {
        let (ledger, registry) = setup();
        for s in ["A.1", "B.1", "A.2", "B.2"] {
            ledger.append(record(s));
        }
        let view = FilteredLedgerView::new(ledger.clone(), registry, false);
        view.set_predicate(Some(Matcher::SubjectStartsWith("A".into())));
        let events = recorder(&view);

        view.set_predicate(Some(Matcher::SubjectEndsWith(".2".into())));
        assert_eq!(subjects(&view), vec!["A.2", "B.2"]);
        assert_eq!(
            *events.lock(),
            vec![
                ChangeEvent::Removed { indices: vec![0] },
                ChangeEvent::Inserted { index: 1 },
            ]
        );

        events.lock().clear();
        view.set_predicate(Some(Matcher::SubjectEndsWith(".2".into())));
        assert!(events.lock().is_empty());
    }

    #[test]
    fn test_large_refilter_resets() {
        let (ledger, registry) = setup();
        ledger.append_all((0..DIFF_RESET_THRESHOLD + 10).map(|i| record(&format!("S.{i}"))));
        let view = FilteredLedgerView::new(ledger.clone(), registry, false);
        view.set_predicate(Some(Matcher::Never));
        let events = recorder(&view);

        view.set_predicate(None);
        assert_eq!(view.len(), DIFF_RESET_THRESHOLD + 10);
        assert_eq!(*events.lock(), vec![ChangeEvent::Reset]);
    }

    #[test]
    fn test_deselecting_type_hides_records() {
        let (ledger, registry) = setup();
        let y = registry
            .create_type(Some("Y"), None, Some(Matcher::SubjectStartsWith("Y".into())))
            .unwrap();
        for s in ["X.1", "Y.1", "X.2", "Y.2"] {
            ledger.append(record(s));
        }
        let view = FilteredLedgerView::new(ledger.clone(), registry.clone(), true);
        assert!(view.is_selected_only());
        assert_eq!(view.len(), 4);
        let events = recorder(&view);

        y.set_selected(false);
        assert_eq!(subjects(&view), vec!["X.1", "X.2"]);
        assert_eq!(*events.lock(), vec![ChangeEvent::Removed { indices: vec![1, 3] }]);

        // Colour changes do not touch the view
        y.set_colour(crate::types::Colour::RED);
        assert_eq!(events.lock().len(), 1);

        // New arrivals follow the current selection
        ledger.append(record("Y.3"));
        assert_eq!(view.len(), 2);

        view.set_selected_only(false);
        assert_eq!(view.len(), 5);
    }

    #[test]
    fn test_reordering_types_changes_visibility() {
        let (ledger, registry) = setup();
        let a = registry
            .create_type(Some("A"), None, Some(Matcher::SubjectStartsWith("A".into())))
            .unwrap();
        let ones = registry
            .create_type(Some("Ones"), None, Some(Matcher::SubjectContains("1".into())))
            .unwrap();
        ones.set_selected(false);
        ledger.append(record("A.1"));
        ledger.append(record("B.1"));

        let view = FilteredLedgerView::new(ledger.clone(), registry.clone(), true);
        assert_eq!(subjects(&view), vec!["A.1"]);

        registry.reorder_type(&ones, 0);
        assert!(view.is_empty());

        registry.remove_type(&a);
        registry.remove_type(&ones);
        assert_eq!(view.len(), 2);
    }

    #[test]
    fn test_source_reset() {
        let (ledger, registry) = setup();
        ledger.append(record("A"));
        let view = FilteredLedgerView::new(ledger.clone(), registry, false);
        let events = recorder(&view);
        ledger.clear();
        assert!(view.is_empty());
        assert_eq!(*events.lock(), vec![ChangeEvent::Reset]);
    }

    #[test]
    fn test_find_all_indices_scans_view() {
        let (ledger, registry) = setup();
        for s in ["A.1", "B.1", "A.2", "B.2"] {
            ledger.append(record(s));
        }
        let view = FilteredLedgerView::new(ledger.clone(), registry, false);
        view.set_predicate(Some(Matcher::SubjectEndsWith(".2".into())));
        assert_eq!(view.find_all_indices(&Matcher::SubjectStartsWith("B".into())), vec![1]);
        assert_eq!(view.find_all_indices(&Matcher::custom(|_| panic!("bad"))), Vec::<usize>::new());
    }

    #[test]
    fn test_panicking_predicate_hides_record() {
        let (ledger, registry) = setup();
        let view = FilteredLedgerView::new(ledger.clone(), registry, false);
        view.set_predicate(Some(Matcher::custom(|r| {
            if r.subject().as_str() == "BAD" {
                panic!("cannot evaluate");
            }
            true
        })));
        ledger.append(record("BAD"));
        ledger.append(record("GOOD"));
        assert_eq!(subjects(&view), vec!["GOOD"]);
    }

    #[test]
    fn test_stacked_views() {
        let (ledger, registry) = setup();
        let outer = FilteredLedgerView::new(ledger.clone(), registry.clone(), false);
        outer.set_predicate(Some(Matcher::SubjectStartsWith("A".into())));
        let inner = FilteredLedgerView::new(outer.clone(), registry, false);
        inner.set_predicate(Some(Matcher::SubjectEndsWith("1".into())));

        for s in ["A.1", "B.1", "A.2", "A.11"] {
            ledger.append(record(s));
        }
        assert_eq!(subjects(&inner), vec!["A.1", "A.11"]);
    }

    #[test]
    fn test_drop_detaches() {
        let (ledger, registry) = setup();
        let view = FilteredLedgerView::new(ledger.clone(), registry, false);
        assert_eq!(ledger.listener_count(), 1);
        drop(view);
        assert_eq!(ledger.listener_count(), 0);
    }

    #[test]
    fn test_stale_index() {
        let (ledger, registry) = setup();
        let view = FilteredLedgerView::new(ledger.clone(), registry, false);
        assert!(view.get(0).unwrap_err().is_stale_index());
    }
}
