//! Sorted projection of a record source.

use crate::error::{LedgerError, Result};
use crate::records::{Record, Window};
use crate::source::RecordSource;
use crate::subscriptions::{ChangeEvent, ChangeListener, ListenerId, ListenerSet};
use parking_lot::RwLock;
use std::cmp::Ordering;
use std::sync::{Arc, Weak};
use tracing::{debug, trace};

/// Column a [`SortedLedgerView`] orders by.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum SortKey {
    #[default]
    Sequence,
    Timestamp,
    Subject,
    Size,
    TrackingId,
    Connection,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct SortOrder {
    pub key: SortKey,
    pub direction: SortDirection,
}

impl SortOrder {
    pub fn new(key: SortKey, direction: SortDirection) -> Self {
        Self { key, direction }
    }

    pub fn ascending(key: SortKey) -> Self {
        Self::new(key, SortDirection::Ascending)
    }

    pub fn descending(key: SortKey) -> Self {
        Self::new(key, SortDirection::Descending)
    }

    /// Total order: equal keys fall back to sequence number.
    pub fn compare(&self, a: &Record, b: &Record) -> Ordering {
        let primary = match self.key {
            SortKey::Sequence => Ordering::Equal,
            SortKey::Timestamp => a.timestamp().cmp(&b.timestamp()),
            SortKey::Subject => a.subject().cmp(b.subject()),
            SortKey::Size => a.size().cmp(&b.size()),
            SortKey::TrackingId => a.tracking_id().cmp(b.tracking_id()),
            SortKey::Connection => a.connection_name().cmp(&b.connection_name()),
        };
        let ordering = primary.then_with(|| a.sequence().cmp(&b.sequence()));
        match self.direction {
            SortDirection::Ascending => ordering,
            SortDirection::Descending => ordering.reverse(),
        }
    }
}

struct SortState {
    /// Source contents, needed to resolve pre-removal indices.
    mirror: Window<Record>,
    sorted: Window<Record>,
    order: SortOrder,
}

impl SortState {
    fn position_of(&self, record: &Record) -> Option<usize> {
        let order = self.order;
        self.sorted
            .binary_search_by(|probe| order.compare(probe, record))
            .ok()
    }

    fn resort(&mut self) {
        let order = self.order;
        let mut sorted = self.mirror.to_vec();
        sorted.sort_by(|a, b| order.compare(a, b));
        self.sorted = sorted.into();
    }
}

struct SortInner {
    source: Arc<dyn RecordSource>,
    state: RwLock<SortState>,
    listeners: ListenerSet<dyn ChangeListener>,
}

/// The records of a source, reordered by a [`SortOrder`].
pub struct SortedLedgerView {
    inner: Arc<SortInner>,
    source_listener: ListenerId,
}

impl SortedLedgerView {
    pub fn new(source: Arc<dyn RecordSource>, order: SortOrder) -> Arc<Self> {
        let inner = Arc::new(SortInner {
            source: Arc::clone(&source),
            state: RwLock::new(SortState {
                mirror: Window::new(),
                sorted: Window::new(),
                order,
            }),
            listeners: ListenerSet::new(),
        });
        let source_listener = source.attach(
            Arc::new(SortHook {
                view: Arc::downgrade(&inner),
            }),
            &mut |contents| {
                let mut state = inner.state.write();
                state.mirror = contents.to_vec().into();
                state.resort();
            },
        );
        Arc::new(Self {
            inner,
            source_listener,
        })
    }

    pub fn sort_order(&self) -> SortOrder {
        self.inner.state.read().order
    }

    /// Re-sort by `order`. Publishes `Reset` if the order changed.
    pub fn set_sort(&self, order: SortOrder) {
        let mut state = self.inner.state.write();
        if state.order == order {
            return;
        }
        state.order = order;
        state.resort();
        debug!(?order, "re-sorted view");
        self.inner.listeners.publish(&ChangeEvent::Reset, &state.sorted);
    }
}

impl SortInner {
    fn on_source_change(&self, event: &ChangeEvent, contents: &[Record]) {
        let mut state = self.state.write();
        match event {
            ChangeEvent::Inserted { index } => {
                let Some(record) = contents.get(*index) else {
                    return;
                };
                let at = (*index).min(state.mirror.len());
                state.mirror.insert(at, record.clone());

                let order = state.order;
                let at = state
                    .sorted
                    .partition_point(|r| order.compare(r, record) == Ordering::Less);
                state.sorted.insert(at, record.clone());
                trace!(index = at, "sorted insert");
                self.listeners
                    .publish(&ChangeEvent::Inserted { index: at }, &state.sorted);
            }
            ChangeEvent::Removed { indices } => {
                let gone: Vec<Record> = indices
                    .iter()
                    .filter_map(|&i| state.mirror.get(i).cloned())
                    .collect();
                state.mirror.remove_indices(indices);

                let mut removed: Vec<usize> =
                    gone.iter().filter_map(|r| state.position_of(r)).collect();
                removed.sort_unstable();
                removed.dedup();
                state.sorted.remove_indices(&removed);
                if !removed.is_empty() {
                    self.listeners
                        .publish(&ChangeEvent::Removed { indices: removed }, &state.sorted);
                }
            }
            ChangeEvent::Reset => {
                state.mirror = contents.to_vec().into();
                state.resort();
                self.listeners.publish(&ChangeEvent::Reset, &state.sorted);
            }
        }
    }
}

impl RecordSource for SortedLedgerView {
    fn len(&self) -> usize {
        self.inner.state.read().sorted.len()
    }

    fn get(&self, index: usize) -> Result<Record> {
        let state = self.inner.state.read();
        state.sorted.get(index).cloned().ok_or(LedgerError::IndexOutOfRange {
            index,
            len: state.sorted.len(),
        })
    }

    fn snapshot(&self) -> Vec<Record> {
        self.inner.state.read().sorted.to_vec()
    }

    fn read(&self, f: &mut dyn FnMut(&[Record])) {
        f(&self.inner.state.read().sorted)
    }

    fn attach(
        &self,
        listener: Arc<dyn ChangeListener>,
        init: &mut dyn FnMut(&[Record]),
    ) -> ListenerId {
        let state = self.inner.state.read();
        let id = self.inner.listeners.add(listener);
        init(&state.sorted);
        id
    }

    fn unsubscribe(&self, id: ListenerId) -> bool {
        self.inner.listeners.remove(id)
    }
}

impl Drop for SortedLedgerView {
    fn drop(&mut self) {
        self.inner.source.unsubscribe(self.source_listener);
    }
}

struct SortHook {
    view: Weak<SortInner>,
}

impl ChangeListener for SortHook {
    fn on_change(&self, event: &ChangeEvent, contents: &[Record]) {
        if let Some(view) = self.view.upgrade() {
            view.on_source_change(event, contents);
        }
    }

    fn is_closed(&self) -> bool {
        self.view.strong_count() == 0
    }
}
