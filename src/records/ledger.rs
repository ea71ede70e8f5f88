//! The authoritative, concurrently writable record ledger.

use crate::error::{LedgerError, Result};
use crate::records::{Record, Window};
use crate::source::RecordSource;
use crate::subscriptions::{ChangeEvent, ChangeListener, ListenerId, ListenerSet};
use crate::types::Sequence;
use parking_lot::RwLock;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, trace};

/// Ledger configuration.
#[derive(Clone, Debug, Default)]
pub struct LedgerConfig {
    /// Keep at most this many records, evicting the oldest on append.
    /// `None` keeps everything until it is explicitly removed.
    pub record_limit: Option<usize>,
}

/// Ordered store of every record received (until removed).
///
/// Writers hold the lock for the mutation and the publish of its event,
/// so listeners observe changes one at a time and in order, and readers
/// never see a half-applied append.
pub struct RecordLedger {
    records: RwLock<Window<Record>>,
    listeners: ListenerSet<dyn ChangeListener>,
    config: LedgerConfig,
}

impl RecordLedger {
    pub fn new() -> Self {
        Self::with_config(LedgerConfig::default())
    }

    pub fn with_config(config: LedgerConfig) -> Self {
        Self {
            records: RwLock::new(Window::new()),
            listeners: ListenerSet::new(),
            config,
        }
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// Append one record. Returns its index.
    pub fn append(&self, record: Record) -> usize {
        let mut records = self.records.write();
        self.evict_for(&mut records, 1);
        records.push(record);
        let index = records.len() - 1;
        trace!(index, "appended record");
        self.listeners.publish(&ChangeEvent::Inserted { index }, &records);
        index
    }

    /// Append several records under a single lock acquisition.
    pub fn append_all(&self, batch: impl IntoIterator<Item = Record>) -> usize {
        let mut records = self.records.write();
        let mut appended = 0;
        for record in batch {
            self.evict_for(&mut records, 1);
            records.push(record);
            let index = records.len() - 1;
            self.listeners.publish(&ChangeEvent::Inserted { index }, &records);
            appended += 1;
        }
        debug!(appended, "appended batch");
        appended
    }

    /// Remove every record in `targets`. Publishes one `Removed` event.
    /// Returns the number of records removed.
    pub fn remove_all<'a>(&self, targets: impl IntoIterator<Item = &'a Record>) -> usize {
        let doomed: HashSet<Sequence> = targets.into_iter().map(Record::sequence).collect();
        if doomed.is_empty() {
            return 0;
        }

        let mut records = self.records.write();
        let mut indices = Vec::new();
        let mut index = 0;
        records.retain(|r| {
            let remove = doomed.contains(&r.sequence());
            if remove {
                indices.push(index);
            }
            index += 1;
            !remove
        });

        let removed = indices.len();
        if removed > 0 {
            debug!(removed, "removed records");
            self.listeners.publish(&ChangeEvent::Removed { indices }, &records);
        }
        removed
    }

    pub fn remove(&self, record: &Record) -> bool {
        self.remove_all(std::iter::once(record)) == 1
    }

    /// Drop everything. Publishes `Reset`.
    pub fn clear(&self) {
        let mut records = self.records.write();
        let dropped = records.len();
        records.clear();
        debug!(dropped, "cleared ledger");
        self.listeners.publish(&ChangeEvent::Reset, &records);
    }

    /// Evict the oldest records so at most `keep` remain.
    pub fn retain_latest(&self, keep: usize) -> usize {
        let mut records = self.records.write();
        let excess = records.len().saturating_sub(keep);
        if excess > 0 {
            records.drop_front(excess);
            self.listeners.publish(
                &ChangeEvent::Removed {
                    indices: (0..excess).collect(),
                },
                &records,
            );
        }
        excess
    }

    /// Position of `record`, searching from the newest end.
    pub fn index_of(&self, record: &Record) -> Option<usize> {
        self.records.read().iter().rposition(|r| r == record)
    }

    pub fn contains(&self, record: &Record) -> bool {
        self.index_of(record).is_some()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    fn evict_for(&self, records: &mut Window<Record>, incoming: usize) {
        let Some(limit) = self.config.record_limit else {
            return;
        };
        let limit = limit.max(1);
        let excess = (records.len() + incoming).saturating_sub(limit).min(records.len());
        if excess > 0 {
            records.drop_front(excess);
            trace!(excess, "evicted oldest records");
            self.listeners.publish(
                &ChangeEvent::Removed {
                    indices: (0..excess).collect(),
                },
                records,
            );
        }
    }
}

impl Default for RecordLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordSource for RecordLedger {
    fn len(&self) -> usize {
        self.records.read().len()
    }

    fn get(&self, index: usize) -> Result<Record> {
        let records = self.records.read();
        records.get(index).cloned().ok_or(LedgerError::IndexOutOfRange {
            index,
            len: records.len(),
        })
    }

    fn snapshot(&self) -> Vec<Record> {
        self.records.read().to_vec()
    }

    fn read(&self, f: &mut dyn FnMut(&[Record])) {
        f(&self.records.read())
    }

    fn attach(
        &self,
        listener: Arc<dyn ChangeListener>,
        init: &mut dyn FnMut(&[Record]),
    ) -> ListenerId {
        let records = self.records.read();
        let id = self.listeners.add(listener);
        init(&records);
        id
    }

    fn unsubscribe(&self, id: ListenerId) -> bool {
        self.listeners.remove(id)
    }
}
