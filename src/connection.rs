//! Connections feeding records into a ledger.
//!
//! The transport itself lives elsewhere; a [`Connection`] here is the
//! identity records point back to plus the start/pause/stop gate the
//! transport's arrival callback passes through.

use crate::error::{LedgerError, Result};
use crate::message::MessageHandle;
use crate::records::{Record, RecordLedger};
use crate::types::Timestamp;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Whether a connection is currently feeding the ledger.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Stopped,
    Started,
    Paused,
}

/// A named source of messages.
#[derive(Debug)]
pub struct Connection {
    name: String,
    description: Mutex<String>,
    state: Mutex<ConnectionState>,
    /// Messages discarded while not started.
    discarded: AtomicU64,
}

impl Connection {
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            description: Mutex::new(String::new()),
            state: Mutex::new(ConnectionState::Stopped),
            discarded: AtomicU64::new(0),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> String {
        self.description.lock().clone()
    }

    pub fn set_description(&self, description: impl Into<String>) {
        *self.description.lock() = description.into();
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.lock()
    }

    pub fn start(&self) {
        self.set_state(ConnectionState::Started);
    }

    pub fn pause(&self) {
        self.set_state(ConnectionState::Paused);
    }

    pub fn stop(&self) {
        self.set_state(ConnectionState::Stopped);
    }

    fn set_state(&self, state: ConnectionState) {
        let old = std::mem::replace(&mut *self.state.lock(), state);
        if old != state {
            info!(connection = %self.name, ?old, new = ?state, "connection state changed");
        }
    }

    pub fn discarded(&self) -> u64 {
        self.discarded.load(Ordering::Relaxed)
    }

    /// Arrival callback: record `message` and append it to `ledger`.
    ///
    /// Messages arriving while the connection is not started are
    /// discarded and `None` is returned.
    pub fn deliver(
        self: &Arc<Self>,
        ledger: &RecordLedger,
        message: Arc<dyn MessageHandle>,
        timestamp: Option<Timestamp>,
    ) -> Option<Record> {
        if self.state() != ConnectionState::Started {
            self.discarded.fetch_add(1, Ordering::Relaxed);
            debug!(connection = %self.name, "discarding message, connection not started");
            return None;
        }
        let record = Record::new(Some(self), message, timestamp);
        ledger.append(record.clone());
        Some(record)
    }
}

/// The set of uniquely named connections in a session.
#[derive(Default)]
pub struct Connections {
    connections: RwLock<Vec<Arc<Connection>>>,
}

impl Connections {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection. Fails if the name is already taken.
    pub fn add(&self, connection: Arc<Connection>) -> Result<()> {
        let mut connections = self.connections.write();
        if connections.iter().any(|c| c.name() == connection.name()) {
            return Err(LedgerError::DuplicateName(connection.name().to_string()));
        }
        connections.push(connection);
        Ok(())
    }

    /// Remove and stop the named connection.
    pub fn remove(&self, name: &str) -> Option<Arc<Connection>> {
        let mut connections = self.connections.write();
        let index = connections.iter().position(|c| c.name() == name)?;
        let connection = connections.remove(index);
        connection.stop();
        Some(connection)
    }

    pub fn get(&self, name: &str) -> Option<Arc<Connection>> {
        self.connections.read().iter().find(|c| c.name() == name).cloned()
    }

    pub fn all(&self) -> Vec<Arc<Connection>> {
        self.connections.read().clone()
    }

    pub fn len(&self) -> usize {
        self.connections.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.read().is_empty()
    }
}
