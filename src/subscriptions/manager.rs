//! Listener bookkeeping shared by the ledger, views and the type registry.

use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error, warn};

use super::types::{ChangeEvent, ChangeListener, DropReason, ListenerId, SubscriptionEvent};
use crate::records::Record;

/// Registered listeners of one publisher, in registration order.
pub struct ListenerSet<L: ?Sized> {
    listeners: RwLock<BTreeMap<ListenerId, Arc<L>>>,
    next_id: AtomicU64,
}

impl<L: ?Sized> ListenerSet<L> {
    pub fn new() -> Self {
        Self {
            listeners: RwLock::new(BTreeMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn add(&self, listener: Arc<L>) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.listeners.write().insert(id, listener);
        id
    }

    /// Returns false if `id` was not registered.
    pub fn remove(&self, id: ListenerId) -> bool {
        self.listeners.write().remove(&id).is_some()
    }

    pub fn len(&self) -> usize {
        self.listeners.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.read().is_empty()
    }

    /// Call `deliver` for every listener. The listener lock is not held
    /// during delivery, so listeners may unsubscribe themselves.
    /// Listeners for which `deliver` returns false or panics are removed;
    /// the rest still receive the event.
    pub fn notify(&self, mut deliver: impl FnMut(&L) -> bool) {
        let current: Vec<(ListenerId, Arc<L>)> = self
            .listeners
            .read()
            .iter()
            .map(|(id, l)| (*id, Arc::clone(l)))
            .collect();

        let mut to_remove = Vec::new();
        for (id, listener) in current {
            match catch_unwind(AssertUnwindSafe(|| deliver(&listener))) {
                Ok(true) => {}
                Ok(false) => to_remove.push(id),
                Err(_) => {
                    error!(listener = id.0, "listener panicked, unsubscribing it");
                    to_remove.push(id);
                }
            }
        }

        if !to_remove.is_empty() {
            let mut listeners = self.listeners.write();
            for id in to_remove {
                if listeners.remove(&id).is_some() {
                    debug!(listener = id.0, "pruned closed listener");
                }
            }
        }
    }
}

impl<L: ?Sized> Default for ListenerSet<L> {
    fn default() -> Self {
        Self::new()
    }
}

impl ListenerSet<dyn ChangeListener> {
    /// Publish a change event along with the post-change contents.
    pub fn publish(&self, event: &ChangeEvent, contents: &[Record]) {
        self.notify(|listener| {
            listener.on_change(event, contents);
            !listener.is_closed()
        });
    }
}

/// Forwards change events into a bounded channel.
///
/// One slot beyond `buffer_size` is reserved so a subscriber that falls
/// behind always receives its `Dropped` notice.
struct ChannelListener {
    sender: Sender<SubscriptionEvent>,
    buffer_size: usize,
    closed: AtomicBool,
}

impl ChannelListener {
    fn close(&self, reason: DropReason) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        warn!(?reason, "dropping channel subscriber");
        // Best effort: the receiver may already be gone.
        let _ = self.sender.try_send(SubscriptionEvent::Dropped { reason });
    }
}

impl ChangeListener for ChannelListener {
    fn on_change(&self, event: &ChangeEvent, _contents: &[Record]) {
        if self.closed.load(Ordering::SeqCst) {
            return;
        }
        if self.sender.len() >= self.buffer_size {
            self.close(DropReason::BufferOverflow);
            return;
        }
        match self.sender.try_send(SubscriptionEvent::Change(event.clone())) {
            Ok(()) => {}
            Err(crossbeam_channel::TrySendError::Full(_)) => self.close(DropReason::BufferOverflow),
            Err(crossbeam_channel::TrySendError::Disconnected(_)) => {
                debug!("channel subscriber went away");
                self.closed.store(true, Ordering::SeqCst)
            }
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Create a channel-backed listener and the receiving end of its channel.
pub fn channel_listener(
    buffer_size: usize,
) -> (Arc<dyn ChangeListener>, Receiver<SubscriptionEvent>) {
    let buffer_size = buffer_size.max(1);
    let (sender, receiver) = bounded(buffer_size + 1);
    let listener = ChannelListener {
        sender,
        buffer_size,
        closed: AtomicBool::new(false),
    };
    (Arc::new(listener), receiver)
}
