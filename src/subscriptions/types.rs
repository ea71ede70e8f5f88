//! Change events and listener types.

use crate::records::Record;
use std::sync::Arc;

/// Granular change to an ordered record collection.
///
/// `Inserted` carries the index of the new element in the post-change
/// contents. `Removed` carries ascending indices relative to the
/// contents *before* the removal; apply them in reverse order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChangeEvent {
    Inserted { index: usize },
    Removed { indices: Vec<usize> },
    Reset,
}

/// Receives change events from a ledger or view.
///
/// Called while the publisher holds its write lock, with the
/// post-change contents. Implementations must not mutate the publisher
/// (or anything upstream of it) from inside the callback.
pub trait ChangeListener: Send + Sync {
    fn on_change(&self, event: &ChangeEvent, contents: &[Record]);

    /// A closed listener is pruned after the publish that observed it.
    fn is_closed(&self) -> bool {
        false
    }
}

impl<F> ChangeListener for F
where
    F: Fn(&ChangeEvent, &[Record]) + Send + Sync,
{
    fn on_change(&self, event: &ChangeEvent, contents: &[Record]) {
        self(event, contents)
    }
}

/// Unique identifier for a registered listener.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ListenerId(pub u64);

/// Why a channel subscription was dropped.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DropReason {
    /// Send buffer overflowed (slow consumer).
    BufferOverflow,
}

/// Events delivered through a channel subscription.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SubscriptionEvent {
    Change(ChangeEvent),
    /// No further events will arrive.
    Dropped { reason: DropReason },
}

/// Handle to a channel subscription, for pumping events on a consumer thread.
pub struct SubscriptionHandle {
    pub id: ListenerId,
    /// Channel to receive events.
    pub receiver: crossbeam_channel::Receiver<SubscriptionEvent>,
    pub(crate) listener: Arc<dyn ChangeListener>,
}

impl SubscriptionHandle {
    /// Receive the next event (blocking).
    pub fn recv(&self) -> Result<SubscriptionEvent, crossbeam_channel::RecvError> {
        self.receiver.recv()
    }

    /// Try to receive an event (non-blocking).
    pub fn try_recv(&self) -> Result<SubscriptionEvent, crossbeam_channel::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Receive with timeout.
    pub fn recv_timeout(
        &self,
        timeout: std::time::Duration,
    ) -> Result<SubscriptionEvent, crossbeam_channel::RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }

    /// Drain everything currently buffered.
    pub fn drain(&self) -> Vec<SubscriptionEvent> {
        self.receiver.try_iter().collect()
    }

    /// Whether the publisher has given up on this subscriber.
    pub fn is_dropped(&self) -> bool {
        self.listener.is_closed()
    }
}
