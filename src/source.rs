//! The read/subscribe interface shared by the ledger and every view.

use crate::error::Result;
use crate::records::Record;
use crate::subscriptions::{channel_listener, ChangeListener, ListenerId, SubscriptionHandle};
use std::sync::Arc;

/// An observable, position-indexed sequence of records.
///
/// Implemented by [`RecordLedger`](crate::RecordLedger) and by the views
/// layered on top of it, so views can be stacked.
pub trait RecordSource: Send + Sync {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Record at `index`, or `IndexOutOfRange` if the index is stale.
    fn get(&self, index: usize) -> Result<Record>;

    /// Copy of the current contents.
    fn snapshot(&self) -> Vec<Record>;

    /// Run `f` against the current contents while holding the read lock.
    fn read(&self, f: &mut dyn FnMut(&[Record]));

    /// Register `listener` and hand the current contents to `init`, with
    /// no change able to slip in between.
    fn attach(
        &self,
        listener: Arc<dyn ChangeListener>,
        init: &mut dyn FnMut(&[Record]),
    ) -> ListenerId;

    fn subscribe(&self, listener: Arc<dyn ChangeListener>) -> ListenerId {
        self.attach(listener, &mut |_| {})
    }

    /// Returns false if `id` was not registered.
    fn unsubscribe(&self, id: ListenerId) -> bool;

    /// Subscribe through a bounded channel, for consumers that pump
    /// events on their own thread.
    fn subscribe_channel(&self, buffer_size: usize) -> SubscriptionHandle {
        let (listener, receiver) = channel_listener(buffer_size);
        let id = self.subscribe(Arc::clone(&listener));
        SubscriptionHandle {
            id,
            receiver,
            listener,
        }
    }
}
