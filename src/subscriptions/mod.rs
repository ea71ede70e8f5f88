//! Change notification for ledgers, views and the type registry.
//!
//! Publishers keep an explicit [`ListenerSet`]; nothing goes through a
//! global event bus. Two ways to listen:
//! - Register a [`ChangeListener`] callback. It runs synchronously on the
//!   publishing thread with the post-change contents, which is how views
//!   stay in lock-step with their source.
//! - Open a channel subscription and pump [`SubscriptionEvent`]s on a
//!   consumer thread (e.g. a UI event loop). Slow consumers are dropped.
//!
//! # Example
//!
//! ```ignore
//! let handle = ledger.subscribe_channel(1024);
//!
//! loop {
//!     match handle.recv() {
//!         Ok(SubscriptionEvent::Change(ChangeEvent::Inserted { index })) => {
//!             let record = ledger.get(index)?;
//!             // add a table row
//!         }
//!         Ok(SubscriptionEvent::Change(_)) => { /* remove rows / reload */ }
//!         Ok(SubscriptionEvent::Dropped { .. }) | Err(_) => break,
//!     }
//! }
//! ```

mod manager;
mod types;

pub use manager::{channel_listener, ListenerSet};
pub use types::{
    ChangeEvent, ChangeListener, DropReason, ListenerId, SubscriptionEvent, SubscriptionHandle,
};
