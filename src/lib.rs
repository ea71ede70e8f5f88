//! # rvsnoop
//!
//! The record ledger behind a message-bus snooper: captures every message
//! that arrives on a set of connections, classifies each one against an
//! ordered, user-editable list of record types, and keeps any number of
//! filtered and sorted views current one change at a time.
//!
//! ## Core Concepts
//!
//! - **Records**: Immutable snapshots of received messages, identified by
//!   a process-wide sequence number
//! - **Ledger**: The concurrently writable, observable store of records
//! - **Record types**: Named, coloured matching rules; first match wins
//! - **Views**: Live filtered or sorted projections that publish granular
//!   insert/remove events
//!
//! ## Example
//!
//! ```ignore
//! use rvsnoop::{Connection, FieldMessage, Matcher, RecordSource, SnoopContext};
//! use std::sync::Arc;
//!
//! let ctx = SnoopContext::default();
//! let view = ctx.filtered_view(true);
//!
//! let conn = Connection::new("prod");
//! ctx.connections().add(conn.clone())?;
//! conn.start();
//! ctx.deliver(&conn, Arc::new(FieldMessage::new("ORDERS.ERROR")));
//!
//! // Hide everything the "Error" type claims
//! ctx.registry().get("Error").unwrap().set_selected(false);
//! assert!(view.is_empty());
//! ```

pub mod connection;
pub mod context;
pub mod error;
pub mod matchers;
pub mod message;
pub mod record_types;
pub mod records;
pub mod source;
pub mod subscriptions;
pub mod types;
pub mod views;

// Re-exports
pub use connection::{Connection, ConnectionState, Connections};
pub use context::{SnoopConfig, SnoopContext};
pub use error::{LedgerError, Result};
pub use matchers::{matches_guarded, Matcher, MatcherKind, Pattern};
pub use message::{Field, FieldMessage, FieldValue, MessageError, MessageHandle};
pub use record_types::{
    ImportReport, RecordType, RecordTypeDescriptor, RecordTypeRegistry, RegistryEvent,
    RegistryListener, TypeChange, TypeListener, DEFAULT_TYPE_NAME,
};
pub use records::{
    load_capture, read_capture, reset_sequence_counter, save_capture, write_capture, LedgerConfig,
    Record, RecordLedger,
};
pub use source::RecordSource;
pub use subscriptions::{
    ChangeEvent, ChangeListener, DropReason, ListenerId, SubscriptionEvent, SubscriptionHandle,
};
pub use types::*;
pub use views::{FilteredLedgerView, SortDirection, SortKey, SortOrder, SortedLedgerView};
