//! Records and the ledger that stores them.
//!
//! A [`Record`] is an immutable snapshot of one received message. The
//! [`RecordLedger`] holds every record in arrival order and publishes a
//! [`ChangeEvent`](crate::ChangeEvent) for each mutation. Capture files
//! save and replay records.

mod capture;
mod ledger;
mod record;
mod window;

pub use capture::{load_capture, read_capture, save_capture, write_capture};
pub use ledger::{LedgerConfig, RecordLedger};
pub use record::{reset_sequence_counter, Record};
pub(crate) use window::Window;
