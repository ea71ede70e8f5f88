//! Derived, live projections of a record source.
//!
//! Views implement [`RecordSource`](crate::RecordSource) themselves, so
//! they stack: a sorted view over a filtered view over the ledger is kept
//! current one change at a time.

mod filtered;
mod sorted;

pub use filtered::{FilteredLedgerView, DIFF_RESET_THRESHOLD};
pub use sorted::{SortDirection, SortKey, SortOrder, SortedLedgerView};
