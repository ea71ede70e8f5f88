//! Record matchers.
//!
//! Matchers form a closed set. Persistable kinds are registered in a
//! static table keyed by a stable type key (what projects store) and a
//! display name (what users pick); [`Matcher::create`] accepts either.

mod kinds;
mod matcher;

pub use kinds::MatcherKind;
pub use matcher::{matches_guarded, Matcher, Pattern};
