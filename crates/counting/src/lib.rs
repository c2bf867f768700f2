//! Cycle-count sessions.
//!
//! A session collects counted lines, annotates each with its variance, and
//! walks a forward-only lifecycle. Committing the count to the ledger is the
//! service layer's job; this crate holds the state machine and its rules.

pub mod session;

pub use session::{CountItem, CountItemId, CountSession, CountSessionId, CountStatus};
