//! Serial-number reconciliation for serial-tracked goods.
//!
//! An observed set of serials is diffed against the expected in-stock set;
//! the diff either stands alone (dry-run) or drives one aggregate stock
//! correction through the ledger.

pub mod reconcile;
pub mod registry;

pub use reconcile::{ReconciliationDiff, SerialReconciler};
pub use registry::{SerialNumber, SerialRegistry, SerialStatus};
