//! Variance calculation for cycle counts.
//!
//! Pure functions only: recorded vs counted quantity in, signed difference,
//! percentage, and classification out. No state, no IO, no locking — safe on
//! every dry-run path.

pub mod calc;

pub use calc::{
    difference, total_value_difference, variance_pct, Classification, Variance, VarianceThreshold,
};
