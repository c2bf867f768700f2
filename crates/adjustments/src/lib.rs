//! Manual stock corrections, committed in batches.
//!
//! The caller builds an immutable [`AdjustmentBatch`], the processor
//! validates it and drives the stock ledger, and a [`BatchReport`] accounts
//! for every line — committed, skipped, or failed — with its financial
//! impact.

pub mod batch;
pub mod processor;

pub use batch::{AdjustmentBatch, AdjustmentItem, AdjustmentKind, BatchId};
pub use processor::{
    AdjustmentFailure, AdjustmentOutcome, BatchPolicy, BatchProcessor, BatchReport,
};
