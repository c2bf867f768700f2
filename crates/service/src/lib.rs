//! Boundary operations over the reconciliation engine.
//!
//! Transport-agnostic: HTTP handlers, CLI tooling, and tests all call the
//! same [`InventoryService`] operations. Authorization and the product
//! catalog are ports; the ledger, count sessions, batch processor, and
//! serial reconciler are wired here.

pub mod auth;
pub mod service;

mod integration_tests;

pub use auth::{capability, Authorizer, StaticAuthorizer};
pub use service::{
    CountLine, InventoryService, ServiceConfig, StartCycleCountResponse,
    SubmitCycleCountResponse,
};
