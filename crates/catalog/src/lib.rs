//! Product catalog port.
//!
//! The catalog is an external collaborator: this crate defines the read-only
//! contract the reconciliation engine consumes, plus an in-memory
//! implementation for tests and development.

pub mod in_memory;
pub mod product;

pub use in_memory::InMemoryCatalog;
pub use product::{Catalog, CatalogProduct, ProductId};
