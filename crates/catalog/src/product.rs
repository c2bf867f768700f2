use serde::{Deserialize, Serialize};

use stocktake_core::{AggregateId, DomainError, DomainResult, Money};

/// Product identifier (catalog-owned).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(pub AggregateId);

impl ProductId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for ProductId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Read-only product snapshot as served by the catalog collaborator.
///
/// The catalog owns SKU and costing; the stock ledger owns quantity once the
/// product is tracked. `current_stock` here is the quantity the catalog knew
/// at snapshot time and seeds the ledger on first contact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogProduct {
    pub id: ProductId,
    pub sku: String,
    pub current_stock: i64,
    pub cost_price: Money,
}

impl CatalogProduct {
    pub fn new(
        id: ProductId,
        sku: impl Into<String>,
        current_stock: i64,
        cost_price: Money,
    ) -> DomainResult<Self> {
        let sku = sku.into();
        if sku.trim().is_empty() {
            return Err(DomainError::validation("sku cannot be empty"));
        }
        if current_stock < 0 {
            return Err(DomainError::validation("current_stock cannot be negative"));
        }
        if cost_price.is_negative() {
            return Err(DomainError::validation("cost_price cannot be negative"));
        }
        Ok(Self {
            id,
            sku,
            current_stock,
            cost_price,
        })
    }
}

/// Port to the product catalog (an excluded collaborator).
///
/// Lookups are read-only; this engine never writes back through the catalog.
pub trait Catalog: Send + Sync {
    fn product(&self, id: ProductId) -> Option<CatalogProduct>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_product_id() -> ProductId {
        ProductId::new(AggregateId::new())
    }

    #[test]
    fn rejects_negative_stock_and_cost() {
        let id = test_product_id();
        assert!(CatalogProduct::new(id, "SKU-1", -1, Money::zero()).is_err());
        assert!(CatalogProduct::new(id, "SKU-1", 0, Money::from_cents(-5)).is_err());
        assert!(CatalogProduct::new(id, "  ", 0, Money::zero()).is_err());
        assert!(CatalogProduct::new(id, "SKU-1", 0, Money::zero()).is_ok());
    }
}
