use std::collections::HashMap;
use std::sync::RwLock;

use crate::product::{Catalog, CatalogProduct, ProductId};

/// In-memory catalog.
///
/// Intended for tests/dev. Real deployments adapt the REST catalog behind the
/// same trait.
#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    products: RwLock<HashMap<ProductId, CatalogProduct>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, product: CatalogProduct) {
        let mut products = self.products.write().unwrap_or_else(|e| e.into_inner());
        products.insert(product.id, product);
    }

    pub fn len(&self) -> usize {
        self.products
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Catalog for InMemoryCatalog {
    fn product(&self, id: ProductId) -> Option<CatalogProduct> {
        self.products
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&id)
            .cloned()
    }
}
