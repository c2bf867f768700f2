use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use stocktake_catalog::ProductId;
use stocktake_core::{DomainError, DomainResult};

/// A unique item identifier etched on serial-tracked goods.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SerialNumber(String);

impl SerialNumber {
    pub fn new(value: impl Into<String>) -> DomainResult<Self> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(DomainError::validation("serial number cannot be empty"));
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for SerialNumber {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Whether a serial is currently on the books at this site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SerialStatus {
    InStock,
    Removed,
}

/// Per-product serial status store.
///
/// Statuses transition between `InStock` and `Removed`; rows are never
/// deleted, so a serial that disappears and later resurfaces keeps its
/// identity.
#[derive(Debug, Default)]
pub struct SerialRegistry {
    serials: RwLock<HashMap<ProductId, BTreeMap<SerialNumber, SerialStatus>>>,
}

impl SerialRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark serials in stock (goods received). Existing rows are flipped back
    /// to `InStock`; new rows are created.
    pub fn register(&self, product_id: ProductId, serials: &[SerialNumber]) -> DomainResult<()> {
        let mut map = self
            .serials
            .write()
            .map_err(|_| DomainError::conflict("serial registry lock poisoned"))?;
        let entry = map.entry(product_id).or_default();
        for serial in serials {
            entry.insert(serial.clone(), SerialStatus::InStock);
        }
        Ok(())
    }

    /// Serials currently marked in stock, in stable (sorted) order.
    pub fn in_stock(&self, product_id: ProductId) -> Vec<SerialNumber> {
        let map = match self.serials.read() {
            Ok(g) => g,
            Err(poisoned) => {
                return poisoned
                    .into_inner()
                    .get(&product_id)
                    .map(in_stock_of)
                    .unwrap_or_default()
            }
        };
        map.get(&product_id).map(in_stock_of).unwrap_or_default()
    }

    pub fn status(&self, product_id: ProductId, serial: &SerialNumber) -> Option<SerialStatus> {
        self.serials
            .read()
            .ok()?
            .get(&product_id)
            .and_then(|m| m.get(serial))
            .copied()
    }

    /// Apply status transitions decided by a reconciliation.
    pub fn transition(
        &self,
        product_id: ProductId,
        to_in_stock: &[SerialNumber],
        to_removed: &[SerialNumber],
    ) -> DomainResult<()> {
        let mut map = self
            .serials
            .write()
            .map_err(|_| DomainError::conflict("serial registry lock poisoned"))?;
        let entry = map.entry(product_id).or_default();
        for serial in to_in_stock {
            entry.insert(serial.clone(), SerialStatus::InStock);
        }
        for serial in to_removed {
            entry.insert(serial.clone(), SerialStatus::Removed);
        }
        Ok(())
    }
}

fn in_stock_of(serials: &BTreeMap<SerialNumber, SerialStatus>) -> Vec<SerialNumber> {
    serials
        .iter()
        .filter(|(_, status)| **status == SerialStatus::InStock)
        .map(|(serial, _)| serial.clone())
        .collect()
}
