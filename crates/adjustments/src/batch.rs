use serde::{Deserialize, Serialize};

use stocktake_catalog::ProductId;
use stocktake_core::{AggregateId, DomainError, DomainResult};

/// Adjustment batch identifier; referenced from every movement the batch
/// commits (and from any rollback of it).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BatchId(pub AggregateId);

impl BatchId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for BatchId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// How one correction line computes its target quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdjustmentKind {
    /// `new = current + quantity`
    Increase,
    /// `new = max(0, current − quantity)`
    Decrease,
    /// `new = quantity`
    Set,
}

/// One manual stock correction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdjustmentItem {
    pub product_id: ProductId,
    pub kind: AdjustmentKind,
    pub quantity: i64,
    pub reason: String,
}

impl AdjustmentItem {
    pub fn validate(&self) -> DomainResult<()> {
        if self.quantity < 0 {
            return Err(DomainError::validation("quantity cannot be negative"));
        }
        if self.reason.trim().is_empty() {
            return Err(DomainError::validation("reason cannot be empty"));
        }
        Ok(())
    }
}

/// An immutable pending batch, built by the caller and submitted whole.
///
/// Order matters: items apply in sequence, and the same product may appear
/// more than once (later lines see earlier lines' effect).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdjustmentBatch {
    pub id: BatchId,
    pub notes: Option<String>,
    pub items: Vec<AdjustmentItem>,
}

impl AdjustmentBatch {
    pub fn new(notes: Option<String>, items: Vec<AdjustmentItem>) -> DomainResult<Self> {
        if items.is_empty() {
            return Err(DomainError::validation("batch must have items"));
        }
        Ok(Self {
            id: BatchId::new(AggregateId::new()),
            notes,
            items,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_product_id() -> ProductId {
        ProductId::new(AggregateId::new())
    }

    #[test]
    fn empty_batch_is_rejected() {
        assert!(AdjustmentBatch::new(None, vec![]).is_err());
    }

    #[test]
    fn item_validation_checks_quantity_and_reason() {
        let bad_quantity = AdjustmentItem {
            product_id: test_product_id(),
            kind: AdjustmentKind::Increase,
            quantity: -1,
            reason: "damaged".to_string(),
        };
        assert!(bad_quantity.validate().is_err());

        let bad_reason = AdjustmentItem {
            product_id: test_product_id(),
            kind: AdjustmentKind::Set,
            quantity: 3,
            reason: "  ".to_string(),
        };
        assert!(bad_reason.validate().is_err());
    }
}
