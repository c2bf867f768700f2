use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stocktake_catalog::ProductId;
use stocktake_core::{AggregateId, Entity, LocationId, UserId};

/// Stock movement identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MovementId(pub AggregateId);

impl MovementId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for MovementId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// What drove a movement. Stable names; these end up in audit exports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementKind {
    /// A cycle-count session was applied.
    CountApply,
    /// A manual adjustment batch line.
    Adjustment,
    /// Compensation for an adjustment line whose batch later failed.
    AdjustmentRollback,
    /// Net correction from a serial-number reconciliation.
    SerialReconciliation,
}

impl MovementKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementKind::CountApply => "count_apply",
            MovementKind::Adjustment => "adjustment",
            MovementKind::AdjustmentRollback => "adjustment_rollback",
            MovementKind::SerialReconciliation => "serial_reconciliation",
        }
    }
}

/// One committed change to a (product, location) stock level.
///
/// Movements are:
/// - **immutable** (treat them as facts)
/// - designed to be **append-only** — never updated or deleted
///
/// `quantity_delta` is the *effective* committed delta, so for any product
/// the sum of deltas always equals `new_quantity` of the last row minus
/// `previous_quantity` of the first. Decreases that hit the zero floor
/// record the clamped delta, not the requested one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockMovement {
    pub id: MovementId,
    pub product_id: ProductId,
    pub location_id: LocationId,
    pub kind: MovementKind,
    pub quantity_delta: i64,
    pub previous_quantity: i64,
    pub new_quantity: i64,
    pub reason: String,
    pub actor: UserId,
    pub created_at: DateTime<Utc>,
}

impl Entity for StockMovement {
    type Id = MovementId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}
