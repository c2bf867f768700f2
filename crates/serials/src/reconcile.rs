use std::collections::BTreeSet;
use std::sync::Arc;

use serde::Serialize;

use stocktake_catalog::ProductId;
use stocktake_core::{DomainResult, LocationId, UserId, ValueObject};
use stocktake_ledger::{MovementKind, StockLedger};

use crate::registry::{SerialNumber, SerialRegistry};

/// Outcome of diffing an observed serial set against the in-stock set.
///
/// `additions` were observed but not on the books; `removals` were on the
/// books but not observed. Both are sorted for stable output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconciliationDiff {
    pub product_id: ProductId,
    pub additions: Vec<SerialNumber>,
    pub removals: Vec<SerialNumber>,
    pub applied: bool,
}

impl ValueObject for ReconciliationDiff {}

impl ReconciliationDiff {
    pub fn net_delta(&self) -> i64 {
        self.additions.len() as i64 - self.removals.len() as i64
    }

    pub fn is_clean(&self) -> bool {
        self.additions.is_empty() && self.removals.is_empty()
    }
}

/// Diffs observed serial sets against the registry and, on request, commits
/// the resulting status transitions plus one aggregate ledger correction.
pub struct SerialReconciler {
    registry: Arc<SerialRegistry>,
    ledger: Arc<StockLedger>,
}

impl SerialReconciler {
    pub fn new(registry: Arc<SerialRegistry>, ledger: Arc<StockLedger>) -> Self {
        Self { registry, ledger }
    }

    /// Reconcile one product's observed serials.
    ///
    /// With `apply = false` this is a pure dry-run: the diff is computed and
    /// returned, and nothing — neither serial statuses nor stock — changes.
    /// With `apply = true`, the ledger is corrected first (one aggregate
    /// delta equal to `additions − removals`), then statuses transition; if
    /// the ledger write fails, no status has moved and the failure surfaces
    /// unchanged.
    pub fn reconcile(
        &self,
        product_id: ProductId,
        location_id: LocationId,
        observed: &[SerialNumber],
        apply: bool,
        reason: &str,
        actor: UserId,
    ) -> DomainResult<ReconciliationDiff> {
        let observed: BTreeSet<SerialNumber> = observed.iter().cloned().collect();
        let in_stock: BTreeSet<SerialNumber> =
            self.registry.in_stock(product_id).into_iter().collect();

        let additions: Vec<SerialNumber> = observed.difference(&in_stock).cloned().collect();
        let removals: Vec<SerialNumber> = in_stock.difference(&observed).cloned().collect();

        let mut diff = ReconciliationDiff {
            product_id,
            additions,
            removals,
            applied: false,
        };

        if !apply || diff.is_clean() {
            return Ok(diff);
        }

        let net = diff.net_delta();
        if net != 0 {
            self.ledger.apply_delta(
                product_id,
                location_id,
                net,
                MovementKind::SerialReconciliation,
                format!("serial reconciliation: {reason}"),
                actor,
            )?;
        }
        self.registry
            .transition(product_id, &diff.additions, &diff.removals)?;

        tracing::info!(
            product_id = %product_id,
            additions = diff.additions.len(),
            removals = diff.removals.len(),
            "serial reconciliation applied"
        );
        diff.applied = true;
        Ok(diff)
    }
}
