use std::sync::Arc;

use serde::Serialize;

use stocktake_catalog::{Catalog, ProductId};
use stocktake_core::{DomainError, DomainResult, LocationId, Money, UserId};
use stocktake_ledger::{MovementId, MovementKind, StockLedger, StockMovement};

use crate::batch::{AdjustmentBatch, AdjustmentItem, AdjustmentKind, BatchId};

/// Batch commit policy.
///
/// All-or-nothing is the default: a validate pass runs over the whole batch
/// before any ledger write, and a commit-phase failure compensates what was
/// already written. Best-effort commits what it can and enumerates the rest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BatchPolicy {
    #[default]
    AllOrNothing,
    BestEffort,
}

impl BatchPolicy {
    /// `STOCKTAKE_BATCH_POLICY=best_effort` opts in; anything else keeps the
    /// safe default.
    pub fn from_env() -> Self {
        match std::env::var("STOCKTAKE_BATCH_POLICY").as_deref() {
            Ok("best_effort") => BatchPolicy::BestEffort,
            _ => BatchPolicy::AllOrNothing,
        }
    }
}

/// Per-item failure detail, keyed by the item's position in the batch.
/// Compensation failures carry no index; they refer to the batch as a whole.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AdjustmentFailure {
    pub index: Option<usize>,
    pub product_id: ProductId,
    pub reason: String,
}

/// Per-item success detail. `movement_id` is `None` when the line had no
/// effect (zero delta, set-to-current, fully clamped decrease) — nothing was
/// recorded, and the cost impact is zero by construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AdjustmentOutcome {
    pub index: usize,
    pub product_id: ProductId,
    pub kind: AdjustmentKind,
    pub previous_quantity: i64,
    pub new_quantity: i64,
    pub cost_impact: Money,
    pub movement_id: Option<MovementId>,
}

/// What happened to a submitted batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub batch_id: BatchId,
    pub successful_adjustments: usize,
    pub total_processed: usize,
    pub failures: Vec<AdjustmentFailure>,
    pub outcomes: Vec<AdjustmentOutcome>,
    pub total_cost_impact: Money,
}

impl BatchReport {
    pub fn is_complete_success(&self) -> bool {
        self.failures.is_empty() && self.successful_adjustments == self.total_processed
    }

    fn rejected(batch_id: BatchId, total: usize, failures: Vec<AdjustmentFailure>) -> Self {
        Self {
            batch_id,
            successful_adjustments: 0,
            total_processed: total,
            failures,
            outcomes: Vec::new(),
            total_cost_impact: Money::zero(),
        }
    }
}

/// Validates and commits adjustment batches against the stock ledger.
///
/// The processor acquires the ledger's per-(product, location) exclusion one
/// item at a time — never across the batch — so overlapping batches cannot
/// deadlock each other.
pub struct BatchProcessor {
    ledger: Arc<StockLedger>,
    catalog: Arc<dyn Catalog>,
    policy: BatchPolicy,
}

impl BatchProcessor {
    pub fn new(ledger: Arc<StockLedger>, catalog: Arc<dyn Catalog>) -> Self {
        Self::with_policy(ledger, catalog, BatchPolicy::default())
    }

    pub fn with_policy(
        ledger: Arc<StockLedger>,
        catalog: Arc<dyn Catalog>,
        policy: BatchPolicy,
    ) -> Self {
        Self {
            ledger,
            catalog,
            policy,
        }
    }

    pub fn policy(&self) -> BatchPolicy {
        self.policy
    }

    /// Process a manual adjustment batch under the configured policy. The
    /// report always covers every submitted item: either in `outcomes` or in
    /// `failures`.
    pub fn process(
        &self,
        location_id: LocationId,
        batch: &AdjustmentBatch,
        actor: UserId,
    ) -> DomainResult<BatchReport> {
        self.process_with_kind(location_id, batch, actor, MovementKind::Adjustment)
    }

    /// Same pipeline, with the caller naming what drove the batch — a count
    /// session apply records `CountApply` rows, not `Adjustment` rows.
    pub fn process_with_kind(
        &self,
        location_id: LocationId,
        batch: &AdjustmentBatch,
        actor: UserId,
        kind: MovementKind,
    ) -> DomainResult<BatchReport> {
        let report = match self.policy {
            BatchPolicy::AllOrNothing => self.process_atomic(location_id, batch, actor, kind)?,
            BatchPolicy::BestEffort => {
                self.process_best_effort(location_id, batch, actor, kind)?
            }
        };
        tracing::info!(
            batch_id = %report.batch_id,
            successful = report.successful_adjustments,
            total = report.total_processed,
            cost_impact = %report.total_cost_impact,
            "adjustment batch processed"
        );
        Ok(report)
    }

    fn process_atomic(
        &self,
        location_id: LocationId,
        batch: &AdjustmentBatch,
        actor: UserId,
        kind: MovementKind,
    ) -> DomainResult<BatchReport> {
        // Phase one: the whole batch must be well-formed before any write.
        let failures = self.validate(batch);
        if !failures.is_empty() {
            tracing::warn!(
                batch_id = %batch.id,
                rejected = failures.len(),
                "adjustment batch rejected in validation"
            );
            return Ok(BatchReport::rejected(batch.id, batch.items.len(), failures));
        }

        // Phase two: commit item by item; compensate on the first failure.
        let mut outcomes = Vec::with_capacity(batch.items.len());
        let mut committed: Vec<StockMovement> = Vec::new();
        for (index, item) in batch.items.iter().enumerate() {
            match self.commit_item(location_id, batch.id, index, item, actor, kind) {
                Ok((outcome, movement)) => {
                    outcomes.push(outcome);
                    committed.extend(movement);
                }
                Err(err) => {
                    // Transient failure mid-commit: compensate what landed
                    // and surface the original (retryable) error. Rollback
                    // problems are logged inside roll_back.
                    let _ = self.roll_back(location_id, batch.id, &committed, actor);
                    return Err(err);
                }
            }
        }

        let total_cost_impact = sum_impacts(&outcomes)?;
        Ok(BatchReport {
            batch_id: batch.id,
            successful_adjustments: outcomes.len(),
            total_processed: batch.items.len(),
            failures: Vec::new(),
            outcomes,
            total_cost_impact,
        })
    }

    fn process_best_effort(
        &self,
        location_id: LocationId,
        batch: &AdjustmentBatch,
        actor: UserId,
        kind: MovementKind,
    ) -> DomainResult<BatchReport> {
        let mut outcomes = Vec::new();
        let mut failures = Vec::new();
        for (index, item) in batch.items.iter().enumerate() {
            let attempt = item
                .validate()
                .and_then(|_| self.commit_item(location_id, batch.id, index, item, actor, kind));
            match attempt {
                Ok((outcome, _)) => outcomes.push(outcome),
                Err(err) => failures.push(AdjustmentFailure {
                    index: Some(index),
                    product_id: item.product_id,
                    reason: err.to_string(),
                }),
            }
        }

        let total_cost_impact = sum_impacts(&outcomes)?;
        Ok(BatchReport {
            batch_id: batch.id,
            successful_adjustments: outcomes.len(),
            total_processed: batch.items.len(),
            failures,
            outcomes,
            total_cost_impact,
        })
    }

    fn validate(&self, batch: &AdjustmentBatch) -> Vec<AdjustmentFailure> {
        let mut failures = Vec::new();
        for (index, item) in batch.items.iter().enumerate() {
            let problem = match item.validate() {
                Err(err) => Some(err.to_string()),
                Ok(()) if self.catalog.product(item.product_id).is_none() => {
                    Some("unknown product".to_string())
                }
                Ok(()) => None,
            };
            if let Some(reason) = problem {
                failures.push(AdjustmentFailure {
                    index: Some(index),
                    product_id: item.product_id,
                    reason,
                });
            }
        }
        failures
    }

    /// Commit one line under the key's lock and price its effect.
    ///
    /// `cost_impact` is `(new − current) × cost_price` for every kind — the
    /// effective change is what is priced, so a decrease clamped by the zero
    /// floor is charged only for what actually left the books.
    fn commit_item(
        &self,
        location_id: LocationId,
        batch_id: BatchId,
        index: usize,
        item: &AdjustmentItem,
        actor: UserId,
        kind: MovementKind,
    ) -> DomainResult<(AdjustmentOutcome, Option<StockMovement>)> {
        let product = self
            .catalog
            .product(item.product_id)
            .ok_or(DomainError::NotFound)?;
        let reason = format!("{} (batch {})", item.reason, batch_id);

        let movement = match item.kind {
            AdjustmentKind::Increase if item.quantity == 0 => None,
            AdjustmentKind::Decrease if item.quantity == 0 => None,
            AdjustmentKind::Increase => self.ledger.apply_delta(
                item.product_id,
                location_id,
                item.quantity,
                kind,
                reason,
                actor,
            )?,
            AdjustmentKind::Decrease => self.ledger.apply_delta(
                item.product_id,
                location_id,
                -item.quantity,
                kind,
                reason,
                actor,
            )?,
            AdjustmentKind::Set => self.ledger.apply_set(
                item.product_id,
                location_id,
                item.quantity,
                kind,
                reason,
                actor,
            )?,
        };

        let outcome = match &movement {
            Some(m) => AdjustmentOutcome {
                index,
                product_id: item.product_id,
                kind: item.kind,
                previous_quantity: m.previous_quantity,
                new_quantity: m.new_quantity,
                cost_impact: product.cost_price.times(m.quantity_delta)?,
                movement_id: Some(m.id),
            },
            None => {
                let quantity = self.ledger.quantity(item.product_id, location_id);
                AdjustmentOutcome {
                    index,
                    product_id: item.product_id,
                    kind: item.kind,
                    previous_quantity: quantity,
                    new_quantity: quantity,
                    cost_impact: Money::zero(),
                    movement_id: None,
                }
            }
        };
        Ok((outcome, movement))
    }

    /// Compensate already-committed movements of a failed batch, newest
    /// first. Inverse deltas are exact because movements record effective
    /// deltas; a compensation that itself fails (contention, or an outside
    /// writer emptied the entry) is reported, not swallowed.
    fn roll_back(
        &self,
        location_id: LocationId,
        batch_id: BatchId,
        committed: &[StockMovement],
        actor: UserId,
    ) -> Vec<AdjustmentFailure> {
        let mut failures = Vec::new();
        for movement in committed.iter().rev() {
            let result = self.ledger.apply_delta(
                movement.product_id,
                location_id,
                -movement.quantity_delta,
                MovementKind::AdjustmentRollback,
                format!("rollback of batch {batch_id}"),
                actor,
            );
            match result {
                Ok(Some(_)) => {}
                Ok(None) => {
                    tracing::error!(
                        batch_id = %batch_id,
                        product_id = %movement.product_id,
                        "rollback clamped by zero floor; quantity diverged"
                    );
                    failures.push(AdjustmentFailure {
                        index: None,
                        product_id: movement.product_id,
                        reason: "rollback clamped by zero floor".to_string(),
                    });
                }
                Err(err) => {
                    tracing::error!(
                        batch_id = %batch_id,
                        product_id = %movement.product_id,
                        error = %err,
                        "rollback failed"
                    );
                    failures.push(AdjustmentFailure {
                        index: None,
                        product_id: movement.product_id,
                        reason: format!("rollback failed: {err}"),
                    });
                }
            }
        }
        failures
    }
}

fn sum_impacts(outcomes: &[AdjustmentOutcome]) -> DomainResult<Money> {
    let mut total = Money::zero();
    for outcome in outcomes {
        total = total.checked_add(outcome.cost_impact)?;
    }
    Ok(total)
}
